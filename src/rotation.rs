//! Round-robin distribution of finished reels over hosting accounts.

use crate::compiler::{Compilation, UploadStatus};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub credentials: PathBuf,
}

impl Account {
    /// `account_{n}` backed by the given credential file.
    pub fn numbered(n: usize, credentials: PathBuf) -> Self {
        Self {
            id: format!("account_{n}"),
            credentials,
        }
    }
}

/// Somewhere a compilation can be published. Returns the remote video id.
#[async_trait]
pub trait VideoHost: Send + Sync {
    async fn upload(&self, account: &Account, compilation: &Compilation) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct AccountState {
    pub account: Account,
    pub last_upload: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub disabled: bool,
    pub upload_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Uploaded { account: String, video_id: String },
    /// Target account is still inside its stagger window.
    Deferred { account: String, wait: Duration },
}

#[derive(Debug)]
pub struct UploadRotator {
    accounts: Vec<AccountState>,
    index: usize,
    stagger: Duration,
    max_failures: u32,
}

impl UploadRotator {
    pub fn new(accounts: Vec<Account>, stagger: Duration, max_failures: u32) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|account| AccountState {
                    account,
                    last_upload: None,
                    consecutive_failures: 0,
                    disabled: false,
                    upload_count: 0,
                })
                .collect(),
            index: 0,
            stagger,
            max_failures: max_failures.max(1),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn accounts(&self) -> &[AccountState] {
        &self.accounts
    }

    /// First enabled account at or after the rotation index.
    pub fn next_target(&self) -> Result<usize> {
        let n = self.accounts.len();
        (0..n)
            .map(|offset| (self.index + offset) % n)
            .find(|&i| !self.accounts[i].disabled)
            .ok_or_else(|| Error::upload("all accounts", "every account is disabled"))
    }

    /// Time left before `idx` may upload again, if any.
    fn stagger_wait(&self, idx: usize, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.accounts[idx].last_upload?;
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        (elapsed < self.stagger).then(|| self.stagger - elapsed)
    }

    pub fn record_success(&mut self, idx: usize, now: DateTime<Utc>) {
        let state = &mut self.accounts[idx];
        state.last_upload = Some(now);
        state.consecutive_failures = 0;
        state.upload_count += 1;
        self.index = (idx + 1) % self.accounts.len();
    }

    /// Returns true when this failure disabled the account.
    pub fn record_failure(&mut self, idx: usize) -> bool {
        let max = self.max_failures;
        let state = &mut self.accounts[idx];
        state.consecutive_failures += 1;
        if state.consecutive_failures >= max {
            state.disabled = true;
            error!(
                account = %state.account.id,
                failures = state.consecutive_failures,
                "account disabled after consecutive upload failures"
            );
            self.index = (idx + 1) % self.accounts.len();
            true
        } else {
            self.index = idx;
            false
        }
    }

    /// Re-enables an account and clears its failure count.
    pub fn reset(&mut self, account_id: &str) -> bool {
        match self.accounts.iter_mut().find(|s| s.account.id == account_id) {
            Some(state) => {
                state.disabled = false;
                state.consecutive_failures = 0;
                info!(account = account_id, "account re-enabled");
                true
            }
            None => false,
        }
    }

    /// Uploads to the current target. `force` skips the stagger check.
    pub async fn upload<H: VideoHost + ?Sized>(
        &mut self,
        host: &H,
        compilation: &mut Compilation,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<UploadOutcome> {
        if self.accounts.is_empty() {
            return Err(Error::configuration("no upload accounts configured"));
        }
        let idx = self.next_target()?;
        let account = self.accounts[idx].account.clone();

        if !force {
            if let Some(wait) = self.stagger_wait(idx, now) {
                info!(
                    account = %account.id,
                    wait_secs = wait.as_secs(),
                    "upload deferred, account inside stagger window"
                );
                return Ok(UploadOutcome::Deferred {
                    account: account.id,
                    wait,
                });
            }
        }

        info!(account = %account.id, "uploading \"{}\"", compilation.title);
        match host.upload(&account, compilation).await {
            Ok(video_id) => {
                self.record_success(idx, now);
                info!(account = %account.id, video_id = %video_id, "upload complete");
                compilation
                    .record_upload(
                        &account.id,
                        UploadStatus::Uploaded {
                            video_id: video_id.clone(),
                            at: now,
                        },
                    )
                    .await?;
                Ok(UploadOutcome::Uploaded {
                    account: account.id,
                    video_id,
                })
            }
            Err(e) => {
                warn!(account = %account.id, "upload failed: {e:#}");
                self.record_failure(idx);
                compilation
                    .record_upload(
                        &account.id,
                        UploadStatus::Failed {
                            message: format!("{e:#}"),
                            at: now,
                        },
                    )
                    .await?;
                Err(Error::upload(account.id, e))
            }
        }
    }

    /// One-line per-account summary for status logs.
    pub fn summary(&self) -> String {
        self.accounts
            .iter()
            .map(|s| {
                let state = if s.disabled {
                    "disabled".to_string()
                } else if s.consecutive_failures > 0 {
                    format!("{} failing", s.consecutive_failures)
                } else {
                    "ok".to_string()
                };
                format!("{}={} ({})", s.account.id, s.upload_count, state)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn accounts(n: usize) -> Vec<Account> {
        (1..=n)
            .map(|i| Account::numbered(i, PathBuf::from(format!("credentials/youtube_creds_{i}.json"))))
            .collect()
    }

    #[derive(Default)]
    struct FakeHost {
        broken: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VideoHost for FakeHost {
        async fn upload(&self, account: &Account, _c: &Compilation) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push(account.id.clone());
            if self.broken.contains(&account.id) {
                anyhow::bail!("quota exceeded");
            }
            Ok(format!("vid-{}", account.id))
        }
    }

    fn compilation(dir: &std::path::Path) -> Compilation {
        Compilation {
            id: "c1".into(),
            output: dir.join("c1.mp4"),
            thumbnail: None,
            title: "Pets".into(),
            description: String::new(),
            assets: Vec::new(),
            duration_secs: 600.0,
            created_at: Utc::now(),
            uploads: BTreeMap::new(),
        }
    }

    #[test]
    fn successes_advance_by_one_and_wrap() {
        let mut r = UploadRotator::new(accounts(5), Duration::from_secs(900), 3);
        let mut order = Vec::new();
        for _ in 0..7 {
            let idx = r.next_target().unwrap();
            order.push(idx);
            r.record_success(idx, Utc::now());
        }
        assert_eq!(order, [0, 1, 2, 3, 4, 0, 1]);
        assert_eq!(r.index(), 2);
    }

    #[tokio::test]
    async fn failing_account_is_disabled_and_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = compilation(tmp.path());
        let host = FakeHost {
            broken: vec!["account_3".into()],
            ..Default::default()
        };
        let mut r = UploadRotator::new(accounts(5), Duration::from_secs(900), 3);

        for _ in 0..11 {
            let _ = r.upload(&host, &mut c, true, Utc::now()).await;
        }

        let calls = host.calls.lock().unwrap().clone();
        let ids: Vec<&str> = calls.iter().map(|s| s.trim_start_matches("account_")).collect();
        assert_eq!(ids, ["1", "2", "3", "3", "3", "4", "5", "1", "2", "4", "5"]);
        assert!(r.accounts()[2].disabled);
        assert!(matches!(
            c.uploads.get("account_3"),
            Some(UploadStatus::Failed { .. })
        ));
    }

    #[test]
    fn failure_keeps_index_until_threshold() {
        let mut r = UploadRotator::new(accounts(3), Duration::from_secs(0), 2);
        r.record_success(0, Utc::now());
        assert!(!r.record_failure(1));
        assert_eq!(r.index(), 1);
        assert!(r.record_failure(1));
        assert_eq!(r.index(), 2);
        assert_eq!(r.next_target().unwrap(), 2);
    }

    #[tokio::test]
    async fn recent_upload_defers_unless_forced() {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = compilation(tmp.path());
        let host = FakeHost::default();
        let mut r = UploadRotator::new(accounts(1), Duration::from_secs(900), 3);
        let t0 = Utc::now();

        r.upload(&host, &mut c, false, t0).await.unwrap();
        let later = t0 + chrono::Duration::seconds(300);
        match r.upload(&host, &mut c, false, later).await.unwrap() {
            UploadOutcome::Deferred { account, wait } => {
                assert_eq!(account, "account_1");
                assert_eq!(wait, Duration::from_secs(600));
            }
            other => panic!("expected deferral, got {other:?}"),
        }
        assert_eq!(r.accounts()[0].consecutive_failures, 0);
        assert_eq!(r.index(), 0);

        assert!(matches!(
            r.upload(&host, &mut c, true, later).await.unwrap(),
            UploadOutcome::Uploaded { .. }
        ));
        let after = t0 + chrono::Duration::seconds(2000);
        assert!(matches!(
            r.upload(&host, &mut c, false, after).await.unwrap(),
            UploadOutcome::Uploaded { .. }
        ));
    }

    #[tokio::test]
    async fn all_disabled_is_an_upload_error_until_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = compilation(tmp.path());
        let mut r = UploadRotator::new(accounts(2), Duration::from_secs(0), 1);
        r.record_failure(0);
        r.record_failure(1);

        let host = FakeHost::default();
        assert!(matches!(
            r.upload(&host, &mut c, true, Utc::now()).await,
            Err(Error::Upload { .. })
        ));
        assert!(host.calls.lock().unwrap().is_empty());

        assert!(r.reset("account_2"));
        assert!(!r.reset("account_9"));
        assert!(matches!(
            r.upload(&host, &mut c, true, Utc::now()).await.unwrap(),
            UploadOutcome::Uploaded { account, .. } if account == "account_2"
        ));
    }

    #[test]
    fn summary_names_every_account() {
        let mut r = UploadRotator::new(accounts(2), Duration::from_secs(0), 1);
        r.record_success(0, Utc::now());
        r.record_failure(1);
        assert_eq!(r.summary(), "account_1=1 (ok), account_2=0 (disabled)");
    }
}
