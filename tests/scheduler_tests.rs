use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use pet_reels::compiler::Compilation;
use pet_reels::prompts::PromptTracker;
use pet_reels::queue::{AccumulationQueue, AssetRef};
use pet_reels::rotation::{Account, UploadRotator, VideoHost};
use pet_reels::scheduler::{Phase, RunMode, Scheduler, SchedulerSettings, Studio};
use pet_reels::{Error, Result};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

struct FakeStudio {
    dir: PathBuf,
    durations: VecDeque<f64>,
    generated: usize,
    failing_generations: HashSet<usize>,
    failing_compiles: usize,
    compiled_batches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FakeStudio {
    fn new(dir: PathBuf, durations: &[f64]) -> Self {
        Self {
            dir,
            durations: durations.iter().copied().collect(),
            generated: 0,
            failing_generations: HashSet::new(),
            failing_compiles: 0,
            compiled_batches: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Studio for FakeStudio {
    async fn generate(&mut self, prompt: &str, duration_secs: u32) -> Result<AssetRef> {
        let n = self.generated;
        self.generated += 1;
        if self.failing_generations.contains(&n) {
            return Err(Error::Generation("fal: HTTP 503; runway: timed out".into()));
        }
        let secs = self.durations.pop_front().unwrap_or(f64::from(duration_secs));
        Ok(AssetRef::raw(self.dir.join(format!("raw_{n}.mp4")), secs, prompt))
    }

    async fn process(&mut self, raw: &AssetRef) -> Result<AssetRef> {
        let name = raw.path.file_stem().unwrap().to_string_lossy().to_string();
        Ok(AssetRef::processed_from(
            raw,
            self.dir.join(format!("{name}_processed.mp4")),
            raw.duration_secs,
        ))
    }

    async fn compile(&mut self, assets: &[AssetRef]) -> Result<Compilation> {
        if self.failing_compiles > 0 {
            self.failing_compiles -= 1;
            return Err(Error::compilation("ffmpeg exited with 1"));
        }
        let names: Vec<String> = assets
            .iter()
            .map(|a| a.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        let mut batches = self.compiled_batches.lock().unwrap();
        batches.push(names);
        let id = format!("compilation_{}", batches.len());
        Ok(Compilation {
            output: self.dir.join(format!("{id}.mp4")),
            id,
            thumbnail: None,
            title: "Corgi & Cat Moments".into(),
            description: String::new(),
            assets: assets.to_vec(),
            duration_secs: assets.iter().map(|a| a.duration_secs).sum(),
            created_at: Utc::now(),
            uploads: BTreeMap::new(),
        })
    }
}

#[derive(Default, Clone)]
struct FakeHost {
    uploads: Arc<Mutex<Vec<String>>>,
    broken: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl VideoHost for FakeHost {
    async fn upload(&self, account: &Account, compilation: &Compilation) -> anyhow::Result<String> {
        if self.broken.lock().unwrap().contains(&account.id) {
            anyhow::bail!("quotaExceeded");
        }
        self.uploads
            .lock()
            .unwrap()
            .push(format!("{}:{}", account.id, compilation.id));
        Ok(format!("yt-{}", compilation.id))
    }
}

fn settings() -> SchedulerSettings {
    SchedulerSettings {
        clip_duration_secs: 30,
        videos_per_run: 2,
        tick_interval: Duration::from_millis(10),
        daily_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        run_on_startup: true,
        status_every: 1,
    }
}

fn accounts(n: usize) -> Vec<Account> {
    (1..=n)
        .map(|i| Account::numbered(i, PathBuf::from(format!("youtube_creds_{i}.json"))))
        .collect()
}

fn prompts() -> PromptTracker {
    let pool = ["A corgi at the beach", "A cat napping", "A husky in the snow", "A kitten pouncing"];
    PromptTracker::new(pool.iter().map(|s| s.to_string()).collect(), 2, 100).with_seed(7)
}

fn build(
    tmp: &TempDir,
    durations: &[f64],
    threshold: f64,
    account_count: usize,
    stagger: Duration,
) -> (Scheduler<FakeStudio, FakeHost>, FakeHost, Arc<Mutex<Vec<Vec<String>>>>) {
    let studio = FakeStudio::new(tmp.path().to_path_buf(), durations);
    let batches = studio.compiled_batches.clone();
    let host = FakeHost::default();
    let scheduler = Scheduler::new(
        studio,
        host.clone(),
        prompts(),
        AccumulationQueue::new(threshold),
        UploadRotator::new(accounts(account_count), stagger, 3),
        settings(),
    );
    (scheduler, host, batches)
}

#[tokio::test]
async fn compiles_and_uploads_once_threshold_is_crossed() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut s, host, batches) = build(&tmp, &[250.0, 200.0, 200.0], 600.0, 5, Duration::from_secs(900));

    s.run_iteration(1).await.unwrap();
    s.run_iteration(1).await.unwrap();
    assert_eq!(s.queue().len(), 2);
    assert_eq!(s.stats().compilations, 0);

    s.run_iteration(1).await.unwrap();
    assert!(s.queue().is_empty());
    assert_eq!(s.stats().compilations, 1);
    assert_eq!(
        batches.lock().unwrap()[0],
        ["raw_0_processed.mp4", "raw_1_processed.mp4", "raw_2_processed.mp4"]
    );
    assert_eq!(*host.uploads.lock().unwrap(), ["account_1:compilation_1"]);
    assert_eq!(s.rotator().index(), 1);
    assert_eq!(s.state().phase, Phase::Idle);
    assert_eq!(s.state().iteration, 3);
}

#[tokio::test]
async fn failed_compile_puts_the_batch_back() {
    let tmp = tempfile::tempdir().unwrap();
    let studio = {
        let mut st = FakeStudio::new(tmp.path().to_path_buf(), &[40.0, 40.0, 10.0]);
        st.failing_compiles = 1;
        st
    };
    let batches = studio.compiled_batches.clone();
    let mut s = Scheduler::new(
        studio,
        FakeHost::default(),
        prompts(),
        AccumulationQueue::new(60.0),
        UploadRotator::new(accounts(2), Duration::from_secs(900), 3),
        settings(),
    );

    s.run_iteration(1).await.unwrap();
    s.run_iteration(1).await.unwrap();
    assert_eq!(s.stats().compilation_failures, 1);
    assert_eq!(s.queue().len(), 2);
    assert_eq!(s.queue().total_duration(), 80.0);

    s.run_iteration(1).await.unwrap();
    assert!(s.queue().is_empty());
    assert_eq!(batches.lock().unwrap()[0].len(), 3);
}

#[tokio::test]
async fn generation_failure_skips_the_cycle() {
    let tmp = tempfile::tempdir().unwrap();
    let studio = {
        let mut st = FakeStudio::new(tmp.path().to_path_buf(), &[]);
        st.failing_generations.insert(0);
        st
    };
    let mut s = Scheduler::new(
        studio,
        FakeHost::default(),
        prompts(),
        AccumulationQueue::new(600.0),
        UploadRotator::new(accounts(1), Duration::from_secs(0), 3),
        settings(),
    );

    s.run_iteration(2).await.unwrap();
    assert_eq!(s.stats().generation_failures, 1);
    assert_eq!(s.stats().generated, 1);
    assert_eq!(s.queue().len(), 1);
    assert_eq!(s.prompts().statistics().total_generated, 2);
}

#[tokio::test]
async fn stagger_holds_the_second_reel_in_the_backlog() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut s, host, _) = build(&tmp, &[], 30.0, 1, Duration::from_secs(900));

    s.run_iteration(1).await.unwrap();
    s.run_iteration(1).await.unwrap();

    assert_eq!(s.stats().compilations, 2);
    assert_eq!(s.stats().uploads, 1);
    assert_eq!(s.stats().deferrals, 1);
    assert_eq!(s.backlog().count(), 1);
    assert_eq!(host.uploads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn rotation_spreads_reels_across_accounts() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut s, host, _) = build(&tmp, &[], 30.0, 3, Duration::from_secs(900));
    for _ in 0..4 {
        s.run_iteration(1).await.unwrap();
    }
    let uploads = host.uploads.lock().unwrap().clone();
    assert_eq!(
        uploads,
        [
            "account_1:compilation_1",
            "account_2:compilation_2",
            "account_3:compilation_3",
        ]
    );
    // account_1 is still inside its stagger window
    assert_eq!(s.backlog().count(), 1);
    assert_eq!(s.rotator().index(), 0);
}

#[tokio::test]
async fn broken_account_is_disabled_and_backlog_moves_on() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut s, host, _) = build(&tmp, &[], 30.0, 2, Duration::from_secs(0));
    host.broken.lock().unwrap().insert("account_1".into());

    for _ in 0..4 {
        s.run_iteration(1).await.unwrap();
    }
    assert!(s.rotator().accounts()[0].disabled);
    assert_eq!(s.stats().upload_failures, 3);
    // after the third failure everything goes to account_2
    let uploads = host.uploads.lock().unwrap().clone();
    assert!(uploads.iter().all(|u| u.starts_with("account_2:")));
    assert!(!uploads.is_empty());
}

#[tokio::test]
async fn empty_prompt_pool_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = Scheduler::new(
        FakeStudio::new(tmp.path().to_path_buf(), &[]),
        FakeHost::default(),
        PromptTracker::new(Vec::new(), 2, 10),
        AccumulationQueue::new(600.0),
        UploadRotator::new(accounts(1), Duration::from_secs(0), 3),
        settings(),
    );
    let err = s.run_iteration(1).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[tokio::test]
async fn single_shot_forces_compile_and_upload() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut s, host, batches) = build(&tmp, &[30.0, 30.0], 600.0, 5, Duration::from_secs(900));

    let summary = s.run_once(2, true).await.unwrap();
    assert_eq!(s.state().mode, RunMode::SingleShot);
    assert_eq!(summary.stats.compilations, 1);
    assert_eq!(summary.stats.uploads, 1);
    assert_eq!(summary.pending_uploads, 0);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(batches.lock().unwrap()[0].len(), 2);
    assert_eq!(host.uploads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn single_shot_without_upload_keeps_the_reel() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut s, host, _) = build(&tmp, &[30.0], 600.0, 5, Duration::from_secs(900));

    let summary = s.run_once(1, false).await.unwrap();
    assert_eq!(summary.pending_uploads, 1);
    assert_eq!(summary.exit_code(), 0);
    assert!(host.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn single_shot_reports_failure_when_nothing_was_made() {
    let tmp = tempfile::tempdir().unwrap();
    let studio = {
        let mut st = FakeStudio::new(tmp.path().to_path_buf(), &[]);
        st.failing_generations.extend([0, 1]);
        st
    };
    let mut s = Scheduler::new(
        studio,
        FakeHost::default(),
        prompts(),
        AccumulationQueue::new(600.0),
        UploadRotator::new(accounts(1), Duration::from_secs(0), 3),
        settings(),
    );
    let summary = s.run_once(2, true).await.unwrap();
    assert_eq!(summary.stats.compilations, 0);
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn continuous_mode_stops_on_shutdown() {
    let tmp = tempfile::tempdir().unwrap();
    let (tx, rx) = watch::channel(false);
    let (s, _, _) = build(&tmp, &[], 600.0, 1, Duration::from_secs(0));
    let mut s = s.with_shutdown(rx);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(80)).await;
        let _ = tx.send(true);
    });

    tokio::time::timeout(Duration::from_secs(5), s.run_continuous())
        .await
        .expect("scheduler did not stop")
        .unwrap();
    assert_eq!(s.state().mode, RunMode::Continuous);
    assert!(s.state().iteration >= 1);
    assert!(s.stats().generated >= 1);
}

#[tokio::test]
async fn fixed_time_mode_runs_batch_on_startup_then_waits() {
    let tmp = tempfile::tempdir().unwrap();
    let (tx, rx) = watch::channel(false);
    let (s, _, _) = build(&tmp, &[], 600.0, 1, Duration::from_secs(0));
    let mut s = s.with_shutdown(rx);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(true);
    });

    tokio::time::timeout(Duration::from_secs(5), s.run_fixed_time())
        .await
        .expect("scheduler did not stop")
        .unwrap();
    assert_eq!(s.state().iteration, 1);
    assert_eq!(s.stats().generated, 2);
    assert!(s.state().next_wake.is_some());
}
