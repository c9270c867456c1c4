//! Text-to-video backends and the priority-ordered fallback chain over them.

pub mod fal;
pub mod replicate;
pub mod runway;

use crate::config::{ProviderConfig, ProviderKind, Secret, Timeouts};
use crate::error::{Error, Result};
use crate::ffmpeg::ffprobe_duration_seconds;
use crate::queue::AssetRef;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub duration_secs: u32,
    pub aspect_ratio: String,
}

/// One remote backend. Returns the URL of the finished video.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn request_video(&self, req: &GenerationRequest) -> anyhow::Result<String>;
}

/// State reported by a polled job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Pending(String),
    Succeeded(String),
    Failed(String),
}

/// Polls `check` every `every` until it reports success or failure or `max_wait` elapses.
pub(crate) async fn poll_job<F, Fut>(
    label: &str,
    every: Duration,
    max_wait: Duration,
    mut check: F,
) -> anyhow::Result<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<JobState>>,
{
    let deadline = tokio::time::Instant::now() + max_wait;
    loop {
        match check().await? {
            JobState::Succeeded(url) => return Ok(url),
            JobState::Failed(reason) => anyhow::bail!("{label} job failed: {reason}"),
            JobState::Pending(status) => {
                info!("{label} job status: {status}, waiting");
            }
        }
        if tokio::time::Instant::now() + every > deadline {
            anyhow::bail!("{label} job not finished after {}s", max_wait.as_secs());
        }
        tokio::time::sleep(every).await;
    }
}

fn key_of<'a>(key: &'a Option<Secret>, name: &str) -> Result<&'a Secret> {
    key.as_ref()
        .ok_or_else(|| Error::configuration(format!("{name} missing")))
}

/// Providers in configured priority order.
pub fn build_providers(
    cfg: &ProviderConfig,
    client: &Client,
    timeouts: &Timeouts,
) -> Result<Vec<Box<dyn VideoProvider>>> {
    let mut out: Vec<Box<dyn VideoProvider>> = Vec::new();
    for kind in &cfg.order {
        match kind {
            ProviderKind::Fal => out.push(Box::new(fal::FalProvider::new(
                client.clone(),
                key_of(&cfg.fal_key, "FAL_API_KEY")?.clone(),
                cfg.fal_endpoint.clone(),
                timeouts.api,
            ))),
            ProviderKind::Runway => out.push(Box::new(runway::RunwayProvider::new(
                client.clone(),
                key_of(&cfg.runway_key, "RUNWAY_API_KEY")?.clone(),
                cfg.runway_base_url.clone(),
                timeouts,
            ))),
            ProviderKind::Replicate => {
                let version = cfg
                    .replicate_version
                    .clone()
                    .ok_or_else(|| Error::configuration("REPLICATE_MODEL_VERSION missing"))?;
                out.push(Box::new(replicate::ReplicateProvider::new(
                    client.clone(),
                    key_of(&cfg.replicate_key, "REPLICATE_API_KEY")?.clone(),
                    version,
                    timeouts,
                )))
            }
        }
    }
    if out.is_empty() {
        return Err(Error::configuration("no video providers configured"));
    }
    Ok(out)
}

pub struct VideoGenerator {
    client: Client,
    providers: Vec<Box<dyn VideoProvider>>,
    output_dir: PathBuf,
    aspect_ratio: String,
    attempt_limit: Duration,
    api_timeout: Duration,
}

impl VideoGenerator {
    pub fn new(
        client: Client,
        providers: Vec<Box<dyn VideoProvider>>,
        output_dir: PathBuf,
        aspect_ratio: String,
        timeouts: &Timeouts,
    ) -> Self {
        Self {
            client,
            providers,
            output_dir,
            aspect_ratio,
            attempt_limit: timeouts.provider_max_wait + timeouts.api,
            api_timeout: timeouts.api,
        }
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// One attempt per provider, in order. The first clip that downloads and
    /// probes cleanly wins.
    pub async fn generate(&self, prompt: &str, duration_secs: u32) -> Result<AssetRef> {
        let req = GenerationRequest {
            prompt: prompt.to_string(),
            duration_secs,
            aspect_ratio: self.aspect_ratio.clone(),
        };

        let mut failures = Vec::new();
        for provider in &self.providers {
            let name = provider.name();
            info!(provider = name, "requesting video: {prompt}");

            let attempt = tokio::time::timeout(self.attempt_limit, self.attempt(provider.as_ref(), &req));
            match attempt.await {
                Ok(Ok(asset)) => {
                    info!(
                        provider = name,
                        duration = asset.duration_secs,
                        "generated {}",
                        asset.path.display()
                    );
                    return Ok(asset);
                }
                Ok(Err(e)) => {
                    warn!(provider = name, "generation failed: {e:#}");
                    failures.push(format!("{name}: {e:#}"));
                }
                Err(_) => {
                    warn!(provider = name, "generation timed out");
                    failures.push(format!("{name}: timed out after {}s", self.attempt_limit.as_secs()));
                }
            }
        }

        Err(Error::Generation(failures.join("; ")))
    }

    async fn attempt(&self, provider: &dyn VideoProvider, req: &GenerationRequest) -> anyhow::Result<AssetRef> {
        let url = provider.request_video(req).await?;
        let file_name = format!("{}_{}.mp4", provider.name(), Utc::now().format("%Y%m%d_%H%M%S_%3f"));
        let dest = self.output_dir.join(file_name);

        download_to(&self.client, &url, &dest, self.api_timeout).await?;
        match ffprobe_duration_seconds(&dest).await {
            Ok(duration) => Ok(AssetRef::raw(dest, duration, &req.prompt)),
            Err(e) => {
                let _ = tokio::fs::remove_file(&dest).await;
                Err(e.context("downloaded clip is not a playable video"))
            }
        }
    }
}

/// Streams `url` into `dest`; a partial file is removed on error.
pub async fn download_to(client: &Client, url: &str, dest: &Path, limit: Duration) -> anyhow::Result<()> {
    let result: anyhow::Result<()> = async {
        let mut resp = client
            .get(url)
            .timeout(limit)
            .send()
            .await
            .context("download request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("download HTTP {}", resp.status().as_u16());
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        while let Some(chunk) = resp.chunk().await.context("download interrupted")? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(dest).await;
    }
    result
}

/// Error body snippet for logs.
pub(crate) fn body_snippet(body: &str) -> String {
    body.trim().chars().take(300).collect()
}
