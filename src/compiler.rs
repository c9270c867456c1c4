use crate::config::{AssetPolicy, Paths};
use crate::error::{Error, Result};
use crate::ffmpeg::{
    concat_list_contents, ffmpeg_concat_videos, ffmpeg_extract_frame, ffmpeg_title_card,
    ffprobe_duration_seconds, validate_output,
};
use crate::queue::AssetRef;
use crate::title::{TitleGenerator, describe};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploaded { video_id: String, at: DateTime<Utc> },
    Failed { message: String, at: DateTime<Utc> },
}

/// A finished reel. Only `uploads` changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compilation {
    pub id: String,
    pub output: PathBuf,
    pub thumbnail: Option<PathBuf>,
    pub title: String,
    pub description: String,
    pub assets: Vec<AssetRef>,
    pub duration_secs: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub uploads: BTreeMap<String, UploadStatus>,
}

impl Compilation {
    pub fn sidecar_path(&self) -> PathBuf {
        self.output.with_extension("json")
    }

    pub fn prompts(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.prompt.clone()).collect()
    }

    pub fn is_uploaded(&self) -> bool {
        self.uploads
            .values()
            .any(|s| matches!(s, UploadStatus::Uploaded { .. }))
    }

    pub async fn record_upload(&mut self, account: &str, status: UploadStatus) -> Result<()> {
        self.uploads.insert(account.to_string(), status);
        self.save_sidecar().await
    }

    pub async fn save_sidecar(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::other(format!("serialize {}: {e}", self.id)))?;
        let path = self.sidecar_path();
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn load_sidecar(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&text).map_err(|e| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: {e}", path.display()),
            ))
        })
    }
}

pub struct Compiler {
    paths: Paths,
    policy: AssetPolicy,
    titles: TitleGenerator,
    ffmpeg_timeout: Duration,
    sequence: u64,
}

impl Compiler {
    pub fn new(paths: Paths, policy: AssetPolicy, titles: TitleGenerator, ffmpeg_timeout: Duration) -> Self {
        Self {
            paths,
            policy,
            titles,
            ffmpeg_timeout,
            sequence: 0,
        }
    }

    /// Concatenates `assets` in order into one reel with thumbnail, title and
    /// sidecar. The assets are only disposed of once everything is on disk.
    pub async fn compile(&mut self, assets: &[AssetRef]) -> Result<Compilation> {
        if assets.is_empty() {
            return Err(Error::compilation("nothing to compile"));
        }

        let created_at = Utc::now();
        let id = compilation_id(created_at, self.sequence);
        let output = self.paths.compilations_dir().join(format!("{id}.mp4"));
        info!(clips = assets.len(), "compiling {}", output.display());

        let duration_secs = match self.concat(assets, &output).await {
            Ok(d) => d,
            Err(e) => {
                let _ = tokio::fs::remove_file(&output).await;
                return Err(Error::compilation(e));
            }
        };

        let prompts: Vec<String> = assets.iter().map(|a| a.prompt.clone()).collect();
        let title = self.titles.title(&prompts, self.sequence).await;
        self.sequence += 1;

        let thumbnail = self.thumbnail(&id, &output, duration_secs, &title).await;

        let compilation = Compilation {
            id,
            output,
            thumbnail,
            title,
            description: describe(&prompts),
            assets: assets.to_vec(),
            duration_secs,
            created_at,
            uploads: BTreeMap::new(),
        };
        compilation.save_sidecar().await?;
        info!(
            duration = duration_secs,
            "compiled \"{}\" -> {}",
            compilation.title,
            compilation.output.display()
        );

        self.dispose(assets).await;
        Ok(compilation)
    }

    async fn concat(&self, assets: &[AssetRef], output: &Path) -> anyhow::Result<f64> {
        let clips = assets
            .iter()
            .map(|a| std::path::absolute(&a.path))
            .collect::<std::io::Result<Vec<_>>>()
            .context("Failed to resolve clip paths")?;

        let mut list = tempfile::Builder::new()
            .prefix("concat_")
            .suffix(".txt")
            .tempfile()
            .context("Failed to create concat list")?;
        list.write_all(concat_list_contents(&clips).as_bytes())
            .context("Failed to write concat list")?;
        list.flush()?;

        ffmpeg_concat_videos(list.path(), output, self.ffmpeg_timeout).await?;
        validate_output(output).await?;
        ffprobe_duration_seconds(output).await
    }

    /// Midpoint frame, or a title card when the frame grab fails.
    async fn thumbnail(&self, id: &str, video: &Path, duration_secs: f64, title: &str) -> Option<PathBuf> {
        let jpg = self.paths.thumbnails_dir().join(format!("{id}.jpg"));
        let frame: anyhow::Result<u64> = async {
            ffmpeg_extract_frame(video, duration_secs / 2.0, &jpg, self.ffmpeg_timeout).await?;
            validate_output(&jpg).await
        }
        .await;
        let Err(e) = frame else {
            return Some(jpg);
        };
        warn!("frame thumbnail failed for {id}, drawing a title card: {e:#}");

        let card: anyhow::Result<u64> = async {
            ffmpeg_title_card(title, &jpg, self.ffmpeg_timeout).await?;
            validate_output(&jpg).await
        }
        .await;
        match card {
            Ok(_) => Some(jpg),
            Err(e) => {
                warn!("no thumbnail for {id}: {e:#}");
                let _ = tokio::fs::remove_file(&jpg).await;
                None
            }
        }
    }

    async fn dispose(&self, assets: &[AssetRef]) {
        for asset in assets {
            let files = std::iter::once(&asset.path).chain(asset.source.as_ref());
            for file in files {
                if let Err(e) = dispose_file(file, self.policy, &self.paths.archive_dir()).await {
                    warn!("could not dispose of {}: {e:#}", file.display());
                }
            }
        }
    }
}

/// Millisecond timestamp plus the run-local sequence, unique within a process.
fn compilation_id(at: DateTime<Utc>, sequence: u64) -> String {
    format!("compilation_{}_{sequence:03}", at.format("%Y%m%d_%H%M%S_%3f"))
}

async fn dispose_file(path: &Path, policy: AssetPolicy, archive_dir: &Path) -> anyhow::Result<()> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(());
    }
    match policy {
        AssetPolicy::Keep => {}
        AssetPolicy::Delete => {
            tokio::fs::remove_file(path).await?;
            debug!("deleted {}", path.display());
        }
        AssetPolicy::Archive => {
            tokio::fs::create_dir_all(archive_dir).await?;
            let name = path.file_name().context("asset path has no file name")?;
            let dest = archive_dir.join(name);
            if tokio::fs::rename(path, &dest).await.is_err() {
                tokio::fs::copy(path, &dest).await?;
                tokio::fs::remove_file(path).await?;
            }
            debug!("archived {}", dest.display());
        }
    }
    Ok(())
}
