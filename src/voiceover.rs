use crate::api::elevenlabs::elevenlabs_tts_to_mp3;
use crate::config::{Paths, VoiceoverConfig};
use crate::error::{Error, Result};
use crate::ffmpeg::{MuxPlan, ffmpeg_mux, ffprobe_duration_seconds, validate_output};
use crate::queue::AssetRef;
use rand::seq::SliceRandom;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use walkdir::WalkDir;

const MUSIC_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "aac", "ogg"];

pub fn narration_text(template: &str, prompt: &str) -> String {
    template.replace("{prompt}", prompt.trim().trim_end_matches('.'))
}

/// Audio files under `dir`, sorted for stable ordering.
pub fn music_tracks(dir: &Path) -> Vec<PathBuf> {
    let mut tracks: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|x| x.to_str())
                .map(|x| MUSIC_EXTENSIONS.contains(&x.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    tracks.sort();
    tracks
}

pub struct VoiceoverProcessor {
    client: Client,
    cfg: VoiceoverConfig,
    voiceover_dir: PathBuf,
    music_dir: PathBuf,
    processed_dir: PathBuf,
    api_timeout: Duration,
    ffmpeg_timeout: Duration,
}

impl VoiceoverProcessor {
    pub fn new(client: Client, cfg: VoiceoverConfig, paths: &Paths, api_timeout: Duration, ffmpeg_timeout: Duration) -> Self {
        Self {
            client,
            cfg,
            voiceover_dir: paths.voiceover_dir(),
            music_dir: paths.music_dir(),
            processed_dir: paths.processed_dir(),
            api_timeout,
            ffmpeg_timeout,
        }
    }

    /// Narrates and re-encodes `raw` into the processed directory. The raw
    /// clip is deleted when this fails.
    pub async fn add_voiceover(&self, raw: &AssetRef) -> Result<AssetRef> {
        match self.render(raw).await {
            Ok(asset) => Ok(asset),
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&raw.path).await {
                    warn!("could not remove raw clip {}: {rm}", raw.path.display());
                }
                Err(Error::processing(e))
            }
        }
    }

    async fn render(&self, raw: &AssetRef) -> anyhow::Result<AssetRef> {
        let stem = raw
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("clip")
            .to_string();

        let narration = if self.cfg.enabled {
            let text = narration_text(&self.cfg.narration_template, &raw.prompt);
            let mp3 = self.voiceover_dir.join(format!("{stem}.mp3"));
            elevenlabs_tts_to_mp3(&self.client, &self.cfg, &text, &mp3, self.api_timeout).await?;
            info!("narration: {text}");
            Some(mp3)
        } else {
            None
        };

        let music = if self.cfg.add_music {
            let tracks = music_tracks(&self.music_dir);
            let pick = tracks.choose(&mut rand::thread_rng()).cloned();
            if pick.is_none() {
                warn!("no music in {}, mixing narration only", self.music_dir.display());
            }
            pick
        } else {
            None
        };

        let output = self.processed_dir.join(format!("{stem}_processed.mp4"));
        let plan = MuxPlan {
            video: raw.path.clone(),
            narration: narration.clone(),
            music,
            voice_volume: self.cfg.voice_volume,
            music_volume: self.cfg.music_volume,
            duration_secs: raw.duration_secs,
            vertical: self.cfg.vertical,
            caption: self.cfg.caption.clone(),
            output: output.clone(),
        };

        let muxed = async {
            ffmpeg_mux(&plan, self.ffmpeg_timeout).await?;
            validate_output(&output).await?;
            ffprobe_duration_seconds(&output).await
        }
        .await;

        if let Some(mp3) = &narration {
            let _ = tokio::fs::remove_file(mp3).await;
        }

        match muxed {
            Ok(duration) => {
                info!(duration, "processed {}", output.display());
                Ok(AssetRef::processed_from(raw, output, duration))
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&output).await;
                Err(e)
            }
        }
    }
}
