use crate::config::VoiceoverConfig;
use anyhow::{Context, Result};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

pub async fn elevenlabs_tts_to_mp3(
    client: &Client,
    cfg: &VoiceoverConfig,
    text: &str,
    out_mp3_path: &Path,
    timeout: Duration,
) -> Result<()> {
    let key = cfg
        .elevenlabs_key
        .as_ref()
        .context("ELEVENLABS_API_KEY not set")?;

    let url = format!(
        "https://api.elevenlabs.io/v1/text-to-speech/{}?output_format=mp3_44100_128",
        cfg.voice_id
    );

    let body = serde_json::json!({
        "text": text,
        "model_id": cfg.model_id,
    });

    let resp = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("xi-api-key", key.expose())
        .json(&body)
        .timeout(timeout)
        .send()
        .await
        .context("ElevenLabs request failed")?;

    let status = resp.status();
    if !status.is_success() {
        let raw = resp.text().await.unwrap_or_default();
        let snippet = raw.trim().chars().take(300).collect::<String>();
        anyhow::bail!("ElevenLabs TTS failed HTTP {}: {}", status.as_u16(), snippet);
    }

    let bytes = resp.bytes().await.context("ElevenLabs response read failed")?;
    if bytes.is_empty() {
        anyhow::bail!("ElevenLabs returned empty audio");
    }
    if let Some(parent) = out_mp3_path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create dir {}", parent.display()))?;
    }
    fs::write(out_mp3_path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", out_mp3_path.display()))?;
    debug!(bytes = bytes.len(), "narration saved to {}", out_mp3_path.display());

    Ok(())
}
