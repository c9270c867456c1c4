use super::{GenerationRequest, VideoProvider, body_snippet};
use crate::config::Secret;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

pub struct FalProvider {
    client: Client,
    key: Secret,
    endpoint: String,
    timeout: Duration,
}

impl FalProvider {
    pub fn new(client: Client, key: Secret, endpoint: String, timeout: Duration) -> Self {
        Self {
            client,
            key,
            endpoint,
            timeout,
        }
    }
}

/// fal answers synchronously with either `url` or `video.url`.
pub(crate) fn extract_video_url(body: &Value) -> Option<String> {
    body.get("url")
        .and_then(|v| v.as_str())
        .or_else(|| body.pointer("/video/url").and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl VideoProvider for FalProvider {
    fn name(&self) -> &'static str {
        "fal"
    }

    async fn request_video(&self, req: &GenerationRequest) -> Result<String> {
        let body = json!({
            "prompt": req.prompt,
            "duration": req.duration_secs,
            "aspect_ratio": req.aspect_ratio,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Key {}", self.key.expose()))
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .context("fal request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("HTTP {}: {}", status.as_u16(), body_snippet(&raw));
        }

        let parsed: Value = serde_json::from_str(&raw).context("fal returned invalid JSON")?;
        extract_video_url(&parsed).context("no video URL in fal response")
    }
}
