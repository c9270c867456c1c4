use super::{GenerationRequest, JobState, VideoProvider, body_snippet, poll_job};
use crate::config::{Secret, Timeouts};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

const PREDICTIONS_URL: &str = "https://api.replicate.com/v1/predictions";

pub struct ReplicateProvider {
    client: Client,
    key: Secret,
    version: String,
    timeout: Duration,
    poll_every: Duration,
    max_wait: Duration,
}

impl ReplicateProvider {
    pub fn new(client: Client, key: Secret, version: String, timeouts: &Timeouts) -> Self {
        Self {
            client,
            key,
            version,
            timeout: timeouts.api,
            poll_every: timeouts.provider_poll,
            max_wait: timeouts.provider_max_wait,
        }
    }

    fn auth(&self) -> String {
        format!("Token {}", self.key.expose())
    }
}

/// Output is either a list of URLs or a single URL string.
pub(crate) fn prediction_state(prediction: &Value) -> JobState {
    let status = prediction
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    match status {
        "succeeded" => {
            let output = prediction.get("output");
            let url = output
                .and_then(|o| o.as_array())
                .and_then(|a| a.first())
                .and_then(|v| v.as_str())
                .or_else(|| output.and_then(|o| o.as_str()));
            match url {
                Some(u) if !u.is_empty() => JobState::Succeeded(u.to_string()),
                _ => JobState::Failed("succeeded without output".to_string()),
            }
        }
        "failed" | "canceled" => JobState::Failed(
            prediction
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or(status)
                .to_string(),
        ),
        other => JobState::Pending(other.to_string()),
    }
}

#[async_trait]
impl VideoProvider for ReplicateProvider {
    fn name(&self) -> &'static str {
        "replicate"
    }

    async fn request_video(&self, req: &GenerationRequest) -> Result<String> {
        let body = json!({
            "version": self.version,
            "input": {
                "prompt": req.prompt,
                "duration": req.duration_secs,
            },
        });

        let resp = self
            .client
            .post(PREDICTIONS_URL)
            .header("Authorization", self.auth())
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .context("replicate request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("HTTP {}: {}", status.as_u16(), body_snippet(&raw));
        }
        let created: Value = serde_json::from_str(&raw).context("replicate returned invalid JSON")?;
        let poll_url = created
            .pointer("/urls/get")
            .and_then(|v| v.as_str())
            .context("no urls.get in replicate response")?
            .to_string();
        let poll_url = poll_url.as_str();

        poll_job("replicate", self.poll_every, self.max_wait, move || async move {
            let resp = self
                .client
                .get(poll_url)
                .header("Authorization", self.auth())
                .timeout(self.timeout)
                .send()
                .await
                .context("replicate poll failed")?;
            let status = resp.status();
            let raw = resp.text().await.unwrap_or_default();
            if !status.is_success() {
                anyhow::bail!("poll HTTP {}: {}", status.as_u16(), body_snippet(&raw));
            }
            let prediction: Value = serde_json::from_str(&raw).context("replicate returned invalid JSON")?;
            Ok(prediction_state(&prediction))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_list_or_string() {
        assert_eq!(
            prediction_state(&json!({"status": "succeeded", "output": ["https://r/1.mp4", "https://r/2.mp4"]})),
            JobState::Succeeded("https://r/1.mp4".into())
        );
        assert_eq!(
            prediction_state(&json!({"status": "succeeded", "output": "https://r/only.mp4"})),
            JobState::Succeeded("https://r/only.mp4".into())
        );
    }

    #[test]
    fn terminal_failures() {
        assert_eq!(
            prediction_state(&json!({"status": "failed", "error": "NSFW"})),
            JobState::Failed("NSFW".into())
        );
        assert_eq!(
            prediction_state(&json!({"status": "canceled", "error": null})),
            JobState::Failed("canceled".into())
        );
        assert_eq!(
            prediction_state(&json!({"status": "processing"})),
            JobState::Pending("processing".into())
        );
    }
}
