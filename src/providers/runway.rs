use super::{GenerationRequest, JobState, VideoProvider, body_snippet, poll_job};
use crate::config::{Secret, Timeouts};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

pub struct RunwayProvider {
    client: Client,
    key: Secret,
    base_url: String,
    timeout: Duration,
    poll_every: Duration,
    max_wait: Duration,
}

impl RunwayProvider {
    pub fn new(client: Client, key: Secret, base_url: String, timeouts: &Timeouts) -> Self {
        Self {
            client,
            key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: timeouts.api,
            poll_every: timeouts.provider_poll,
            max_wait: timeouts.provider_max_wait,
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.key.expose())
            .timeout(self.timeout)
            .send()
            .await
            .context("runway poll failed")?;
        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("poll HTTP {}: {}", status.as_u16(), body_snippet(&raw));
        }
        serde_json::from_str(&raw).context("runway returned invalid JSON")
    }
}

pub(crate) fn task_state(task: &Value) -> JobState {
    let status = task.get("status").and_then(|v| v.as_str()).unwrap_or("UNKNOWN");
    match status {
        "SUCCEEDED" => match task.pointer("/output/video").and_then(|v| v.as_str()) {
            Some(url) if !url.is_empty() => JobState::Succeeded(url.to_string()),
            _ => JobState::Failed("succeeded without a video URL".to_string()),
        },
        "FAILED" => JobState::Failed(
            task.get("error")
                .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                .unwrap_or_else(|| "unknown error".to_string()),
        ),
        other => JobState::Pending(other.to_string()),
    }
}

#[async_trait]
impl VideoProvider for RunwayProvider {
    fn name(&self) -> &'static str {
        "runway"
    }

    async fn request_video(&self, req: &GenerationRequest) -> Result<String> {
        let body = json!({
            "prompt": req.prompt,
            "model": "gen3",
            "duration": req.duration_secs,
            "aspect_ratio": req.aspect_ratio,
        });

        let resp = self
            .client
            .post(format!("{}/v1/generate", self.base_url))
            .bearer_auth(self.key.expose())
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .context("runway request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("HTTP {}: {}", status.as_u16(), body_snippet(&raw));
        }
        let parsed: Value = serde_json::from_str(&raw).context("runway returned invalid JSON")?;
        let task_id = parsed
            .get("taskId")
            .or_else(|| parsed.get("id"))
            .and_then(|v| v.as_str())
            .context("no taskId in runway response")?
            .to_string();

        let task_url = format!("{}/v1/tasks/{}", self.base_url, task_id);
        let task_url = task_url.as_str();
        poll_job("runway", self.poll_every, self.max_wait, move || async move {
            let task = self.get_json(task_url).await?;
            Ok::<_, anyhow::Error>(task_state(&task))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_states() {
        assert_eq!(
            task_state(&json!({"status": "SUCCEEDED", "output": {"video": "https://r/v.mp4"}})),
            JobState::Succeeded("https://r/v.mp4".into())
        );
        assert_eq!(
            task_state(&json!({"status": "FAILED", "error": "moderation"})),
            JobState::Failed("moderation".into())
        );
        assert_eq!(
            task_state(&json!({"status": "RUNNING"})),
            JobState::Pending("RUNNING".into())
        );
        assert!(matches!(
            task_state(&json!({"status": "SUCCEEDED", "output": {}})),
            JobState::Failed(_)
        ));
    }
}
