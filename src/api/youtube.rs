//! YouTube Data API v3 uploads with per-account OAuth refresh tokens.

use crate::compiler::Compilation;
use crate::config::{Secret, UploadConfig};
use crate::rotation::{Account, VideoHost};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::LOCATION;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";
const THUMBNAIL_URL: &str = "https://www.googleapis.com/upload/youtube/v3/thumbnails/set";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const MAX_DESCRIPTION_CHARS: usize = 5000;
const MAX_TITLE_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: Secret,
    pub token_uri: String,
    pub refresh_token: Secret,
}

#[derive(Deserialize)]
struct ClientSection {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    token_uri: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenFile {
    refresh_token: String,
}

/// Sibling token file: `youtube_creds_3.json` -> `youtube_creds_3_token.json`.
pub fn token_path(creds: &Path) -> PathBuf {
    let stem = creds.file_stem().and_then(|s| s.to_str()).unwrap_or("youtube_creds");
    creds.with_file_name(format!("{stem}_token.json"))
}

/// Client JSON in `installed`, `web` or flat layout; the refresh token may
/// live in the same document or in `token_json`.
pub fn parse_credentials(creds_json: &str, token_json: Option<&str>) -> Result<OAuthCredentials> {
    let root: Value = serde_json::from_str(creds_json).context("credential file is not JSON")?;
    let section = root
        .get("installed")
        .or_else(|| root.get("web"))
        .cloned()
        .unwrap_or(root);
    let client: ClientSection =
        serde_json::from_value(section).context("credential file lacks client_id/client_secret")?;

    let refresh_token = match client.refresh_token.filter(|t| !t.is_empty()) {
        Some(t) => t,
        None => {
            let token_json = token_json.context("no refresh token in credentials and no token file")?;
            let token: TokenFile = serde_json::from_str(token_json).context("token file lacks refresh_token")?;
            token.refresh_token
        }
    };

    Ok(OAuthCredentials {
        client_id: client.client_id,
        client_secret: Secret::new(client.client_secret),
        token_uri: client.token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
        refresh_token: Secret::new(refresh_token),
    })
}

pub async fn load_credentials(path: &Path) -> Result<OAuthCredentials> {
    let creds = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let token = tokio::fs::read_to_string(token_path(path)).await.ok();
    parse_credentials(&creds, token.as_deref())
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// `snippet` + `status` resource for the insert call.
pub fn video_resource(compilation: &Compilation, cfg: &UploadConfig) -> Value {
    json!({
        "snippet": {
            "title": truncate_chars(&compilation.title, MAX_TITLE_CHARS),
            "description": truncate_chars(&compilation.description, MAX_DESCRIPTION_CHARS),
            "tags": cfg.tags,
            "categoryId": cfg.category_id,
            "defaultLanguage": "en",
        },
        "status": {
            "privacyStatus": cfg.privacy_status,
            "selfDeclaredMadeForKids": false,
        },
    })
}

struct CachedToken {
    access_token: Secret,
    expires_at: DateTime<Utc>,
}

pub struct YouTubeHost {
    client: Client,
    cfg: UploadConfig,
    api_timeout: Duration,
    upload_timeout: Duration,
    tokens: Mutex<HashMap<String, CachedToken>>,
}

impl YouTubeHost {
    pub fn new(client: Client, cfg: UploadConfig, api_timeout: Duration, upload_timeout: Duration) -> Self {
        Self {
            client,
            cfg,
            api_timeout,
            upload_timeout,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    async fn access_token(&self, account: &Account) -> Result<Secret> {
        let mut tokens = self.tokens.lock().await;
        if let Some(cached) = tokens.get(&account.id) {
            if cached.expires_at > Utc::now() + chrono::Duration::seconds(60) {
                return Ok(cached.access_token.clone());
            }
        }

        let creds = load_credentials(&account.credentials).await?;
        let resp = self
            .client
            .post(&creds.token_uri)
            .form(&[
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.expose()),
                ("refresh_token", creds.refresh_token.expose()),
                ("grant_type", "refresh_token"),
            ])
            .timeout(self.api_timeout)
            .send()
            .await
            .context("token refresh request failed")?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let reason = body
                .get("error_description")
                .or_else(|| body.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            anyhow::bail!("token refresh HTTP {}: {}", status.as_u16(), reason);
        }

        let access = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .context("token response without access_token")?;
        let expires_in = body.get("expires_in").and_then(|v| v.as_i64()).unwrap_or(3600);
        let token = Secret::new(access);
        tokens.insert(
            account.id.clone(),
            CachedToken {
                access_token: token.clone(),
                expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
            },
        );
        debug!(account = %account.id, "access token refreshed");
        Ok(token)
    }

    /// Drops the cached access token so the next upload refreshes it.
    async fn forget_token(&self, account_id: &str) -> bool {
        self.tokens.lock().await.remove(account_id).is_some()
    }

    async fn set_thumbnail(&self, token: &Secret, video_id: &str, jpg: &Path) -> Result<()> {
        let bytes = tokio::fs::read(jpg)
            .await
            .with_context(|| format!("Failed to read {}", jpg.display()))?;
        let resp = self
            .client
            .post(THUMBNAIL_URL)
            .query(&[("videoId", video_id)])
            .bearer_auth(token.expose())
            .header("Content-Type", "image/jpeg")
            .body(bytes)
            .timeout(self.api_timeout)
            .send()
            .await
            .context("thumbnail request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("thumbnail HTTP {}", resp.status().as_u16());
        }
        Ok(())
    }
}

#[async_trait]
impl VideoHost for YouTubeHost {
    async fn upload(&self, account: &Account, compilation: &Compilation) -> Result<String> {
        let token = self.access_token(account).await?;
        let bytes = tokio::fs::read(&compilation.output)
            .await
            .with_context(|| format!("Failed to read {}", compilation.output.display()))?;

        let init = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(token.expose())
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", bytes.len().to_string())
            .json(&video_resource(compilation, &self.cfg))
            .timeout(self.api_timeout)
            .send()
            .await
            .context("upload session request failed")?;

        if init.status() == StatusCode::UNAUTHORIZED {
            self.forget_token(&account.id).await;
        }
        if !init.status().is_success() {
            let status = init.status().as_u16();
            let raw = init.text().await.unwrap_or_default();
            anyhow::bail!("upload session HTTP {}: {}", status, raw.chars().take(300).collect::<String>());
        }
        let session = init
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .context("upload session without Location header")?
            .to_string();

        info!(account = %account.id, bytes = bytes.len(), "transferring video");
        let resp = self
            .client
            .put(&session)
            .bearer_auth(token.expose())
            .header("Content-Type", "video/mp4")
            .body(bytes)
            .timeout(self.upload_timeout)
            .send()
            .await
            .context("video transfer failed")?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            self.forget_token(&account.id).await;
        }
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("video transfer HTTP {}: {}", status.as_u16(), raw.chars().take(300).collect::<String>());
        }
        let video: Value = serde_json::from_str(&raw).context("upload response is not JSON")?;
        let video_id = video
            .get("id")
            .and_then(|v| v.as_str())
            .context("upload response without video id")?
            .to_string();

        if let Some(jpg) = &compilation.thumbnail {
            if let Err(e) = self.set_thumbnail(&token, &video_id, jpg).await {
                warn!(account = %account.id, "thumbnail not set: {e:#}");
            }
        }

        Ok(video_id)
    }
}
