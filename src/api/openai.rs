use crate::config::Secret;
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
const MAX_PROMPTS_CHARS: usize = 6_000;

fn trim_copy_utf8_safe(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }

    let mut cut = max_bytes.min(input.len());
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}

pub(crate) fn openai_extract_output_text(resp_json: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error").filter(|e| !e.is_null()) {
        let msg = err.get("message").and_then(|v| v.as_str()).unwrap_or("");
        let code = err.get("code").and_then(|v| v.as_str()).unwrap_or("");
        warn!("OpenAI error: {} {}", code, msg);
        return None;
    }

    let output = root.get("output")?.as_array()?;
    output
        .iter()
        .filter_map(|item| item.get("content").and_then(|v| v.as_array()))
        .flatten()
        .find(|entry| entry.get("type").and_then(|v| v.as_str()) == Some("output_text"))
        .and_then(|entry| entry.get("text").and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// First non-empty line, stripped of wrapping quotes.
fn clean_title(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();
    (!line.is_empty()).then(|| line.to_string())
}

/// Asks the model for one title covering the given clip prompts.
/// `Ok(None)` means the model answered but gave nothing usable.
pub async fn openai_suggest_title(
    client: &Client,
    key: &Secret,
    model: &str,
    prompts: &[String],
    timeout: Duration,
) -> Result<Option<String>> {
    let listing = prompts
        .iter()
        .map(|p| format!("- {}", p))
        .collect::<Vec<_>>()
        .join("\n");
    let listing = trim_copy_utf8_safe(&listing, MAX_PROMPTS_CHARS);

    let prompt = format!(
        "A YouTube compilation is made of these short AI-generated pet clips:\n{}\n\nWrite ONE catchy YouTube title for the compilation.\n- At most 90 characters.\n- One or two emoji allowed.\n- No hashtags, no quotes.\n- Return only the title.",
        listing
    );

    let body = json!({
        "model": model,
        "input": [
            {"role": "system", "content": "You write short, upbeat video titles."},
            {"role": "user", "content": prompt},
        ],
    });

    let resp = client
        .post(RESPONSES_URL)
        .bearer_auth(key.expose())
        .json(&body)
        .timeout(timeout)
        .send()
        .await
        .context("OpenAI request failed")?;

    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        let snippet = raw.chars().take(800).collect::<String>();
        anyhow::bail!("OpenAI HTTP {}: {}", status.as_u16(), snippet);
    }

    let title = openai_extract_output_text(&raw).and_then(|t| clean_title(&t));
    debug!(?title, "OpenAI title suggestion");
    Ok(title)
}
