//! Titles and descriptions for compilations.

use crate::api::openai::openai_suggest_title;
use crate::config::Secret;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

pub const MAX_TITLE_CHARS: usize = 100;

const TITLE_TEMPLATES: &[&str] = &[
    "🐕 {topic} Compilation | Best Pet Videos",
    "🐱 Cute {topic} - Funny Animals 😹",
    "{topic} Moments | Cutest Pet Videos 🥰",
    "🐶 {topic} Challenge | Hilarious Pets",
    "Adorable {topic} | Best of the Week 🎬",
    "🐾 {topic} Spectacular | Pet Compilation",
    "{topic} Extravaganza | Funniest Animals 😂",
    "🐕 {topic} Overload | Amazing Pet Videos",
];

const HASHTAGS: &str = "#Pets #Dogs #Cats #Shorts #YouTubeShorts #Funny #Cute #AIGenerated";

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]+").expect("valid regex"));

static STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "at", "in", "on", "of", "to", "by", "with", "while", "from", "into",
    "its", "his", "her", "their", "being", "doing", "very", "cute", "adorable", "funny", "silly",
    "hilarious", "playful", "calm", "peaceful", "energetic", "wild", "cutest", "fluffy", "tall",
    "red", "black", "clear", "crystal", "sunny", "this", "that", "some", "for", "caught",
];

/// Most frequent content words across `prompts`, ties broken by first appearance.
pub fn keywords(prompts: &[String], limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0usize;
    for prompt in prompts {
        for m in WORD_RE.find_iter(prompt) {
            let word = m.as_str().to_lowercase();
            if word.len() < 3 || STOPWORDS.contains(&word.as_str()) {
                continue;
            }
            let entry = counts.entry(word).or_insert((0, order));
            entry.0 += 1;
            order += 1;
        }
    }

    let mut ranked: Vec<(String, usize, usize)> =
        counts.into_iter().map(|(w, (c, first))| (w, c, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(limit).map(|(w, _, _)| w).collect()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Caps at `MAX_TITLE_CHARS` characters, ending in "..." when cut.
pub fn truncate_title(title: &str) -> String {
    let title = title.trim();
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let mut cut: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
    cut.truncate(cut.trim_end().len());
    cut.push_str("...");
    cut
}

/// Template title rotated by `sequence`, topic taken from the prompts' keywords.
pub fn template_title(prompts: &[String], sequence: u64) -> Option<String> {
    let words = keywords(prompts, 2);
    if words.is_empty() {
        return None;
    }
    let topic = words.iter().map(|w| title_case(w)).collect::<Vec<_>>().join(" & ");
    let template = TITLE_TEMPLATES[(sequence % TITLE_TEMPLATES.len() as u64) as usize];
    Some(truncate_title(&template.replace("{topic}", &topic)))
}

pub fn timestamp_title(now: DateTime<Local>) -> String {
    format!("Pet Video Compilation {}", now.format("%Y-%m-%d %H:%M"))
}

pub fn describe(prompts: &[String]) -> String {
    let mut out = String::from("🐾 AI-generated pet compilation with voiceover narration\n\nIn this video:\n");
    for (i, prompt) in prompts.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, prompt));
    }
    out.push('\n');
    out.push_str(HASHTAGS);
    out
}

pub struct TitleGenerator {
    client: Client,
    openai: Option<(Secret, String)>,
    timeout: Duration,
}

impl TitleGenerator {
    pub fn new(client: Client, openai_key: Option<Secret>, model: String, timeout: Duration) -> Self {
        Self {
            client,
            openai: openai_key.map(|k| (k, model)),
            timeout,
        }
    }

    /// OpenAI first when configured, then the keyword template, then a timestamp.
    pub async fn title(&self, prompts: &[String], sequence: u64) -> String {
        if let Some((key, model)) = &self.openai {
            match openai_suggest_title(&self.client, key, model, prompts, self.timeout).await {
                Ok(Some(title)) => {
                    info!("OpenAI title: {title}");
                    return truncate_title(&title);
                }
                Ok(None) => warn!("OpenAI gave no usable title, using template"),
                Err(e) => warn!("OpenAI title failed: {e:#}"),
            }
        }

        template_title(prompts, sequence).unwrap_or_else(|| timestamp_title(Local::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn prompts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keywords_rank_by_frequency() {
        let p = prompts(&[
            "A fluffy corgi running through autumn leaves",
            "A corgi swimming in a pool",
            "A cat watching birds from a window",
            "A cat napping",
            "A corgi at the beach",
        ]);
        assert_eq!(keywords(&p, 2), ["corgi", "cat"]);
    }

    #[test]
    fn template_rotates_with_sequence() {
        let p = prompts(&["A husky howling in the snow"]);
        let first = template_title(&p, 0).unwrap();
        assert_eq!(first, "🐕 Husky & Howling Compilation | Best Pet Videos");
        let second = template_title(&p, 1).unwrap();
        assert!(second.starts_with("🐱 Cute Husky & Howling"));
        assert_eq!(template_title(&p, 8).unwrap(), first);
    }

    #[test]
    fn no_keywords_means_no_template_title() {
        assert_eq!(template_title(&prompts(&["a cute"]), 0), None);
        assert_eq!(template_title(&[], 0), None);
    }

    #[test]
    fn titles_are_capped_on_char_boundaries() {
        let long = "🐶".repeat(150);
        let t = truncate_title(&long);
        assert_eq!(t.chars().count(), MAX_TITLE_CHARS);
        assert!(t.ends_with("..."));
        assert_eq!(truncate_title("  Short  "), "Short");
    }

    #[test]
    fn timestamp_fallback_format() {
        let now = Local.with_ymd_and_hms(2025, 3, 9, 7, 5, 0).unwrap();
        assert_eq!(timestamp_title(now), "Pet Video Compilation 2025-03-09 07:05");
    }

    #[test]
    fn description_lists_prompts_and_hashtags() {
        let d = describe(&prompts(&["A kitten pouncing", "A puppy learning to walk"]));
        assert!(d.contains("1. A kitten pouncing\n2. A puppy learning to walk\n"));
        assert!(d.ends_with(HASHTAGS));
    }

    #[tokio::test]
    async fn without_openai_uses_template() {
        let titles = TitleGenerator::new(Client::new(), None, "gpt-4o-mini".into(), Duration::from_secs(1));
        let title = titles.title(&prompts(&["A poodle at a dog spa"]), 2).await;
        assert_eq!(title, "Poodle & Dog Moments | Cutest Pet Videos 🥰");
    }
}
