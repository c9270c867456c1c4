//! Prompt selection with a cooldown window and a persisted usage history.

use crate::config::{PromptConfig, PromptSource};
use crate::error::{Error, Result};
use crate::trends;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const BUILTIN_PROMPTS: &[&str] = &[
    "A cute golden retriever playing fetch in a sunny park",
    "A black cat doing yoga stretches indoors",
    "A fluffy corgi running through autumn leaves",
    "A kitten pouncing on a red ball",
    "A dog swimming in a crystal clear pool",
    "A tabby cat climbing a tall tree",
    "A puppy learning to walk",
    "A cat watching birds from a window",
    "A husky howling in the snow",
    "A Persian cat being groomed",
    "A German Shepherd playing with a frisbee",
    "A rabbit hopping through grass",
    "A poodle at a dog spa",
    "A Siamese cat playing with yarn",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub prompt: String,
    pub last_used: DateTime<Utc>,
    pub use_count: u64,
    /// Value of the generation counter when this prompt was last picked.
    pub last_generation: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub prompt: String,
    pub timestamp: DateTime<Utc>,
    pub generation: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackerState {
    generation: u64,
    records: Vec<PromptRecord>,
    history: VecDeque<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptStats {
    pub total_generated: u64,
    pub unique_prompts: usize,
    pub last_generated: Option<DateTime<Utc>>,
}

/// Deduplicated, non-empty lines (case-insensitive).
fn normalize_pool<I, S>(prompts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    prompts
        .into_iter()
        .map(|p| p.as_ref().trim().to_string())
        .filter(|p| !p.is_empty() && seen.insert(p.to_lowercase()))
        .collect()
}

/// Prompt pool for the configured source. An unreadable prompts file is a configuration error.
pub fn build_pool(cfg: &PromptConfig) -> Result<Vec<String>> {
    let pool = match &cfg.source {
        PromptSource::Builtin => normalize_pool(BUILTIN_PROMPTS),
        PromptSource::File(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                Error::configuration(format!("PROMPTS_FILE {}: {e}", path.display()))
            })?;
            normalize_pool(
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.starts_with('#')),
            )
        }
        PromptSource::Trends => {
            let mut rng = StdRng::from_entropy();
            let mut pool = trends::trending_pool(&mut rng, cfg.trend_pool_size);
            pool.extend(BUILTIN_PROMPTS.iter().map(|s| s.to_string()));
            normalize_pool(pool)
        }
    };
    Ok(pool)
}

pub struct PromptTracker {
    pool: Vec<String>,
    cooldown: u64,
    history_cap: usize,
    path: Option<PathBuf>,
    state: TrackerState,
    rng: StdRng,
}

impl PromptTracker {
    /// In-memory tracker; nothing is persisted.
    pub fn new(pool: Vec<String>, cooldown: usize, history_cap: usize) -> Self {
        Self {
            pool: normalize_pool(pool),
            cooldown: cooldown as u64,
            history_cap: history_cap.max(1),
            path: None,
            state: TrackerState::default(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Tracker backed by `path`. A missing or unreadable history starts fresh.
    pub async fn load(path: &Path, pool: Vec<String>, cooldown: usize, history_cap: usize) -> Self {
        let mut tracker = Self::new(pool, cooldown, history_cap);
        tracker.path = Some(path.to_path_buf());

        match tokio::fs::read_to_string(path).await {
            Ok(text) => match serde_json::from_str::<TrackerState>(&text) {
                Ok(state) => {
                    debug!(
                        generation = state.generation,
                        prompts = state.records.len(),
                        "loaded prompt history"
                    );
                    tracker.state = state;
                }
                Err(e) => warn!("prompt history {} is corrupt, starting fresh: {e}", path.display()),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no prompt history at {}, starting fresh", path.display());
            }
            Err(e) => warn!("could not read prompt history {}: {e}", path.display()),
        }
        tracker
    }

    pub fn pool(&self) -> &[String] {
        &self.pool
    }

    fn record_of(&self, prompt: &str) -> Option<&PromptRecord> {
        let key = prompt.to_lowercase();
        self.state.records.iter().find(|r| r.prompt.to_lowercase() == key)
    }

    fn in_cooldown(&self, prompt: &str) -> bool {
        match self.record_of(prompt) {
            Some(r) => self.state.generation.saturating_sub(r.last_generation) < self.cooldown,
            None => false,
        }
    }

    /// Picks uniformly among prompts outside the cooldown window, falling back
    /// to the least recently used one, and records the pick.
    pub fn next_prompt(&mut self) -> Result<String> {
        if self.pool.is_empty() {
            return Err(Error::configuration("prompt pool is empty"));
        }

        let eligible: Vec<&String> = self.pool.iter().filter(|p| !self.in_cooldown(p)).collect();
        let chosen = match eligible.choose(&mut self.rng) {
            Some(p) => (*p).clone(),
            None => {
                let lru = self
                    .pool
                    .iter()
                    .min_by_key(|p| self.record_of(p).map(|r| r.last_generation).unwrap_or(0))
                    .cloned();
                debug!("every prompt is cooling down, reusing the least recent");
                lru.ok_or_else(|| Error::configuration("prompt pool is empty"))?
            }
        };

        self.record(&chosen, Utc::now());
        Ok(chosen)
    }

    fn record(&mut self, prompt: &str, at: DateTime<Utc>) {
        self.state.generation += 1;
        let generation = self.state.generation;
        let key = prompt.to_lowercase();

        match self
            .state
            .records
            .iter_mut()
            .find(|r| r.prompt.to_lowercase() == key)
        {
            Some(r) => {
                r.last_used = at;
                r.use_count += 1;
                r.last_generation = generation;
            }
            None => self.state.records.push(PromptRecord {
                prompt: prompt.to_string(),
                last_used: at,
                use_count: 1,
                last_generation: generation,
            }),
        }

        self.state.history.push_back(HistoryEntry {
            prompt: prompt.to_string(),
            timestamp: at,
            generation,
        });
        while self.state.history.len() > self.history_cap {
            self.state.history.pop_front();
        }
    }

    /// Writes the tracking file via a temp file and rename. No-op for in-memory trackers.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(&self.state)
            .map_err(|e| std::io::Error::other(format!("serialize prompt history: {e}")))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.state.history.iter()
    }

    pub fn records(&self) -> &[PromptRecord] {
        &self.state.records
    }

    pub fn statistics(&self) -> PromptStats {
        PromptStats {
            total_generated: self.state.generation,
            unique_prompts: self.state.records.len(),
            last_generated: self.state.history.back().map(|h| h.timestamp),
        }
    }
}
