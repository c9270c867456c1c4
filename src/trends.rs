//! Prompt composition from style templates and currently popular subjects.
//!
//! Used when `PROMPT_SOURCE=trends` to build a larger, more varied pool than
//! the built-in list.

use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Cute,
    Funny,
    Active,
    Relaxing,
    Nature,
}

impl Style {
    pub const ALL: [Style; 5] = [
        Style::Cute,
        Style::Funny,
        Style::Active,
        Style::Relaxing,
        Style::Nature,
    ];

    fn templates(&self) -> &'static [&'static str] {
        match self {
            Style::Cute => &[
                "A {animal} doing {action}",
                "An adorable {animal} {action}",
                "{animal} being cute while {action}",
                "Cutest {animal} {action}",
            ],
            Style::Funny => &[
                "A funny {animal} {action}",
                "{animal} caught {action}",
                "Hilarious {animal} {action}",
                "Silly {animal} {action}",
            ],
            Style::Active => &[
                "An energetic {animal} {action}",
                "{animal} running and {action}",
                "{animal} playing and {action}",
                "Playful {animal} {action}",
            ],
            Style::Relaxing => &[
                "A peaceful {animal} {action}",
                "{animal} relaxing and {action}",
                "Calm {animal} {action}",
            ],
            Style::Nature => &[
                "A {animal} in nature {action}",
                "{animal} outdoors {action}",
                "Wild {animal} {action}",
            ],
        }
    }

    fn actions(&self) -> &'static [&'static str] {
        match self {
            Style::Cute => &["playing", "sleeping", "yawning", "stretching", "learning tricks"],
            Style::Funny => &["failing at tricks", "being jealous", "chasing its tail", "confused by a mirror"],
            Style::Active => &["jumping", "fetching", "playing fetch", "swimming", "sprinting"],
            Style::Relaxing => &["napping", "grooming", "watching birds", "lounging", "sunbathing"],
            Style::Nature => &["exploring", "running wild", "sniffing flowers", "adventuring", "discovering"],
        }
    }
}

const POPULAR_ANIMALS: &[&str] = &["golden retriever", "cat", "corgi", "husky", "persian cat", "poodle"];
const TRENDING_ANIMALS: &[&str] = &["capybara", "axolotl", "ferret", "bunny", "hamster"];
const LOCATIONS: &[&str] = &[
    "in a sunny park",
    "at the beach",
    "in the snow",
    "in autumn leaves",
    "at a dog spa",
    "at home",
    "in the backyard",
    "at the dog park",
    "in the garden",
    "by a lake",
];

/// Popular subjects 70% of the time, trending ones otherwise; a location is
/// appended 60% of the time.
pub fn compose_prompt<R: Rng + ?Sized>(rng: &mut R, style: Option<Style>) -> String {
    let style = style.unwrap_or_else(|| Style::ALL[rng.gen_range(0..Style::ALL.len())]);

    let animals = if rng.gen_bool(0.7) { POPULAR_ANIMALS } else { TRENDING_ANIMALS };
    let animal = animals.choose(rng).copied().unwrap_or("cat");
    let action = style.actions().choose(rng).copied().unwrap_or("playing");
    let template = style.templates().choose(rng).copied().unwrap_or("A {animal} {action}");

    let mut prompt = template.replace("{animal}", animal).replace("{action}", action);
    if rng.gen_bool(0.6) {
        if let Some(location) = LOCATIONS.choose(rng) {
            prompt.push(' ');
            prompt.push_str(location);
        }
    }

    let mut chars = prompt.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => prompt,
    }
}

/// Up to `size` distinct prompts (case-insensitive).
pub fn trending_pool<R: Rng + ?Sized>(rng: &mut R, size: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut pool = Vec::with_capacity(size);
    let max_attempts = size.saturating_mul(20).max(20);

    for _ in 0..max_attempts {
        if pool.len() >= size {
            break;
        }
        let prompt = compose_prompt(rng, None);
        if seen.insert(prompt.to_lowercase()) {
            pool.push(prompt);
        }
    }
    pool
}
