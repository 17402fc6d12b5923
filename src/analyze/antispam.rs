//! Rule-based spam detector.
//!
//! Deterministic, no model required. A comment is spam if ANY of these hold:
//! - it contains a phrase from `SPAM_PHRASES`
//! - one word makes up more than 40% of all words (only checked above 3 words)
//! - excessive caps AND excessive punctuation
//! - a URL-like substring in a short (<50 chars) text
//! - excessive caps OR excessive punctuation in a very short (<30 chars) text
//!
//! Texts under 5 characters are never spam.

use std::collections::HashMap;

/// Phrases that mark promotional or bait comments.
pub const SPAM_PHRASES: &[&str] = &[
    "buy now",
    "click here",
    "free money",
    "win cash",
    "urgent",
    "limited time",
    "act now",
    "guaranteed",
    "no risk",
    "100% free",
    "make money",
    "work from home",
    "get rich",
    "earn cash",
    "follow me",
    "subscribe",
    "check out my",
    "visit my",
    "dm me",
    "message me",
    "contact me",
    "call me",
    "promo code",
    "discount code",
    "use code",
    "save money",
    "affiliate link",
    "sponsored",
    "advertisement",
    "promotion",
];

const URL_MARKERS: &[&str] = &["http", "www.", ".com", ".net", ".org"];
const PUNCT_CHARS: &str = "!@#$%^&*()";

const MIN_LEN: usize = 5;
const REPETITION_RATIO: f32 = 0.4;
const CAPS_RATIO: f32 = 0.7;
const PUNCT_RATIO: f32 = 0.3;
const SHORT_URL_LEN: usize = 50;
const VERY_SHORT_LEN: usize = 30;

/// Per-signal breakdown; useful for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpamSignals {
    pub phrase: bool,
    pub repetition: bool,
    pub excessive_caps: bool,
    pub excessive_punct: bool,
    pub has_url: bool,
    /// Character count of the raw text.
    pub len: usize,
}

impl SpamSignals {
    pub fn verdict(&self) -> bool {
        self.phrase
            || self.repetition
            || (self.excessive_caps && self.excessive_punct)
            || (self.has_url && self.len < SHORT_URL_LEN)
            || (self.excessive_caps && self.len < VERY_SHORT_LEN)
            || (self.excessive_punct && self.len < VERY_SHORT_LEN)
    }
}

/// Rule-based spam verdict.
pub fn is_spam(text: &str) -> bool {
    match signals(text) {
        Some(s) => s.verdict(),
        None => false,
    }
}

/// Compute the individual signals; `None` when the text is too short to judge.
pub fn signals(text: &str) -> Option<SpamSignals> {
    let lower = text.trim().to_lowercase();
    if lower.chars().count() < MIN_LEN {
        return None;
    }

    let len = text.chars().count();
    let caps = text.chars().filter(|c| c.is_uppercase()).count();
    let punct = text.chars().filter(|c| PUNCT_CHARS.contains(*c)).count();
    // len >= MIN_LEN here, so the divisions are safe
    let caps_ratio = caps as f32 / len as f32;
    let punct_ratio = punct as f32 / len as f32;

    Some(SpamSignals {
        phrase: SPAM_PHRASES.iter().any(|p| lower.contains(p)),
        repetition: has_excessive_repetition(&lower),
        excessive_caps: caps_ratio > CAPS_RATIO,
        excessive_punct: punct_ratio > PUNCT_RATIO,
        has_url: URL_MARKERS.iter().any(|m| lower.contains(m)),
        len,
    })
}

fn has_excessive_repetition(lower: &str) -> bool {
    let words: Vec<&str> = lower.split_whitespace().collect();
    if words.len() <= 3 {
        return false;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for w in &words {
        *counts.entry(w).or_insert(0) += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    max as f32 > words.len() as f32 * REPETITION_RATIO
}
