//! Keyword rules used when no model is available or confident.
//!
//! Matching is plain substring matching on the lower-cased text, so short
//! indicators like "ok" also hit inside longer words ("looks").

use crate::analyze::antispam;
use crate::model::{Category, Sentiment};

pub const NEUTRAL_PHRASES: &[&str] = &[
    "ok",
    "okay",
    "fine",
    "alright",
    "average",
    "normal",
    "regular",
    "nothing special",
    "so so",
    "meh",
    "whatever",
    "i guess",
    "not sure",
    "maybe",
    "perhaps",
    "could be",
    "might be",
    "i think",
    "i suppose",
    "i believe",
    "i assume",
];

pub const POSITIVE_PHRASES: &[&str] = &[
    "love",
    "amazing",
    "great",
    "excellent",
    "fantastic",
    "wonderful",
    "perfect",
    "awesome",
    "brilliant",
    "outstanding",
    "superb",
    "beautiful",
    "gorgeous",
    "stunning",
    "incredible",
    "fabulous",
    "best",
    "favorite",
    "recommend",
    "highly recommend",
    "must have",
    "wow",
    "delighted",
    "thrilled",
    "excited",
    "satisfied",
    "happy",
    "works great",
    "love it",
    "amazing results",
    "perfect for",
    "exactly what",
    "definitely buy",
    "worth it",
    "game changer",
    "soft",
    "smooth",
    "glowing",
    "radiant",
    "hydrated",
    "moisturized",
];

pub const NEGATIVE_PHRASES: &[&str] = &[
    "hate",
    "terrible",
    "awful",
    "horrible",
    "disgusting",
    "disappointed",
    "worst",
    "bad",
    "poor",
    "disappointing",
    "useless",
    "waste",
    "regret",
    "dislike",
    "annoying",
    "frustrating",
    "angry",
    "upset",
    "sad",
    "depressed",
    "unhappy",
    "displeased",
    "unsatisfied",
    "doesn't work",
    "waste of money",
    "not worth it",
    "terrible quality",
    "broke out",
    "irritated",
    "dried out",
    "too harsh",
    "too strong",
    "didn't work",
    "no results",
    "waste of time",
    "overpriced",
];

/// Category keyword lists in priority order; first list with a hit wins.
pub const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Skincare,
        &["skin", "face", "acne", "moisturizer", "serum", "cleanser", "toner", "cream"],
    ),
    (
        Category::Makeup,
        &["makeup", "lipstick", "foundation", "eyeshadow", "mascara", "blush", "concealer"],
    ),
    (
        Category::Fragrance,
        &["perfume", "cologne", "scent", "fragrance", "smell", "aroma"],
    ),
    (
        Category::Haircare,
        &["hair", "shampoo", "conditioner", "styling", "color", "dye", "cut"],
    ),
];

/// Keyword sentiment classifier.
///
/// Neutral phrases short-circuit. Otherwise positive and negative hits are
/// counted; both present or both absent is neutral, else the majority wins.
pub fn sentiment(text: &str) -> Sentiment {
    let lower = text.trim().to_lowercase();
    if lower.chars().count() < 3 {
        return Sentiment::Neutral;
    }
    if NEUTRAL_PHRASES.iter().any(|p| lower.contains(p)) {
        return Sentiment::Neutral;
    }

    let pos = count_hits(&lower, POSITIVE_PHRASES);
    let neg = count_hits(&lower, NEGATIVE_PHRASES);
    match (pos, neg) {
        (0, 0) => Sentiment::Neutral,
        (p, n) if p > 0 && n > 0 => Sentiment::Neutral,
        (p, n) if p > n => Sentiment::Positive,
        (p, n) if n > p => Sentiment::Negative,
        _ => Sentiment::Neutral,
    }
}

/// Keyword category classifier (skincare > makeup > fragrance > haircare).
pub fn category(text: &str) -> Category {
    let lower = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(c, _)| *c)
        .unwrap_or(Category::General)
}

/// Unclamped quality components; `score()` applies the spam penalty and clamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityBreakdown {
    /// 0.5 plus length and structure adjustments.
    pub base: f32,
    /// Whether the rule-based spam detector flags the text.
    pub spam: bool,
}

pub const QUALITY_SPAM_PENALTY: f32 = 0.4;

impl QualityBreakdown {
    pub fn score(&self) -> f32 {
        let penalty = if self.spam { QUALITY_SPAM_PENALTY } else { 0.0 };
        (self.base - penalty).clamp(0.0, 1.0)
    }
}

pub fn quality_breakdown(text: &str) -> QualityBreakdown {
    let mut base = 0.5f32;

    let len = text.trim().chars().count();
    if len > 100 {
        base += 0.2;
    } else if len > 50 {
        base += 0.1;
    } else if len < 10 {
        base -= 0.3;
    }

    if text.chars().any(char::is_uppercase) {
        base += 0.05;
    }
    if text.chars().any(char::is_numeric) {
        base += 0.05;
    }
    if text.contains('?') {
        base += 0.1;
    }
    if text.split_whitespace().count() > 5 {
        base += 0.1;
    }

    QualityBreakdown {
        base,
        spam: antispam::is_spam(text),
    }
}

/// Rule-based quality score in [0,1].
pub fn quality(text: &str) -> f32 {
    quality_breakdown(text).score()
}

fn count_hits(lower: &str, phrases: &[&str]) -> usize {
    phrases.iter().filter(|p| lower.contains(*p)).count()
}
