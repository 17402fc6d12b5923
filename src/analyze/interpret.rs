//! Turns raw adapter output into each task's canonical value.
//!
//! Every function takes the adapter's output for one text (or `None` when the
//! adapter was unavailable or failed) and the text itself for rule fallbacks.
//! Malformed output is an `InterpretError`; the dispatcher degrades only that
//! comment.

use crate::analyze::adapter::RawOutput;
use crate::analyze::{antispam, rules};
use crate::config::Thresholds;
use crate::error::InterpretError;
use crate::model::{Category, ConfidenceScores, Sentiment, Task};

/// Confidence for a task that produced no adapter result.
pub const NO_RESULT_CONFIDENCE: f32 = 0.3;
/// Confidence for a task whose adapter result carried no usable score.
pub const UNSCORED_CONFIDENCE: f32 = 0.7;

const QUALITY_LABEL_ADJUST: f32 = 0.2;

/// Adapter outputs for one text, one slot per task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskOutputs<'a> {
    pub sentiment: Option<&'a RawOutput>,
    pub spam: Option<&'a RawOutput>,
    pub category: Option<&'a RawOutput>,
    pub quality: Option<&'a RawOutput>,
}

/// All four canonical values plus per-task confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpreted {
    pub sentiment: Sentiment,
    pub is_spam: bool,
    pub category: Category,
    pub quality_score: f32,
    pub confidence: ConfidenceScores,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter {
    thresholds: Thresholds,
}

impl Interpreter {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn interpret(&self, text: &str, out: TaskOutputs<'_>) -> Result<Interpreted, InterpretError> {
        Ok(Interpreted {
            sentiment: self.sentiment(out.sentiment, text)?,
            is_spam: self.spam(out.spam, text)?,
            category: category(out.category, text)?,
            quality_score: quality(out.quality, text)?,
            confidence: ConfidenceScores {
                sentiment: confidence(out.sentiment),
                spam: confidence(out.spam),
                category: confidence(out.category),
                quality: confidence(out.quality),
            },
        })
    }

    /// Top label wins unless it is neutral, below the confidence floor (rules
    /// decide), or within the ambiguity margin of the runner-up (neutral).
    /// A lone label has no runner-up; below `sentiment_single_floor` it reads
    /// as neutral.
    pub fn sentiment(&self, raw: Option<&RawOutput>, text: &str) -> Result<Sentiment, InterpretError> {
        let Some(raw) = raw else {
            return Ok(rules::sentiment(text));
        };
        if let RawOutput::Single(ls) = raw {
            if !ls.score.is_finite() {
                return Err(InterpretError::NonFinite {
                    task: Task::Sentiment,
                });
            }
            if ls.score < self.thresholds.sentiment_single_floor {
                return Ok(Sentiment::Neutral);
            }
            return Ok(sentiment_label(&ls.label.to_lowercase()));
        }

        let ranked = ranked(raw, Task::Sentiment)?;
        let (label, top) = ranked[0];
        let label = label.to_lowercase();

        if label.contains("neutral") || label.contains("neither") {
            return Ok(Sentiment::Neutral);
        }
        if top < self.thresholds.sentiment_floor {
            return Ok(rules::sentiment(text));
        }
        if let Some(&(_, second)) = ranked.get(1) {
            if top - second < self.thresholds.sentiment_margin {
                return Ok(Sentiment::Neutral);
            }
        }
        Ok(sentiment_label(&label))
    }

    /// Confident model verdicts stand; below `spam_trust` the rule verdict
    /// breaks any disagreement.
    pub fn spam(&self, raw: Option<&RawOutput>, text: &str) -> Result<bool, InterpretError> {
        let Some(raw) = raw else {
            return Ok(antispam::is_spam(text));
        };
        let ranked = ranked(raw, Task::Spam)?;
        let (label, score) = ranked[0];
        let model = spam_label(label);
        if score > self.thresholds.spam_trust {
            return Ok(model);
        }
        let rule = antispam::is_spam(text);
        Ok(if model != rule { rule } else { model })
    }
}

/// Highest-scoring label from the fixed set; rules when none match.
pub fn category(raw: Option<&RawOutput>, text: &str) -> Result<Category, InterpretError> {
    let Some(raw) = raw else {
        return Ok(rules::category(text));
    };
    let ranked = ranked(raw, Task::Category)?;
    Ok(ranked
        .iter()
        .find_map(|(label, _)| Category::from_label(label))
        .unwrap_or_else(|| rules::category(text)))
}

/// "high" labels add 0.2, "low" labels subtract 0.2, anything else passes the
/// score through. Result is in [0,1].
pub fn quality(raw: Option<&RawOutput>, text: &str) -> Result<f32, InterpretError> {
    let Some(raw) = raw else {
        return Ok(rules::quality(text));
    };
    let ranked = ranked(raw, Task::Quality)?;
    let (label, score) = ranked[0];
    let label = label.to_lowercase();
    let adjusted = if label.contains("high") {
        score + QUALITY_LABEL_ADJUST
    } else if label.contains("low") {
        score - QUALITY_LABEL_ADJUST
    } else {
        score
    };
    Ok(adjusted.clamp(0.0, 1.0))
}

/// Adapter's top score, 0.7 if it has none, 0.3 without a result.
pub fn confidence(raw: Option<&RawOutput>) -> f32 {
    match raw {
        None => NO_RESULT_CONFIDENCE,
        Some(r) => r
            .top_score()
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(0.0, 1.0))
            .unwrap_or(UNSCORED_CONFIDENCE),
    }
}

/// Lower-cased label to polarity; anything unrecognized is neutral.
fn sentiment_label(label: &str) -> Sentiment {
    if label.contains("neutral") || label.contains("neither") {
        Sentiment::Neutral
    } else if label.contains("pos") {
        Sentiment::Positive
    } else if label.contains("neg") {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

fn spam_label(label: &str) -> bool {
    let l = label.to_uppercase().replace([' ', '-'], "_");
    if l.contains("NOT_SPAM") || l == "HAM" {
        return false;
    }
    l.contains("SPAM")
}

/// Flatten any output shape into (label, score) pairs sorted by score, highest
/// first. Never empty.
fn ranked(raw: &RawOutput, task: Task) -> Result<Vec<(&str, f32)>, InterpretError> {
    let mut pairs: Vec<(&str, f32)> = match raw {
        RawOutput::Single(ls) => vec![(ls.label.as_str(), ls.score)],
        RawOutput::Ranked(v) => v.iter().map(|ls| (ls.label.as_str(), ls.score)).collect(),
        RawOutput::ZeroShot { labels, scores } => {
            if labels.len() != scores.len() {
                return Err(InterpretError::Misaligned {
                    task,
                    labels: labels.len(),
                    scores: scores.len(),
                });
            }
            labels
                .iter()
                .map(String::as_str)
                .zip(scores.iter().copied())
                .collect()
        }
    };
    if pairs.is_empty() {
        return Err(InterpretError::Empty { task });
    }
    if pairs.iter().any(|(_, s)| !s.is_finite()) {
        return Err(InterpretError::NonFinite { task });
    }
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::adapter::LabelScore;

    fn ranked_out(pairs: &[(&str, f32)]) -> RawOutput {
        RawOutput::Ranked(pairs.iter().map(|(l, s)| LabelScore::new(*l, *s)).collect())
    }

    fn interp() -> Interpreter {
        Interpreter::new(Thresholds::default())
    }

    #[test]
    fn confident_sentiment_label_is_used() {
        let raw = ranked_out(&[("NEGATIVE", 0.1), ("POSITIVE", 0.9)]);
        assert_eq!(
            interp().sentiment(Some(&raw), "whatever").unwrap(),
            Sentiment::Positive
        );
        let raw = ranked_out(&[("negative", 0.8), ("positive", 0.2)]);
        assert_eq!(interp().sentiment(Some(&raw), "").unwrap(), Sentiment::Negative);
    }

    #[test]
    fn close_scores_are_neutral_either_way() {
        let a = ranked_out(&[("POSITIVE", 0.52), ("NEGATIVE", 0.50)]);
        let b = ranked_out(&[("POSITIVE", 0.50), ("NEGATIVE", 0.52)]);
        let text = "I love this, amazing";
        assert_eq!(interp().sentiment(Some(&a), text).unwrap(), Sentiment::Neutral);
        assert_eq!(interp().sentiment(Some(&b), text).unwrap(), Sentiment::Neutral);
    }

    #[test]
    fn low_confidence_sentiment_uses_rules() {
        let raw = ranked_out(&[("NEGATIVE", 0.45), ("POSITIVE", 0.30), ("NEUTRAL", 0.25)]);
        assert_eq!(
            interp()
                .sentiment(Some(&raw), "I love this serum, amazing glow!")
                .unwrap(),
            Sentiment::Positive
        );
    }

    #[test]
    fn neutral_label_short_circuits() {
        let raw = ranked_out(&[("Neutral", 0.95), ("Positive", 0.05)]);
        assert_eq!(
            interp().sentiment(Some(&raw), "love love love").unwrap(),
            Sentiment::Neutral
        );
    }

    #[test]
    fn empty_ranking_is_malformed() {
        let raw = RawOutput::Ranked(vec![]);
        assert_eq!(
            interp().sentiment(Some(&raw), "hello"),
            Err(InterpretError::Empty {
                task: Task::Sentiment
            })
        );
    }

    #[test]
    fn confident_spam_verdict_is_trusted() {
        let raw = RawOutput::Single(LabelScore::new("SPAM", 0.9));
        assert!(interp().spam(Some(&raw), "lovely serum, thanks").unwrap());
        let raw = RawOutput::Single(LabelScore::new("NOT_SPAM", 0.9));
        assert!(!interp().spam(Some(&raw), "BUY NOW!!! CLICK HERE!!!").unwrap());
    }

    #[test]
    fn unsure_spam_verdict_defers_to_rules() {
        let raw = RawOutput::Single(LabelScore::new("NOT_SPAM", 0.55));
        assert!(interp().spam(Some(&raw), "BUY NOW!!! CLICK HERE!!!").unwrap());
        let raw = RawOutput::Single(LabelScore::new("SPAM", 0.55));
        assert!(!interp().spam(Some(&raw), "lovely serum, thanks").unwrap());
    }

    #[test]
    fn spam_labels_are_not_confused_with_not_spam() {
        assert!(spam_label("SPAM"));
        assert!(spam_label("spam"));
        assert!(!spam_label("NOT_SPAM"));
        assert!(!spam_label("not spam"));
        assert!(!spam_label("ham"));
    }

    #[test]
    fn zero_shot_category_takes_best_known_label() {
        let raw = RawOutput::ZeroShot {
            labels: vec!["lipstick".into(), "fragrance".into(), "makeup".into()],
            scores: vec![0.5, 0.2, 0.3],
        };
        // "lipstick" is not in the fixed set, next best is makeup
        assert_eq!(category(Some(&raw), "").unwrap(), Category::Makeup);
    }

    #[test]
    fn category_without_known_labels_uses_rules() {
        let raw = ranked_out(&[("beauty", 0.9)]);
        assert_eq!(category(Some(&raw), "my new perfume").unwrap(), Category::Fragrance);
    }

    #[test]
    fn misaligned_zero_shot_is_malformed() {
        let raw = RawOutput::ZeroShot {
            labels: vec!["makeup".into()],
            scores: vec![0.5, 0.5],
        };
        assert!(matches!(
            category(Some(&raw), "x"),
            Err(InterpretError::Misaligned { labels: 1, scores: 2, .. })
        ));
    }

    #[test]
    fn quality_labels_shift_score() {
        let hi = RawOutput::Single(LabelScore::new("HIGH_QUALITY", 0.9));
        assert_eq!(quality(Some(&hi), "").unwrap(), 1.0);
        let lo = RawOutput::Single(LabelScore::new("LOW_QUALITY", 0.1));
        assert_eq!(quality(Some(&lo), "").unwrap(), 0.0);
        let mid = RawOutput::Single(LabelScore::new("MEDIUM_QUALITY", 0.6));
        assert!((quality(Some(&mid), "").unwrap() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn confidence_defaults() {
        assert_eq!(confidence(None), NO_RESULT_CONFIDENCE);
        let raw = RawOutput::Ranked(vec![LabelScore::new("a", 0.4), LabelScore::new("b", 0.8)]);
        assert!((confidence(Some(&raw)) - 0.8).abs() < 1e-6);
        assert_eq!(confidence(Some(&RawOutput::Ranked(vec![]))), UNSCORED_CONFIDENCE);
    }

    #[test]
    fn rules_only_interpretation() {
        let r = interp()
            .interpret("I love this serum, amazing glow!", TaskOutputs::default())
            .unwrap();
        assert_eq!(r.sentiment, Sentiment::Positive);
        assert_eq!(r.category, Category::Skincare);
        assert!(!r.is_spam);
        assert_eq!(r.confidence, ConfidenceScores::uniform(NO_RESULT_CONFIDENCE));
    }
}
