//! Named analysis presets that trade throughput for accuracy.
//!
//! `custom` runs on the configured values as they are. The other modes replace
//! batch size, worker count and the sentiment/spam confidence thresholds with a
//! fixed preset. `fast` also keeps spam, category and quality on rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{AnalyzerConfig, Thresholds};
use crate::error::ModeError;
use crate::model::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Fast,
    Balanced,
    Accurate,
    #[default]
    Custom,
}

impl AnalysisMode {
    pub const ALL: [AnalysisMode; 4] = [
        AnalysisMode::Fast,
        AnalysisMode::Balanced,
        AnalysisMode::Accurate,
        AnalysisMode::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisMode::Fast => "fast",
            AnalysisMode::Balanced => "balanced",
            AnalysisMode::Accurate => "accurate",
            AnalysisMode::Custom => "custom",
        }
    }

    /// Effective dispatch settings for this mode on top of `cfg`.
    pub fn profile(self, cfg: &AnalyzerConfig) -> ModeProfile {
        let preset = |batch_size: usize,
                      max_workers: usize,
                      sentiment_floor: f32,
                      spam_trust: f32,
                      model_tasks: &[Task]| {
            ModeProfile {
                mode: self,
                batch_size,
                max_workers,
                thresholds: Thresholds {
                    sentiment_floor,
                    spam_trust,
                    ..cfg.thresholds
                },
                model_tasks: model_tasks.to_vec(),
            }
        };
        match self {
            AnalysisMode::Fast => preset(16, 2, 0.6, cfg.thresholds.spam_trust, &[Task::Sentiment]),
            AnalysisMode::Balanced => preset(8, 4, 0.7, 0.6, &Task::ALL),
            AnalysisMode::Accurate => preset(4, 2, 0.8, 0.7, &Task::ALL),
            AnalysisMode::Custom => ModeProfile {
                mode: self,
                batch_size: cfg.batch_size.max(1),
                max_workers: cfg.max_workers.max(1),
                thresholds: cfg.thresholds,
                model_tasks: Task::ALL.to_vec(),
            },
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        AnalysisMode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ModeError::Unknown(wanted.to_string()))
    }
}

/// Settings the dispatcher runs with under one mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeProfile {
    pub mode: AnalysisMode,
    pub batch_size: usize,
    pub max_workers: usize,
    pub thresholds: Thresholds,
    /// Tasks allowed to call their adapter; the rest run on rules.
    pub model_tasks: Vec<Task>,
}

impl ModeProfile {
    pub fn uses_model(&self, task: Task) -> bool {
        self.model_tasks.contains(&task)
    }
}
