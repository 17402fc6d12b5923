//! Shared data types for comments, per-comment analysis results and jobs.
//!
//! These are the shapes the API returns and the job controller publishes, so they
//! all serialize with `serde` in lower-case/snake_case form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall polarity of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

/// Topical category. The set is fixed; anything unmatched is `General`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Skincare,
    Makeup,
    Fragrance,
    Haircare,
    General,
}

impl Category {
    /// Candidate labels in the order handed to zero-shot adapters.
    pub const ALL: [Category; 5] = [
        Category::Skincare,
        Category::Makeup,
        Category::Fragrance,
        Category::Haircare,
        Category::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Skincare => "skincare",
            Category::Makeup => "makeup",
            Category::Fragrance => "fragrance",
            Category::Haircare => "haircare",
            Category::General => "general",
        }
    }

    /// Case-insensitive label lookup; `None` for labels outside the fixed set.
    pub fn from_label(label: &str) -> Option<Self> {
        let l = label.trim().to_ascii_lowercase();
        Category::ALL.into_iter().find(|c| c.as_str() == l)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four independent classification axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Sentiment,
    Spam,
    Category,
    Quality,
}

impl Task {
    pub const ALL: [Task; 4] = [Task::Sentiment, Task::Spam, Task::Category, Task::Quality];

    pub fn as_str(self) -> &'static str {
        match self {
            Task::Sentiment => "sentiment",
            Task::Spam => "spam",
            Task::Category => "category",
            Task::Quality => "quality",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence in [0,1] per task. Serialized as a flat `{task: value}` map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScores {
    pub sentiment: f32,
    pub spam: f32,
    pub category: f32,
    pub quality: f32,
}

impl ConfidenceScores {
    /// Same confidence for every task.
    pub fn uniform(value: f32) -> Self {
        let v = value.clamp(0.0, 1.0);
        Self {
            sentiment: v,
            spam: v,
            category: v,
            quality: v,
        }
    }

    pub fn get(&self, task: Task) -> f32 {
        match task {
            Task::Sentiment => self.sentiment,
            Task::Spam => self.spam,
            Task::Category => self.category,
            Task::Quality => self.quality,
        }
    }
}

/// Final, immutable four-way classification of one comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub comment_id: String,
    pub text: String,
    pub sentiment: Sentiment,
    pub category: Category,
    pub is_spam: bool,
    /// In [0,1].
    pub quality_score: f32,
    #[serde(rename = "confidence")]
    pub confidence_scores: ConfidenceScores,
    /// Seconds; 0 for cache hits.
    pub processing_time: f64,
}

/// Confidence used for every task when a comment degrades to the default result.
pub const FALLBACK_CONFIDENCE: f32 = 0.3;

impl AnalysisResult {
    /// All-neutral result used when assembling a comment's result fails.
    pub fn fallback(comment_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            comment_id: comment_id.into(),
            text: text.into(),
            sentiment: Sentiment::Neutral,
            category: Category::General,
            is_spam: false,
            quality_score: 0.5,
            confidence_scores: ConfidenceScores::uniform(FALLBACK_CONFIDENCE),
            processing_time: 0.0,
        }
    }
}

/// One source comment. Field aliases accept the camelCase column names of the
/// upstream export so a JSON dump of the CSV rows can be posted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(alias = "commentId")]
    pub comment_id: String,
    #[serde(alias = "textOriginal", default)]
    pub text_original: String,
    #[serde(alias = "videoId", default)]
    pub video_id: String,
    #[serde(alias = "authorId", default)]
    pub author_id: String,
    #[serde(alias = "likeCount", default)]
    pub like_count: i64,
    #[serde(alias = "publishedAt", default)]
    pub published_at: String,
    #[serde(default)]
    pub analysis: Option<AnalysisResult>,
}

impl Comment {
    /// Minimal comment with only id and text set.
    pub fn new(comment_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            comment_id: comment_id.into(),
            text_original: text.into(),
            video_id: String::new(),
            author_id: String::new(),
            like_count: 0,
            published_at: String::new(),
            analysis: None,
        }
    }

    /// Copy of this comment with `analysis` attached.
    pub fn annotated(&self, analysis: Option<AnalysisResult>) -> Self {
        Self {
            analysis,
            ..self.clone()
        }
    }
}

/// Lifecycle of a background analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Stopping,
    Stopped,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Stopping => "stopping",
            JobStatus::Stopped => "stopped",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a job as seen by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub status: JobStatus,
    /// floor(processed / total * 100)
    pub progress: u8,
    pub total_comments: usize,
    pub processed_comments: usize,
    /// Annotated comments in source order; `len() == processed_comments`.
    pub results: Vec<Comment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    pub fn new(id: Uuid, total_comments: usize) -> Self {
        Self {
            id,
            status: JobStatus::Processing,
            progress: 0,
            total_comments,
            processed_comments: 0,
            results: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Integer percentage, floored. An empty set counts as done.
pub fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed.min(total) * 100) / total) as u8
}
