// src/config/analyzer.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

use crate::config::mode::{AnalysisMode, ModeProfile};

pub const DEFAULT_ANALYZER_CONFIG_PATH: &str = "config/analyzer.toml";

pub const ENV_ANALYZER_CONFIG_PATH: &str = "ANALYZER_CONFIG_PATH";
pub const ENV_ANALYZER_API_KEY: &str = "ANALYZER_API_KEY";
pub const ENV_BATCH_SIZE: &str = "ANALYZER_BATCH_SIZE";
pub const ENV_CHUNK_SIZE: &str = "ANALYZER_CHUNK_SIZE";
pub const ENV_MAX_WORKERS: &str = "ANALYZER_MAX_WORKERS";
pub const ENV_DELAY_MS: &str = "ANALYZER_DELAY_MS";
pub const ENV_MODE: &str = "ANALYZER_MODE";

fn default_batch_size() -> usize {
    128
}
fn default_chunk_size() -> usize {
    32
}
fn default_max_workers() -> usize {
    12
}
fn default_cache_capacity() -> usize {
    10_000
}
fn default_cache_key_chars() -> usize {
    100
}
fn default_delay_ms() -> u64 {
    50
}
fn default_sentiment_floor() -> f32 {
    0.5
}
fn default_sentiment_margin() -> f32 {
    0.1
}
fn default_sentiment_single_floor() -> f32 {
    0.6
}
fn default_spam_trust() -> f32 {
    0.6
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_mock_score() -> f32 {
    0.9
}

/// Confidence thresholds applied when interpreting adapter output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    /// Top sentiment score below this falls back to keyword rules.
    #[serde(default = "default_sentiment_floor")]
    pub sentiment_floor: f32,
    /// Top-two sentiment scores closer than this are treated as ambiguous.
    #[serde(default = "default_sentiment_margin")]
    pub sentiment_margin: f32,
    /// A lone sentiment label (no runner-up) scored below this reads as neutral.
    #[serde(default = "default_sentiment_single_floor")]
    pub sentiment_single_floor: f32,
    /// Spam verdicts scored above this are trusted without consulting rules.
    #[serde(default = "default_spam_trust")]
    pub spam_trust: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            sentiment_floor: default_sentiment_floor(),
            sentiment_margin: default_sentiment_margin(),
            sentiment_single_floor: default_sentiment_single_floor(),
            spam_trust: default_spam_trust(),
        }
    }
}

/// Where a task's model lives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// JSON-over-HTTP inference endpoint.
    Http,
    /// Deterministic fixed output; for local runs and tests.
    Mock,
    #[default]
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdapterConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// "ENV" means: read from ANALYZER_API_KEY
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub mock_label: Option<String>,
    #[serde(default = "default_mock_score")]
    pub mock_score: f32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Disabled,
            endpoint: None,
            api_key: None,
            model: None,
            timeout_secs: default_timeout_secs(),
            mock_label: None,
            mock_score: default_mock_score(),
        }
    }
}

/// One optional adapter per task; absent means rules only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AdaptersConfig {
    #[serde(default)]
    pub sentiment: Option<AdapterConfig>,
    #[serde(default)]
    pub spam: Option<AdapterConfig>,
    #[serde(default)]
    pub category: Option<AdapterConfig>,
    #[serde(default)]
    pub quality: Option<AdapterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzerConfig {
    /// Preset applied on top of the values below; `custom` uses them as is.
    #[serde(default)]
    pub mode: AnalysisMode,
    /// Upper bound on texts per adapter call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Comments per job progress checkpoint.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Concurrent adapter invocations.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Characters of normalized text that make up a cache key.
    #[serde(default = "default_cache_key_chars")]
    pub cache_key_chars: usize,
    /// Pause between job chunks.
    #[serde(default = "default_delay_ms")]
    pub inter_batch_delay_ms: u64,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub adapters: AdaptersConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::default(),
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
            max_workers: default_max_workers(),
            cache_capacity: default_cache_capacity(),
            cache_key_chars: default_cache_key_chars(),
            inter_batch_delay_ms: default_delay_ms(),
            thresholds: Thresholds::default(),
            adapters: AdaptersConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Resolve the path from ANALYZER_CONFIG_PATH (or the default), load it, then
    /// apply env overrides. A missing file yields defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = env::var(ENV_ANALYZER_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ANALYZER_CONFIG_PATH));

        let mut cfg = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            tracing::info!(path = %path.display(), "analyzer config not found, using defaults");
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg.sanitized())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read analyzer config at {}: {}", path.display(), e)
        })?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: AnalyzerConfig = toml::from_str(s)?;

        // Resolve api keys given as "ENV"
        for adapter in cfg.adapters_mut() {
            if let Some(key) = adapter.api_key.as_deref() {
                if key.trim().eq_ignore_ascii_case("env") {
                    adapter.api_key = Some(env::var(ENV_ANALYZER_API_KEY).map_err(|_| {
                        anyhow::anyhow!("Missing {ENV_ANALYZER_API_KEY} env var")
                    })?);
                }
            }
            if adapter.provider == ProviderKind::Http && adapter.endpoint.is_none() {
                anyhow::bail!("http adapter configured without an endpoint");
            }
        }

        Ok(cfg.sanitized())
    }

    /// Settings of the configured mode.
    pub fn profile(&self) -> ModeProfile {
        self.mode.profile(self)
    }

    fn adapters_mut(&mut self) -> impl Iterator<Item = &mut AdapterConfig> {
        let a = &mut self.adapters;
        [
            a.sentiment.as_mut(),
            a.spam.as_mut(),
            a.category.as_mut(),
            a.quality.as_mut(),
        ]
        .into_iter()
        .flatten()
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = parse_usize_env(env::var(ENV_BATCH_SIZE).ok()) {
            self.batch_size = v;
        }
        if let Some(v) = parse_usize_env(env::var(ENV_CHUNK_SIZE).ok()) {
            self.chunk_size = v;
        }
        if let Some(v) = parse_usize_env(env::var(ENV_MAX_WORKERS).ok()) {
            self.max_workers = v;
        }
        if let Some(v) = parse_usize_env(env::var(ENV_DELAY_MS).ok()) {
            self.inter_batch_delay_ms = v as u64;
        }
        if let Ok(raw) = env::var(ENV_MODE) {
            match raw.parse::<AnalysisMode>() {
                Ok(mode) => self.mode = mode,
                Err(e) => tracing::warn!(error = %e, "ignoring {ENV_MODE}"),
            }
        }
    }

    /// Sizes are at least 1; thresholds are clamped to [0,1].
    pub fn sanitized(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.chunk_size = self.chunk_size.max(1);
        self.max_workers = self.max_workers.max(1);
        self.cache_capacity = self.cache_capacity.max(1);
        self.cache_key_chars = self.cache_key_chars.max(1);

        let t = &mut self.thresholds;
        for v in [
            &mut t.sentiment_floor,
            &mut t.sentiment_margin,
            &mut t.sentiment_single_floor,
            &mut t.spam_trust,
        ] {
            *v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.5 };
        }
        self
    }
}

fn parse_usize_env(raw: Option<String>) -> Option<usize> {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
}
