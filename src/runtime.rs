// src/runtime.rs
use crate::analyze::TaskOutcome;
use crate::config::AnalyzerConfig;
use crate::engine::AnalysisEngine;
use crate::model::Task;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const WARMUP_TEXTS: &[&str] = &[
    "This is a great product!",
    "I love this makeup, it's amazing.",
    "The skincare routine works perfectly.",
    "This fragrance smells wonderful.",
    "The hair care products are excellent.",
];

pub struct AnalyzerRuntime {
    pub cfg: AnalyzerConfig,
    pub engine: Arc<AnalysisEngine>,
}

impl AnalyzerRuntime {
    /// Load config (file + env overrides) and build the engine.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_config(AnalyzerConfig::from_env()?)
    }

    pub fn from_config(cfg: AnalyzerConfig) -> anyhow::Result<Self> {
        let engine = Arc::new(AnalysisEngine::from_config(cfg.clone())?);
        Ok(Self { cfg, engine })
    }

    /// Call every configured adapter once so the first real batch does not pay
    /// for connection setup or model loading. Failures are logged only.
    /// Returns the tasks whose adapter answered.
    pub async fn warmup(&self) -> Vec<Task> {
        let dispatcher = self.engine.dispatcher();
        let configured = dispatcher.adapters().configured();
        if configured.is_empty() {
            info!(target: "adapter", "warm-up skipped: no adapters configured");
            return Vec::new();
        }

        let texts: Vec<String> = WARMUP_TEXTS.iter().map(|s| s.to_string()).collect();
        let mut ready = Vec::new();
        for task in configured {
            let started = Instant::now();
            match dispatcher
                .pool()
                .invoke(task, dispatcher.adapters().get(task), &texts)
                .await
            {
                Ok(TaskOutcome::Ready(_)) => {
                    info!(
                        target: "adapter",
                        %task,
                        ms = started.elapsed().as_millis() as u64,
                        "adapter warmed up"
                    );
                    ready.push(task);
                }
                Ok(other) => warn!(target: "adapter", %task, outcome = ?other, "adapter warm-up failed"),
                Err(e) => warn!(target: "adapter", %task, error = %e, "adapter warm-up aborted"),
            }
        }
        ready
    }
}
