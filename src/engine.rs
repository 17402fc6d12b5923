//! # Analysis Engine
//! Process-wide context object: owns the batch dispatcher (cache, adapters,
//! worker pool) and the job registry. Built once at startup and shared by
//! handle; nothing in the crate keeps module-level state.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::analyze::{AdapterSet, BatchDispatcher, BatchItem, CacheStats};
use crate::config::{AnalysisMode, AnalyzerConfig, ModeProfile};
use crate::error::{DispatchError, JobError};
use crate::jobs::{ChunkAnalyzer, JobRegistry, JobSummary};
use crate::model::{AnalysisJob, AnalysisResult, Comment, JobStatus};

pub struct AnalysisEngine {
    config: AnalyzerConfig,
    dispatcher: Arc<BatchDispatcher>,
    jobs: JobRegistry,
}

impl AnalysisEngine {
    pub fn new(config: AnalyzerConfig, adapters: AdapterSet) -> Self {
        let config = config.sanitized();
        let dispatcher = Arc::new(BatchDispatcher::new(&config, adapters));
        let jobs = JobRegistry::new(
            Arc::clone(&dispatcher) as Arc<dyn ChunkAnalyzer>,
            config.chunk_size,
            Duration::from_millis(config.inter_batch_delay_ms),
        );
        let profile = dispatcher.profile();
        tracing::info!(
            target: "dispatch",
            adapters = ?dispatcher.adapters(),
            mode = %profile.mode,
            batch_size = profile.batch_size,
            chunk_size = config.chunk_size,
            max_workers = profile.max_workers,
            "analysis engine ready"
        );
        Self {
            config,
            dispatcher,
            jobs,
        }
    }

    /// Engine with every adapter built from `config.adapters`.
    pub fn from_config(config: AnalyzerConfig) -> anyhow::Result<Self> {
        let adapters = AdapterSet::from_config(&config.adapters)?;
        Ok(Self::new(config, adapters))
    }

    /// Engine with no adapters; every task runs on rules.
    pub fn rules_only(config: AnalyzerConfig) -> Self {
        Self::new(config, AdapterSet::rules_only())
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<BatchDispatcher> {
        &self.dispatcher
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    /// Classify `items` directly, outside any job.
    pub async fn process_batch(
        &self,
        items: &[BatchItem],
    ) -> Result<Vec<AnalysisResult>, DispatchError> {
        self.dispatcher.analyze(items).await
    }

    pub fn start_job(&self, comments: Vec<Comment>) -> Result<Uuid, JobError> {
        self.jobs.start_job(comments)
    }

    pub fn resume_job(&self, id: Uuid) -> Result<JobStatus, JobError> {
        self.jobs.resume_job(id)
    }

    pub fn cancel_job(&self, id: Uuid) -> Result<JobStatus, JobError> {
        self.jobs.cancel_job(id)
    }

    pub fn get_status(&self, id: Uuid) -> Result<AnalysisJob, JobError> {
        self.jobs.get_status(id)
    }

    pub fn current_job(&self) -> Option<Uuid> {
        self.jobs.current_job()
    }

    pub fn list_jobs(&self) -> Vec<JobSummary> {
        self.jobs.list_jobs()
    }

    pub fn mode(&self) -> AnalysisMode {
        self.dispatcher.mode()
    }

    pub fn profile(&self) -> ModeProfile {
        self.dispatcher.profile()
    }

    /// Switch analysis preset for every later batch, jobs included.
    pub fn set_mode(&self, mode: AnalysisMode) -> ModeProfile {
        self.dispatcher.set_mode(mode)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.dispatcher.cache().stats()
    }

    /// Stop accepting adapter work. Running jobs fall back to per-comment
    /// defaults for whatever is left.
    pub fn shutdown(&self) {
        self.dispatcher.pool().close();
        tracing::info!(target: "dispatch", cache = ?self.cache_stats(), "analysis engine shut down");
    }
}
