//! Batch dispatcher: cache partition, four-way adapter fan-out, per-comment merge.

use std::sync::{RwLock, RwLockReadGuard};
use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};

use crate::analyze::adapter::{AdapterSet, TaskOutcome, WorkerPool};
use crate::analyze::cache::{CacheEntry, ResultCache};
use crate::analyze::interpret::{Interpreter, TaskOutputs};
use crate::analyze::text_id;
use crate::config::{AnalysisMode, AnalyzerConfig, ModeProfile};
use crate::error::DispatchError;
use crate::model::{AnalysisResult, Task};

/// One text to classify, tagged with the id it is reported under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub text: String,
    pub comment_id: String,
}

impl BatchItem {
    pub fn new(text: impl Into<String>, comment_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            comment_id: comment_id.into(),
        }
    }
}

impl<T: Into<String>, I: Into<String>> From<(T, I)> for BatchItem {
    fn from((text, id): (T, I)) -> Self {
        Self::new(text, id)
    }
}

#[derive(Debug)]
pub struct BatchDispatcher {
    adapters: AdapterSet,
    pool: WorkerPool,
    cache: ResultCache,
    config: AnalyzerConfig,
    profile: RwLock<ModeProfile>,
}

impl BatchDispatcher {
    pub fn new(cfg: &AnalyzerConfig, adapters: AdapterSet) -> Self {
        let profile = cfg.profile();
        Self {
            adapters,
            pool: WorkerPool::new(profile.max_workers),
            cache: ResultCache::new(cfg.cache_capacity, cfg.cache_key_chars),
            config: cfg.clone(),
            profile: RwLock::new(profile),
        }
    }

    /// Dispatcher with no adapters: every task runs on rules.
    pub fn rules_only(cfg: &AnalyzerConfig) -> Self {
        Self::new(cfg, AdapterSet::rules_only())
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn batch_size(&self) -> usize {
        self.read_profile().batch_size
    }

    pub fn mode(&self) -> AnalysisMode {
        self.read_profile().mode
    }

    /// Settings of the active mode.
    pub fn profile(&self) -> ModeProfile {
        self.read_profile().clone()
    }

    /// Switch to `mode`. Batches already running finish on the settings they
    /// started with. Cached results from a different mode are dropped.
    pub fn set_mode(&self, mode: AnalysisMode) -> ModeProfile {
        let next = mode.profile(&self.config);
        let previous = {
            let mut guard = self.profile.write().unwrap_or_else(|p| p.into_inner());
            std::mem::replace(&mut *guard, next.clone())
        };
        self.pool.resize(next.max_workers);
        let dropped = if previous == next { 0 } else { self.cache.clear() };
        tracing::info!(
            target: "dispatch",
            from = %previous.mode,
            to = %mode,
            batch_size = next.batch_size,
            workers = self.pool.size(),
            dropped,
            "analysis mode changed"
        );
        next
    }

    fn read_profile(&self) -> RwLockReadGuard<'_, ModeProfile> {
        self.profile.read().unwrap_or_else(|p| p.into_inner())
    }

    /// Classify `items`, splitting them into `batch_size` slices first.
    /// Output order equals input order.
    pub async fn analyze(&self, items: &[BatchItem]) -> Result<Vec<AnalysisResult>, DispatchError> {
        let started = Instant::now();
        let batch_size = self.batch_size();
        let mut out = Vec::with_capacity(items.len());
        for batch in items.chunks(batch_size) {
            out.extend(self.process_batch(batch).await?);
        }

        let secs = started.elapsed().as_secs_f64();
        let stats = self.cache.stats();
        tracing::info!(
            target: "dispatch",
            items = items.len(),
            elapsed_ms = (secs * 1000.0) as u64,
            per_sec = if secs > 0.0 { items.len() as f64 / secs } else { 0.0 },
            cache_hit_rate = stats.hit_rate,
            cache_entries = stats.entries,
            "analyzed comments"
        );
        Ok(out)
    }

    /// Classify one batch. Per-task adapter failures fall back to rules; a
    /// malformed output degrades only its own comment. The only error is a
    /// closed worker pool.
    pub async fn process_batch(
        &self,
        items: &[BatchItem],
    ) -> Result<Vec<AnalysisResult>, DispatchError> {
        let started = Instant::now();
        let profile = self.profile();
        let interpreter = Interpreter::new(profile.thresholds);

        // 1) cache partition
        let cached: Vec<Option<CacheEntry>> =
            items.iter().map(|it| self.cache.lookup(&it.text)).collect();
        let pending: Vec<String> = items
            .iter()
            .zip(&cached)
            .filter(|(_, hit)| hit.is_none())
            .map(|(it, _)| it.text.clone())
            .collect();

        // 2) fan-out over uncached texts
        let (outcomes, per_item_secs) = if pending.is_empty() {
            (None, 0.0)
        } else {
            let fan_start = Instant::now();
            let (sentiment, spam, category, quality) = tokio::join!(
                self.invoke(&profile, Task::Sentiment, &pending),
                self.invoke(&profile, Task::Spam, &pending),
                self.invoke(&profile, Task::Category, &pending),
                self.invoke(&profile, Task::Quality, &pending),
            );
            let outcomes = [sentiment?, spam?, category?, quality?];
            let per_item = fan_start.elapsed().as_secs_f64() / pending.len() as f64;
            (Some(outcomes), per_item)
        };

        // 3) merge in input order
        let mut results = Vec::with_capacity(items.len());
        let mut fresh: Vec<(&str, CacheEntry)> = Vec::with_capacity(pending.len());
        let mut j = 0usize;
        for (item, hit) in items.iter().zip(cached) {
            if let Some(entry) = hit {
                results.push(from_entry(item, &entry, 0.0));
                continue;
            }
            let outputs = match &outcomes {
                Some([s, sp, c, q]) => TaskOutputs {
                    sentiment: s.output(j),
                    spam: sp.output(j),
                    category: c.output(j),
                    quality: q.output(j),
                },
                None => TaskOutputs::default(),
            };
            j += 1;

            match interpreter.interpret(&item.text, outputs) {
                Ok(v) => {
                    let entry = CacheEntry {
                        sentiment: v.sentiment,
                        category: v.category,
                        is_spam: v.is_spam,
                        quality_score: v.quality_score,
                        confidence_scores: v.confidence,
                    };
                    results.push(from_entry(item, &entry, per_item_secs));
                    fresh.push((item.text.as_str(), entry));
                }
                Err(e) => {
                    tracing::warn!(
                        target: "dispatch",
                        comment_id = %item.comment_id,
                        text_id = %text_id(&item.text),
                        error = %e,
                        "malformed adapter output, using default result"
                    );
                    counter!("analyzer_comment_fallbacks_total").increment(1);
                    results.push(AnalysisResult::fallback(&item.comment_id, &item.text));
                }
            }
        }

        // 4) single cache write per batch
        self.cache.store_many(fresh);

        let ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!("analyzer_batch_duration_ms").record(ms);
        tracing::debug!(
            target: "dispatch",
            items = items.len(),
            cached = items.len() - pending.len(),
            computed = pending.len(),
            ms = ms as u64,
            "batch processed"
        );
        Ok(results)
    }

    async fn invoke(
        &self,
        profile: &ModeProfile,
        task: Task,
        texts: &[String],
    ) -> Result<TaskOutcome, DispatchError> {
        let adapter = self.adapters.get(task).filter(|_| profile.uses_model(task));
        self.pool.invoke(task, adapter, texts).await
    }
}

fn from_entry(item: &BatchItem, e: &CacheEntry, processing_time: f64) -> AnalysisResult {
    AnalysisResult {
        comment_id: item.comment_id.clone(),
        text: item.text.clone(),
        sentiment: e.sentiment,
        category: e.category,
        is_spam: e.is_spam,
        quality_score: e.quality_score,
        confidence_scores: e.confidence_scores,
        processing_time,
    }
}
