//! Background analysis jobs: start, stop, resume and status snapshots.
//!
//! Each job runs as one spawned task that walks its comment snapshot in
//! fixed-size chunks. Only that task writes the job's progress; status queries
//! read a cloned snapshot. Cancellation is cooperative through a per-job
//! `CancellationToken`, checked before each chunk, before the chunk's adapter
//! batch, between per-comment retries and after each chunk is published.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::analyze::{BatchDispatcher, BatchItem};
use crate::error::{DispatchError, JobError};
use crate::model::{progress_percent, AnalysisJob, AnalysisResult, Comment, JobStatus};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Classifies the comments of one chunk. Output order equals input order.
#[async_trait]
pub trait ChunkAnalyzer: Send + Sync {
    async fn analyze(&self, items: &[BatchItem]) -> Result<Vec<AnalysisResult>, DispatchError>;
}

#[async_trait]
impl ChunkAnalyzer for BatchDispatcher {
    async fn analyze(&self, items: &[BatchItem]) -> Result<Vec<AnalysisResult>, DispatchError> {
        BatchDispatcher::analyze(self, items).await
    }
}

/// Lightweight listing row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub processed_comments: usize,
    pub total_comments: usize,
    pub started_at: DateTime<Utc>,
}

struct JobSlot {
    id: Uuid,
    state: Mutex<AnalysisJob>,
    comments: Arc<Vec<Comment>>,
    cancel: Mutex<CancellationToken>,
}

impl JobSlot {
    fn new(comments: Vec<Comment>, token: CancellationToken) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            state: Mutex::new(AnalysisJob::new(id, comments.len())),
            comments: Arc::new(comments),
            cancel: Mutex::new(token),
        }
    }

    fn snapshot(&self) -> AnalysisJob {
        lock(&self.state).clone()
    }

    fn publish(&self, annotated: Vec<Comment>) {
        let mut job = lock(&self.state);
        job.processed_comments += annotated.len();
        job.results.extend(annotated);
        job.progress = progress_percent(job.processed_comments, job.total_comments);
    }

    fn finish(&self, status: JobStatus, error: Option<String>) {
        let mut job = lock(&self.state);
        // a stop request that raced the last chunk still ends as stopped
        let status = if status == JobStatus::Completed && job.status == JobStatus::Stopping {
            JobStatus::Stopped
        } else {
            status
        };
        job.status = status;
        job.finished_at = Some(Utc::now());
        if status == JobStatus::Completed {
            job.progress = 100;
        }
        if error.is_some() {
            job.error = error;
        }
        counter!("analyzer_jobs_total", "outcome" => status.as_str()).increment(1);
        tracing::info!(
            target: "jobs",
            job_id = %job.id,
            status = %status,
            processed = job.processed_comments,
            total = job.total_comments,
            "job finished"
        );
    }
}

/// Owns every job record for the process lifetime.
pub struct JobRegistry {
    analyzer: Arc<dyn ChunkAnalyzer>,
    jobs: Mutex<HashMap<Uuid, Arc<JobSlot>>>,
    current: Mutex<Option<Uuid>>,
    chunk_size: usize,
    delay: Duration,
}

impl JobRegistry {
    pub fn new(analyzer: Arc<dyn ChunkAnalyzer>, chunk_size: usize, delay: Duration) -> Self {
        Self {
            analyzer,
            jobs: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            chunk_size: chunk_size.max(1),
            delay,
        }
    }

    /// Create a `processing` job over `comments` and spawn its loop.
    /// Must be called from within a Tokio runtime.
    pub fn start_job(&self, comments: Vec<Comment>) -> Result<Uuid, JobError> {
        if comments.is_empty() {
            return Err(JobError::NoComments);
        }
        let (slot, token) = self.register(comments);
        tracing::info!(target: "jobs", job_id = %slot.id, total = slot.comments.len(), "job started");
        let id = slot.id;
        self.spawn(slot, token);
        Ok(id)
    }

    /// Record a new `processing` job and make it current.
    fn register(&self, comments: Vec<Comment>) -> (Arc<JobSlot>, CancellationToken) {
        let token = CancellationToken::new();
        let slot = Arc::new(JobSlot::new(comments, token.clone()));
        lock(&self.jobs).insert(slot.id, Arc::clone(&slot));
        *lock(&self.current) = Some(slot.id);
        (slot, token)
    }

    /// Continue a `stopped` job from its recorded offset.
    pub fn resume_job(&self, id: Uuid) -> Result<JobStatus, JobError> {
        let slot = self.slot(id)?;
        let token = CancellationToken::new();
        {
            let mut job = lock(&slot.state);
            if job.status != JobStatus::Stopped {
                return Err(JobError::InvalidState {
                    id,
                    status: job.status,
                    expected: JobStatus::Stopped,
                });
            }
            job.status = JobStatus::Processing;
            job.finished_at = None;
            *lock(&slot.cancel) = token.clone();
            tracing::info!(target: "jobs", job_id = %id, offset = job.processed_comments, "job resumed");
        }
        *lock(&self.current) = Some(id);
        self.spawn(slot, token);
        Ok(JobStatus::Processing)
    }

    /// Request cancellation of a `processing` job. Returns immediately with
    /// `stopping`; the loop moves the job to `stopped` at its next check.
    pub fn cancel_job(&self, id: Uuid) -> Result<JobStatus, JobError> {
        let slot = self.slot(id)?;
        let mut job = lock(&slot.state);
        if job.status != JobStatus::Processing {
            return Err(JobError::InvalidState {
                id,
                status: job.status,
                expected: JobStatus::Processing,
            });
        }
        job.status = JobStatus::Stopping;
        lock(&slot.cancel).cancel();
        tracing::info!(target: "jobs", job_id = %id, processed = job.processed_comments, "stop requested");
        Ok(JobStatus::Stopping)
    }

    pub fn get_status(&self, id: Uuid) -> Result<AnalysisJob, JobError> {
        Ok(self.slot(id)?.snapshot())
    }

    /// Most recently started or resumed job.
    pub fn current_job(&self) -> Option<Uuid> {
        *lock(&self.current)
    }

    /// All jobs, oldest first.
    pub fn list_jobs(&self) -> Vec<JobSummary> {
        let slots: Vec<Arc<JobSlot>> = lock(&self.jobs).values().cloned().collect();
        let mut out: Vec<JobSummary> = slots
            .iter()
            .map(|s| {
                let job = lock(&s.state);
                JobSummary {
                    id: job.id,
                    status: job.status,
                    progress: job.progress,
                    processed_comments: job.processed_comments,
                    total_comments: job.total_comments,
                    started_at: job.started_at,
                }
            })
            .collect();
        out.sort_by_key(|j| j.started_at);
        out
    }

    fn slot(&self, id: Uuid) -> Result<Arc<JobSlot>, JobError> {
        lock(&self.jobs)
            .get(&id)
            .cloned()
            .ok_or(JobError::NotFound(id))
    }

    fn spawn(&self, slot: Arc<JobSlot>, token: CancellationToken) {
        let runner = JobRunner {
            analyzer: Arc::clone(&self.analyzer),
            slot: Arc::clone(&slot),
            cancel: token,
            chunk_size: self.chunk_size,
            delay: self.delay,
        };
        supervise(slot, runner.run());
    }
}

/// Run `body` as the job's loop on its own task. An error or panic escaping it
/// marks the job `failed` with the message attached.
fn supervise<F>(slot: Arc<JobSlot>, body: F)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let handle = tokio::spawn(body);
    tokio::spawn(async move {
        let failure = match handle.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(join) if join.is_panic() => Some(panic_message(join.into_panic())),
            Err(join) => Some(join.to_string()),
        };
        if let Some(msg) = failure {
            tracing::error!(target: "jobs", job_id = %slot.id, error = %msg, "job loop failed");
            slot.finish(JobStatus::Failed, Some(msg));
        }
    });
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("job panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("job panicked: {s}")
    } else {
        "job panicked".to_string()
    }
}

struct JobRunner {
    analyzer: Arc<dyn ChunkAnalyzer>,
    slot: Arc<JobSlot>,
    cancel: CancellationToken,
    chunk_size: usize,
    delay: Duration,
}

impl JobRunner {
    async fn run(self) -> anyhow::Result<()> {
        let comments = Arc::clone(&self.slot.comments);
        let total = comments.len();
        let mut offset = self.slot.snapshot().processed_comments;
        anyhow::ensure!(
            offset <= total,
            "processed offset {offset} is beyond {total} comments"
        );

        while offset < total {
            if self.cancel.is_cancelled() {
                self.slot.finish(JobStatus::Stopped, None);
                return Ok(());
            }

            let end = (offset + self.chunk_size).min(total);
            let Some(annotated) = self.process_chunk(&comments[offset..end]).await else {
                // interrupted mid-chunk; nothing from it is published
                self.slot.finish(JobStatus::Stopped, None);
                return Ok(());
            };
            self.slot.publish(annotated);
            offset = end;
            tracing::debug!(target: "jobs", job_id = %self.slot.id, processed = offset, total, "chunk published");

            if self.cancel.is_cancelled() {
                self.slot.finish(JobStatus::Stopped, None);
                return Ok(());
            }
            if offset < total && !self.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
        }

        let status = if self.cancel.is_cancelled() {
            JobStatus::Stopped
        } else {
            JobStatus::Completed
        };
        self.slot.finish(status, None);
        Ok(())
    }

    /// Annotate one chunk. Empty texts are not sent to adapters and carry no
    /// analysis. `None` when cancellation interrupted the chunk.
    async fn process_chunk(&self, chunk: &[Comment]) -> Option<Vec<Comment>> {
        let pending: Vec<(usize, BatchItem)> = chunk
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.text_original.trim().is_empty())
            .map(|(i, c)| (i, BatchItem::new(c.text_original.clone(), c.comment_id.clone())))
            .collect();

        let mut analyses: Vec<Option<AnalysisResult>> = vec![None; chunk.len()];
        if !pending.is_empty() {
            if self.cancel.is_cancelled() {
                return None;
            }
            let batch: Vec<BatchItem> = pending.iter().map(|(_, it)| it.clone()).collect();
            match self.analyzer.analyze(&batch).await {
                Ok(results) => {
                    for ((i, _), r) in pending.iter().zip(results) {
                        analyses[*i] = Some(r);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        target: "jobs",
                        job_id = %self.slot.id,
                        error = %e,
                        size = pending.len(),
                        "chunk dispatch failed, retrying per comment"
                    );
                    for (i, item) in &pending {
                        if self.cancel.is_cancelled() {
                            return None;
                        }
                        analyses[*i] = Some(self.analyze_one(item).await);
                    }
                }
            }
        }

        Some(
            chunk
                .iter()
                .zip(analyses)
                .map(|(c, a)| c.annotated(a))
                .collect(),
        )
    }

    async fn analyze_one(&self, item: &BatchItem) -> AnalysisResult {
        match self
            .analyzer
            .analyze(std::slice::from_ref(item))
            .await
            .ok()
            .and_then(|mut v| v.pop())
        {
            Some(r) => r,
            None => {
                counter!("analyzer_comment_fallbacks_total").increment(1);
                AnalysisResult::fallback(&item.comment_id, &item.text)
            }
        }
    }
}
