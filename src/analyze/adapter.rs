//! Model adapters: one optional external classifier per task, plus the bounded
//! worker pool every adapter call runs through.
//!
//! An adapter call over N texts yields exactly one of:
//! - `TaskOutcome::Ready`: N raw outputs, one per text, in order
//! - `TaskOutcome::Unavailable`: no adapter configured for the task
//! - `TaskOutcome::Failed`: the call errored, panicked or returned the wrong count
//!
//! Callers route `Unavailable` and `Failed` to the rule-based path; neither
//! aborts the batch.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::{AdapterConfig, AdaptersConfig, ProviderKind};
use crate::error::{AdapterError, DispatchError};
use crate::model::{Category, Task};

// ------------------------------------------------------------
// Raw adapter output
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Output for one text, in whichever shape the backend produced.
///
/// Parsed tolerantly: a zero-shot object `{labels, scores}`, a single
/// `{label, score}`, or a ranked list of `{label, score}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawOutput {
    ZeroShot {
        labels: Vec<String>,
        scores: Vec<f32>,
    },
    Single(LabelScore),
    Ranked(Vec<LabelScore>),
}

impl RawOutput {
    /// Highest score across all labels, if any.
    pub fn top_score(&self) -> Option<f32> {
        match self {
            RawOutput::Single(ls) => Some(ls.score),
            RawOutput::Ranked(v) => v.iter().map(|ls| ls.score).reduce(f32::max),
            RawOutput::ZeroShot { scores, .. } => scores.iter().copied().reduce(f32::max),
        }
    }
}

// ------------------------------------------------------------
// Adapter trait + providers
// ------------------------------------------------------------

/// Boundary to one external classification capability.
#[async_trait]
pub trait TaskAdapter: Send + Sync {
    /// Classify every text; must return one output per input, in order.
    /// Must tolerate an empty list.
    async fn invoke(&self, texts: &[String]) -> anyhow::Result<Vec<RawOutput>>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynAdapter = Arc<dyn TaskAdapter>;

/// JSON-over-HTTP inference endpoint (Hugging Face Inference API shape).
///
/// Request:  `{"inputs": [...], "parameters": {...}, "model": "..."}`
/// Response: one `RawOutput` per input.
pub struct HttpAdapter {
    task: Task,
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: Option<String>,
}

impl HttpAdapter {
    pub fn new(task: Task, cfg: &AdapterConfig) -> anyhow::Result<Self> {
        let endpoint = cfg
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("{task} http adapter has no endpoint"))?;
        let http = reqwest::Client::builder()
            .user_agent("comment-analyzer/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            task,
            http,
            endpoint,
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: cfg.model.clone(),
        })
    }
}

#[async_trait]
impl TaskAdapter for HttpAdapter {
    async fn invoke(&self, texts: &[String]) -> anyhow::Result<Vec<RawOutput>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        #[derive(Serialize)]
        struct Req<'a> {
            inputs: &'a [String],
            #[serde(skip_serializing_if = "Option::is_none")]
            parameters: Option<Params>,
            #[serde(skip_serializing_if = "Option::is_none")]
            model: Option<&'a str>,
        }
        #[derive(Serialize)]
        struct Params {
            candidate_labels: Vec<&'static str>,
        }

        let parameters = (self.task == Task::Category).then(|| Params {
            candidate_labels: Category::ALL.iter().map(|c| c.as_str()).collect(),
        });
        let req = Req {
            inputs: texts,
            parameters,
            model: self.model.as_deref(),
        };

        let mut call = self.http.post(&self.endpoint).json(&req);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        let resp = call.send().await.context("sending inference request")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("inference endpoint returned {status}");
        }
        let outputs: Vec<RawOutput> = resp.json().await.context("parsing inference response")?;
        Ok(outputs)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

const SENTIMENT_LABELS: [&str; 3] = ["POSITIVE", "NEUTRAL", "NEGATIVE"];

/// Returns the same output for every text.
#[derive(Clone)]
pub struct FixedAdapter {
    pub fixed: RawOutput,
}

impl FixedAdapter {
    pub fn new(fixed: RawOutput) -> Self {
        Self { fixed }
    }

    /// Deterministic mock in the shape a real backend would use for `task`.
    pub fn for_task(task: Task, label: Option<&str>, score: f32) -> Self {
        let s = score.clamp(0.0, 1.0);
        let fixed = match task {
            Task::Sentiment => {
                let top = label.unwrap_or("POSITIVE");
                let rest: Vec<&str> = SENTIMENT_LABELS
                    .into_iter()
                    .filter(|l| !l.eq_ignore_ascii_case(top))
                    .collect();
                let share = (1.0 - s) / rest.len().max(1) as f32;
                let mut ranked = vec![LabelScore::new(top, s)];
                ranked.extend(rest.into_iter().map(|l| LabelScore::new(l, share)));
                RawOutput::Ranked(ranked)
            }
            Task::Spam => RawOutput::Single(LabelScore::new(label.unwrap_or("NOT_SPAM"), s)),
            Task::Category => {
                let top = label.unwrap_or("general").to_string();
                let rest: Vec<String> = Category::ALL
                    .iter()
                    .map(|c| c.as_str().to_string())
                    .filter(|c| !c.eq_ignore_ascii_case(&top))
                    .collect();
                let share = (1.0 - s) / rest.len().max(1) as f32;
                let mut scores = vec![s];
                scores.extend(std::iter::repeat(share).take(rest.len()));
                let mut labels = vec![top];
                labels.extend(rest);
                RawOutput::ZeroShot { labels, scores }
            }
            Task::Quality => {
                RawOutput::Single(LabelScore::new(label.unwrap_or("MEDIUM_QUALITY"), s))
            }
        };
        Self { fixed }
    }
}

#[async_trait]
impl TaskAdapter for FixedAdapter {
    async fn invoke(&self, texts: &[String]) -> anyhow::Result<Vec<RawOutput>> {
        Ok(vec![self.fixed.clone(); texts.len()])
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Wraps a synchronous, CPU-bound model so it runs on the blocking thread pool
/// instead of the async scheduler.
pub struct BlockingAdapter<F> {
    name: &'static str,
    model: Arc<F>,
}

impl<F> BlockingAdapter<F>
where
    F: Fn(&[String]) -> anyhow::Result<Vec<RawOutput>> + Send + Sync + 'static,
{
    pub fn new(name: &'static str, model: F) -> Self {
        Self {
            name,
            model: Arc::new(model),
        }
    }
}

#[async_trait]
impl<F> TaskAdapter for BlockingAdapter<F>
where
    F: Fn(&[String]) -> anyhow::Result<Vec<RawOutput>> + Send + Sync + 'static,
{
    async fn invoke(&self, texts: &[String]) -> anyhow::Result<Vec<RawOutput>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || model(&texts))
            .await
            .map_err(|e| anyhow::anyhow!("blocking model task failed: {e}"))?
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

// ------------------------------------------------------------
// Adapter set
// ------------------------------------------------------------

/// One optional adapter per task. `None` routes the task to rules.
#[derive(Clone, Default)]
pub struct AdapterSet {
    sentiment: Option<DynAdapter>,
    spam: Option<DynAdapter>,
    category: Option<DynAdapter>,
    quality: Option<DynAdapter>,
}

impl AdapterSet {
    /// No adapters: every task is rule-based.
    pub fn rules_only() -> Self {
        Self::default()
    }

    pub fn with(mut self, task: Task, adapter: DynAdapter) -> Self {
        *self.slot_mut(task) = Some(adapter);
        self
    }

    pub fn get(&self, task: Task) -> Option<&DynAdapter> {
        match task {
            Task::Sentiment => self.sentiment.as_ref(),
            Task::Spam => self.spam.as_ref(),
            Task::Category => self.category.as_ref(),
            Task::Quality => self.quality.as_ref(),
        }
    }

    /// Tasks that have an adapter configured.
    pub fn configured(&self) -> Vec<Task> {
        Task::ALL
            .into_iter()
            .filter(|t| self.get(*t).is_some())
            .collect()
    }

    fn slot_mut(&mut self, task: Task) -> &mut Option<DynAdapter> {
        match task {
            Task::Sentiment => &mut self.sentiment,
            Task::Spam => &mut self.spam,
            Task::Category => &mut self.category,
            Task::Quality => &mut self.quality,
        }
    }

    /// Factory: build every configured adapter. Disabled or absent entries stay `None`.
    pub fn from_config(cfg: &AdaptersConfig) -> anyhow::Result<Self> {
        let mut set = Self::rules_only();
        let entries = [
            (Task::Sentiment, &cfg.sentiment),
            (Task::Spam, &cfg.spam),
            (Task::Category, &cfg.category),
            (Task::Quality, &cfg.quality),
        ];
        for (task, entry) in entries {
            if let Some(adapter) = entry.as_ref().map(|c| build_adapter(task, c)).transpose()? {
                *set.slot_mut(task) = adapter;
            }
        }
        Ok(set)
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = |a: &Option<DynAdapter>| a.as_ref().map(|a| a.name()).unwrap_or("rules");
        f.debug_struct("AdapterSet")
            .field("sentiment", &name(&self.sentiment))
            .field("spam", &name(&self.spam))
            .field("category", &name(&self.category))
            .field("quality", &name(&self.quality))
            .finish()
    }
}

pub fn build_adapter(task: Task, cfg: &AdapterConfig) -> anyhow::Result<Option<DynAdapter>> {
    let adapter: Option<DynAdapter> = match cfg.provider {
        ProviderKind::Disabled => None,
        ProviderKind::Mock => Some(Arc::new(FixedAdapter::for_task(
            task,
            cfg.mock_label.as_deref(),
            cfg.mock_score,
        ))),
        ProviderKind::Http => Some(Arc::new(HttpAdapter::new(task, cfg)?)),
    };
    Ok(adapter)
}

// ------------------------------------------------------------
// Worker pool
// ------------------------------------------------------------

/// Result of one adapter call over a text list.
#[derive(Debug)]
pub enum TaskOutcome {
    Ready(Vec<RawOutput>),
    Unavailable,
    Failed(AdapterError),
}

impl TaskOutcome {
    /// Output for the i-th text; `None` unless the call succeeded.
    pub fn output(&self, i: usize) -> Option<&RawOutput> {
        match self {
            TaskOutcome::Ready(v) => v.get(i),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct PoolState {
    permits: Arc<Semaphore>,
    size: usize,
    closed: bool,
}

/// Bounds concurrent adapter invocations. Each call holds one permit and runs
/// on its own task, so a panicking adapter only fails its own task.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    state: Arc<Mutex<PoolState>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            state: Arc::new(Mutex::new(PoolState {
                permits: Arc::new(Semaphore::new(size)),
                size,
                closed: false,
            })),
        }
    }

    pub fn size(&self) -> usize {
        self.state().size
    }

    /// Change the number of permits. Calls already holding a permit keep it;
    /// later calls draw from the resized pool. A closed pool stays closed.
    pub fn resize(&self, size: usize) {
        let size = size.max(1);
        let mut st = self.state();
        if st.size == size {
            return;
        }
        let permits = Semaphore::new(size);
        if st.closed {
            permits.close();
        }
        st.permits = Arc::new(permits);
        st.size = size;
    }

    /// Refuse all further work. In-flight calls finish normally.
    pub fn close(&self) {
        let mut st = self.state();
        st.closed = true;
        st.permits.close();
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run `task`'s adapter over `texts`. Adapter errors become
    /// `TaskOutcome::Failed`; only a closed pool is an `Err`.
    pub async fn invoke(
        &self,
        task: Task,
        adapter: Option<&DynAdapter>,
        texts: &[String],
    ) -> Result<TaskOutcome, DispatchError> {
        let Some(adapter) = adapter else {
            return Ok(TaskOutcome::Unavailable);
        };
        let permits = Arc::clone(&self.state().permits);
        let _permit = permits
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::PoolClosed)?;

        let adapter = Arc::clone(adapter);
        let owned = texts.to_vec();
        let joined = tokio::spawn(async move { adapter.invoke(&owned).await }).await;

        let outcome = match joined {
            Ok(Ok(outputs)) if outputs.len() == texts.len() => TaskOutcome::Ready(outputs),
            Ok(Ok(outputs)) => TaskOutcome::Failed(AdapterError::LengthMismatch {
                task,
                expected: texts.len(),
                got: outputs.len(),
            }),
            Ok(Err(e)) => TaskOutcome::Failed(AdapterError::Call {
                task,
                reason: format!("{e:#}"),
            }),
            Err(_) => TaskOutcome::Failed(AdapterError::Aborted { task }),
        };

        if let TaskOutcome::Failed(e) = &outcome {
            tracing::warn!(target: "adapter", %task, error = %e, "adapter failed, using rules");
            counter!("analyzer_adapter_failures_total", "task" => task.as_str()).increment(1);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_output_parses_all_backend_shapes() {
        let ranked: RawOutput =
            serde_json::from_str(r#"[{"label":"POSITIVE","score":0.9},{"label":"NEGATIVE","score":0.1}]"#)
                .expect("ranked");
        assert!(matches!(ranked, RawOutput::Ranked(ref v) if v.len() == 2));

        let single: RawOutput =
            serde_json::from_str(r#"{"label":"SPAM","score":0.7}"#).expect("single");
        assert_eq!(single, RawOutput::Single(LabelScore::new("SPAM", 0.7)));

        let zero: RawOutput = serde_json::from_str(
            r#"{"sequence":"x","labels":["makeup","general"],"scores":[0.8,0.2]}"#,
        )
        .expect("zero-shot");
        assert!(matches!(zero, RawOutput::ZeroShot { ref labels, .. } if labels[0] == "makeup"));
    }

    #[test]
    fn top_score_picks_maximum() {
        let r = RawOutput::Ranked(vec![LabelScore::new("a", 0.2), LabelScore::new("b", 0.7)]);
        assert_eq!(r.top_score(), Some(0.7));
        assert_eq!(RawOutput::Ranked(vec![]).top_score(), None);
        let z = RawOutput::ZeroShot {
            labels: vec!["x".into(), "y".into()],
            scores: vec![0.4, 0.6],
        };
        assert_eq!(z.top_score(), Some(0.6));
    }

    #[tokio::test]
    async fn missing_adapter_is_unavailable() {
        let pool = WorkerPool::new(2);
        let out = pool
            .invoke(Task::Spam, None, &["hello".to_string()])
            .await
            .expect("pool open");
        assert!(matches!(out, TaskOutcome::Unavailable));
        assert!(out.output(0).is_none());
    }

    #[tokio::test]
    async fn wrong_output_count_is_a_task_failure() {
        let pool = WorkerPool::new(2);
        let adapter: DynAdapter = Arc::new(BlockingAdapter::new("short", |_texts: &[String]| {
            Ok(vec![RawOutput::Single(LabelScore::new("SPAM", 0.9))])
        }));
        let texts = vec!["a".to_string(), "b".to_string()];
        let out = pool
            .invoke(Task::Spam, Some(&adapter), &texts)
            .await
            .expect("pool open");
        assert!(matches!(
            out,
            TaskOutcome::Failed(AdapterError::LengthMismatch { expected: 2, got: 1, .. })
        ));
    }

    #[tokio::test]
    async fn erroring_adapter_is_contained() {
        let pool = WorkerPool::new(1);
        let adapter: DynAdapter = Arc::new(BlockingAdapter::new("boom", |_texts: &[String]| {
            Err(anyhow::anyhow!("model not loaded"))
        }));
        let out = pool
            .invoke(Task::Sentiment, Some(&adapter), &["x".to_string()])
            .await
            .expect("pool open");
        match out {
            TaskOutcome::Failed(AdapterError::Call { task, reason }) => {
                assert_eq!(task, Task::Sentiment);
                assert!(reason.contains("model not loaded"));
            }
            other => panic!("expected call failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_pool_rejects_work() {
        let pool = WorkerPool::new(1);
        pool.close();
        let adapter: DynAdapter = Arc::new(FixedAdapter::for_task(Task::Spam, None, 0.9));
        let res = pool.invoke(Task::Spam, Some(&adapter), &["x".to_string()]).await;
        assert!(matches!(res, Err(DispatchError::PoolClosed)));
    }

    #[tokio::test]
    async fn resize_keeps_a_closed_pool_closed() {
        let pool = WorkerPool::new(2);
        pool.resize(5);
        assert_eq!(pool.size(), 5);
        let adapter: DynAdapter = Arc::new(FixedAdapter::for_task(Task::Spam, None, 0.9));
        let out = pool
            .invoke(Task::Spam, Some(&adapter), &["x".to_string()])
            .await
            .expect("pool open");
        assert!(out.output(0).is_some());

        pool.close();
        pool.resize(1);
        assert_eq!(pool.size(), 1);
        let res = pool.invoke(Task::Spam, Some(&adapter), &["x".to_string()]).await;
        assert!(matches!(res, Err(DispatchError::PoolClosed)));
    }

    #[test]
    fn mock_sentiment_runners_up_exclude_the_chosen_label() {
        for chosen in ["POSITIVE", "negative", "NEUTRAL"] {
            let a = FixedAdapter::for_task(Task::Sentiment, Some(chosen), 0.7);
            let RawOutput::Ranked(ranked) = a.fixed else {
                panic!("sentiment mock should be ranked");
            };
            assert_eq!(ranked.len(), 3);
            assert_eq!(ranked[0].label, chosen);
            let repeats = ranked
                .iter()
                .filter(|ls| ls.label.eq_ignore_ascii_case(chosen))
                .count();
            assert_eq!(repeats, 1, "{chosen} listed twice: {ranked:?}");
            assert!((ranked[1].score - 0.15).abs() < 1e-6);
        }
    }

    #[test]
    fn adapter_set_from_config_skips_disabled() {
        let cfg = AdaptersConfig {
            sentiment: Some(AdapterConfig {
                provider: ProviderKind::Mock,
                ..Default::default()
            }),
            spam: Some(AdapterConfig::default()),
            category: None,
            quality: None,
        };
        let set = AdapterSet::from_config(&cfg).expect("build");
        assert_eq!(set.configured(), vec![Task::Sentiment]);
    }

    #[test]
    fn mock_category_output_leads_with_configured_label() {
        let a = FixedAdapter::for_task(Task::Category, Some("makeup"), 0.8);
        match a.fixed {
            RawOutput::ZeroShot { labels, scores } => {
                assert_eq!(labels.len(), 5);
                assert_eq!(labels[0], "makeup");
                assert_eq!(scores.len(), 5);
                assert!((scores[0] - 0.8).abs() < 1e-6);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
