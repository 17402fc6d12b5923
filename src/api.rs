use std::sync::{Arc, RwLock};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::analyze::{BatchItem, CacheStats};
use crate::config::{AnalysisMode, ModeProfile};
use crate::engine::AnalysisEngine;
use crate::error::{DispatchError, JobError, ModeError};
use crate::jobs::JobSummary;
use crate::model::{AnalysisJob, AnalysisResult, Comment, JobStatus};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnalysisEngine>,
    /// Currently loaded comment set; jobs take a snapshot at start.
    pub comments: Arc<RwLock<Vec<Comment>>>,
}

impl AppState {
    pub fn new(engine: Arc<AnalysisEngine>) -> Self {
        Self {
            engine,
            comments: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn loaded_comments(&self) -> Vec<Comment> {
        self.comments
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/comments", post(load_comments))
        .route("/api/analysis/start", post(start_analysis))
        .route("/api/analysis/status/{id}", get(analysis_status))
        .route("/api/analysis/stop/{id}", post(stop_analysis))
        .route("/api/analysis/resume/{id}", post(resume_analysis))
        .route("/api/analysis/jobs", get(list_jobs))
        .route("/api/analysis/modes", get(analysis_modes))
        .route("/api/analysis/mode", post(set_analysis_mode))
        .route("/api/analyze/batch", post(analyze_batch))
        .route("/api/cache/stats", get(cache_stats))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---------------- errors ----------------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Mode(#[from] ModeError),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Job(JobError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Job(_) | ApiError::Mode(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Dispatch(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

// ---------------- handlers ----------------

#[derive(Serialize)]
struct LoadedResp {
    loaded: usize,
}

async fn load_comments(
    State(state): State<AppState>,
    Json(comments): Json<Vec<Comment>>,
) -> Json<LoadedResp> {
    let loaded = comments.len();
    match state.comments.write() {
        Ok(mut g) => *g = comments,
        Err(p) => *p.into_inner() = comments,
    }
    tracing::info!(target: "jobs", loaded, "comment set replaced");
    Json(LoadedResp { loaded })
}

#[derive(Deserialize, Default)]
struct StartReq {
    #[serde(default)]
    resume_analysis_id: Option<Uuid>,
}

#[derive(Serialize)]
struct JobResp {
    analysis_id: Uuid,
    status: &'static str,
}

/// Starts a new job over the loaded comments, or resumes `resume_analysis_id`
/// when it names a stopped job. The body is optional.
async fn start_analysis(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<JobResp>, ApiError> {
    let req: StartReq = if body.iter().all(u8::is_ascii_whitespace) {
        StartReq::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    if let Some(id) = req.resume_analysis_id {
        let resumable = state
            .engine
            .get_status(id)
            .is_ok_and(|job| job.status == JobStatus::Stopped);
        if resumable {
            state.engine.resume_job(id)?;
            return Ok(Json(JobResp {
                analysis_id: id,
                status: "resumed",
            }));
        }
    }

    let id = state.engine.start_job(state.loaded_comments())?;
    Ok(Json(JobResp {
        analysis_id: id,
        status: "started",
    }))
}

async fn analysis_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalysisJob>, ApiError> {
    Ok(Json(state.engine.get_status(id)?))
}

async fn stop_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResp>, ApiError> {
    let status = state.engine.cancel_job(id)?;
    Ok(Json(JobResp {
        analysis_id: id,
        status: status.as_str(),
    }))
}

async fn resume_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResp>, ApiError> {
    let status = state.engine.resume_job(id)?;
    Ok(Json(JobResp {
        analysis_id: id,
        status: status.as_str(),
    }))
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSummary>> {
    Json(state.engine.list_jobs())
}

async fn analyze_batch(
    State(state): State<AppState>,
    Json(items): Json<Vec<BatchItem>>,
) -> Result<Json<Vec<AnalysisResult>>, ApiError> {
    Ok(Json(state.engine.process_batch(&items).await?))
}

async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.engine.cache_stats())
}

#[derive(Serialize)]
struct ModesResp {
    current_mode: AnalysisMode,
    modes: Vec<ModeProfile>,
}

/// Every preset with the settings it would run with, plus the active one.
async fn analysis_modes(State(state): State<AppState>) -> Json<ModesResp> {
    let cfg = state.engine.config();
    Json(ModesResp {
        current_mode: state.engine.mode(),
        modes: AnalysisMode::ALL.iter().map(|m| m.profile(cfg)).collect(),
    })
}

#[derive(Deserialize)]
struct ModeReq {
    #[serde(default)]
    mode: Option<String>,
}

async fn set_analysis_mode(
    State(state): State<AppState>,
    Json(req): Json<ModeReq>,
) -> Result<Json<ModeProfile>, ApiError> {
    let raw = req
        .mode
        .ok_or_else(|| ApiError::BadRequest("mode is required".into()))?;
    let mode: AnalysisMode = raw.parse()?;
    Ok(Json(state.engine.set_mode(mode)))
}
