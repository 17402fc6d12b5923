// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod model;
pub mod runtime;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::engine::AnalysisEngine;
pub use crate::runtime::AnalyzerRuntime;
