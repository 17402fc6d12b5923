// src/config/mod.rs
pub mod analyzer;
pub mod mode;

pub use analyzer::{AdapterConfig, AdaptersConfig, AnalyzerConfig, ProviderKind, Thresholds};
pub use mode::{AnalysisMode, ModeProfile};
