// src/analyze/mod.rs
//! Analysis pipeline: rule fallbacks, model adapters, result interpretation,
//! caching and the batch dispatcher that ties them together.

pub mod adapter;
pub mod antispam;
pub mod cache;
pub mod dispatch;
pub mod interpret;
pub mod rules;

pub use crate::analyze::adapter::{
    AdapterSet, BlockingAdapter, DynAdapter, FixedAdapter, HttpAdapter, LabelScore, RawOutput,
    TaskAdapter, TaskOutcome, WorkerPool,
};
pub use crate::analyze::cache::{CacheEntry, CacheStats, ResultCache};
pub use crate::analyze::dispatch::{BatchDispatcher, BatchItem};
pub use crate::analyze::interpret::{Interpreted, Interpreter, TaskOutputs};

/// Short anonymized id of a text for log lines (first 6 bytes of SHA-256, hex).
pub fn text_id(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
