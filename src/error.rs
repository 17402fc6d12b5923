//! Error types for the analysis engine.
//!
//! Adapter and interpretation errors are recovered inside the dispatcher; only
//! `JobError` is returned to callers of the job API.

use thiserror::Error;
use uuid::Uuid;

use crate::model::{JobStatus, Task};

/// A single adapter invocation failed for the whole text list.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{task} adapter call failed: {reason}")]
    Call { task: Task, reason: String },

    #[error("{task} adapter returned {got} outputs for {expected} texts")]
    LengthMismatch {
        task: Task,
        expected: usize,
        got: usize,
    },

    #[error("{task} adapter panicked or was cancelled")]
    Aborted { task: Task },
}

/// Adapter output for one comment had an unexpected shape.
#[derive(Debug, Error, PartialEq)]
pub enum InterpretError {
    #[error("{task}: empty label list")]
    Empty { task: Task },

    #[error("{task}: labels/scores length mismatch ({labels} vs {scores})")]
    Misaligned {
        task: Task,
        labels: usize,
        scores: usize,
    },

    #[error("{task}: non-finite score")]
    NonFinite { task: Task },
}

/// A batch could not be processed as a whole.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("worker pool is closed")]
    PoolClosed,
}

/// Job lifecycle errors surfaced to the orchestrating layer.
#[derive(Debug, Error, PartialEq)]
pub enum JobError {
    #[error("no comments to analyze")]
    NoComments,

    #[error("analysis {0} not found")]
    NotFound(Uuid),

    #[error("analysis {id} is {status}, expected {expected}")]
    InvalidState {
        id: Uuid,
        status: JobStatus,
        expected: JobStatus,
    },
}

/// Analysis mode name outside the known presets.
#[derive(Debug, Error, PartialEq)]
pub enum ModeError {
    #[error("unknown analysis mode '{0}', expected one of: fast, balanced, accurate, custom")]
    Unknown(String),
}
