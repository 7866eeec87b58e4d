//! Error handling for the recording pipeline.
//!
//! Unit- and chain-level problems (continuity breaks, missing files, schema
//! mismatches) are not errors: they become [`crate::ledger::ExclusionReason`]
//! entries and the batch carries on. Only root-level conditions surface here.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Source directory not found or unreadable: {path}")]
    SourceUnreadable { path: PathBuf },

    #[error("Recording unit name does not match <vehicle>_<date>_<time>_<split>: '{name}'")]
    MalformedUnitName { name: String },

    #[error("Exclusion ledger unusable at {path}: {reason}")]
    LedgerUnusable { path: PathBuf, reason: String },

    #[error("Merge failed for '{destination}': {reason}")]
    MergeFailed { destination: String, reason: String },

    #[error("Analysis failed for vehicle {vehicle}: {reason}")]
    AnalysisFailed { vehicle: String, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Processing interrupted: {reason}")]
    Interrupted { reason: String },
}

impl PipelineError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an interruption error (cooperative cancellation).
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self::Interrupted {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
