//! Water-System Recording Processor Library
//!
//! A Rust library for processing directories of train on-board water-system
//! Parquet recordings into water consumption indicator tables.
//!
//! This library provides tools for:
//! - Validating recording-unit naming continuity and file structure
//! - Recording exclusions in a durable plain-text ledger
//! - Merging split recordings into whole runs
//! - Smoothing gauge signals and detecting tank events per car unit
//! - Segmenting mission runs and aggregating litre indicators
//! - Publishing per-row and aggregate tables through a pluggable store

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod ledger;
pub mod merger;
pub mod missions;
pub mod models;
pub mod pipeline;
pub mod smoothing;
pub mod storage;
pub mod validator;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use ledger::{ExclusionLedger, ExclusionReason};
pub use models::{BatchStats, MergedRun, RecordingUnit};
pub use pipeline::{BatchPaths, BatchPipeline};
pub use storage::{ParquetStore, TableStore};
