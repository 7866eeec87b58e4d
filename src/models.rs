//! Core data structures for recording-unit processing.
//!
//! A recording unit is one directory of paired sensor files covering one
//! transmission window; its name encodes identity. Parsing the name is the
//! leaf of the whole pipeline and is a pure function.

use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Directory name pattern `<vehicle>_<date>_<time>_<split>`, e.g.
/// `z5500503_20230406_123456_0`.
fn unit_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<vehicle>z\d{7})_(?P<date>\d{8})_(?P<time>\d{6})_(?P<split>\d+)$")
            .expect("unit name pattern is valid")
    })
}

/// One recording-unit directory, identified by its parsed name. Immutable
/// once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingUnit {
    pub vehicle_id: String,
    pub date: String,
    pub time: String,
    pub split_index: u32,
    pub name: String,
}

impl RecordingUnit {
    /// Parse a directory name into its identity fields. The date portion must
    /// be a real calendar date; the split index a non-negative integer.
    pub fn parse(name: &str) -> Result<Self> {
        let captures =
            unit_name_pattern()
                .captures(name)
                .ok_or_else(|| PipelineError::MalformedUnitName {
                    name: name.to_string(),
                })?;

        let date = captures["date"].to_string();
        NaiveDate::parse_from_str(&date, "%Y%m%d").map_err(|_| {
            PipelineError::MalformedUnitName {
                name: name.to_string(),
            }
        })?;

        let split_index: u32 =
            captures["split"]
                .parse()
                .map_err(|_| PipelineError::MalformedUnitName {
                    name: name.to_string(),
                })?;

        Ok(Self {
            vehicle_id: captures["vehicle"].to_string(),
            date,
            time: captures["time"].to_string(),
            split_index,
            name: name.to_string(),
        })
    }

    /// Name this unit would carry if it were the start of its chain. Used in
    /// the continuity warning for a batch whose first unit is mid-chain.
    pub fn expected_chain_start_name(&self) -> String {
        format!("{}_{}_{}_0", self.vehicle_id, self.date, self.time)
    }
}

/// One continuity chain merged into a single destination pair.
#[derive(Debug, Clone)]
pub struct MergedRun {
    /// Destination directory name, `<vehicle>_<date>_<time>_0T<k-1>` where
    /// the identity fields come from the first member.
    pub destination: String,
    pub dest_path: PathBuf,
    pub members: Vec<RecordingUnit>,
}

impl MergedRun {
    pub fn vehicle_id(&self) -> &str {
        &self.members[0].vehicle_id
    }
}

/// Counters reported at the end of a batch.
#[derive(Debug, Default)]
pub struct BatchStats {
    pub units_seen: usize,
    pub units_excluded: usize,
    pub runs_merged: usize,
    pub vehicles_analysed: usize,
    pub rows_published: usize,
    pub processing_time_ms: u128,
}
