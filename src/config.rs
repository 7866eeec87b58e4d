//! Configuration for the recording pipeline.
//!
//! One [`PipelineConfig`] is built in the CLI layer and passed by reference
//! into every component. Components never read ambient constants directly, so
//! calibration values and the column manifest can be swapped out wholesale in
//! tests or for a future on-board software revision.

use crate::constants;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Thresholds driving the event-detection state machines. Percentages for the
/// grey/waste tanks, a raw gauge reading for the clean tank maximum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionThresholds {
    /// Grey-water refill arms only at or below this level.
    pub grey_refill_arm_level: f64,

    /// Grey-water automatic drain triggers at or above this level.
    pub grey_drain_level: f64,

    /// Waste-water maintenance drain recognised at or below this level.
    pub waste_drain_floor: f64,

    /// Clean-water gauge reading when the tank is full.
    pub clean_tank_max: f64,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            grey_refill_arm_level: constants::GREY_REFILL_ARM_LEVEL,
            grey_drain_level: constants::GREY_DRAIN_LEVEL,
            waste_drain_floor: constants::WASTE_DRAIN_FLOOR,
            clean_tank_max: constants::CLEAN_TANK_MAX,
        }
    }
}

/// Per-use litre volumes. Domain calibration data with no derivation; treated
/// as configuration, never as literals at the use site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeCalibration {
    /// Clean water drawn per tap use.
    pub tap_draw_litres: f64,

    /// Clean water drawn per grey-water refill cycle.
    pub grey_refill_draw_litres: f64,

    /// Waste added per flush cycle.
    pub flush_fill_litres: f64,

    /// Waste added per grey-water drain cycle.
    pub grey_drain_fill_litres: f64,
}

impl Default for VolumeCalibration {
    fn default() -> Self {
        Self {
            tap_draw_litres: constants::TAP_DRAW_LITRES,
            grey_refill_draw_litres: constants::GREY_REFILL_DRAW_LITRES,
            flush_fill_litres: constants::FLUSH_FILL_LITRES,
            grey_drain_fill_litres: constants::GREY_DRAIN_FILL_LITRES,
        }
    }
}

/// Global configuration for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Context-file format version accepted by the validator.
    pub expected_context_version: String,

    /// Columns every time table must contain; also the projection applied
    /// before analysis. Order matters: the first
    /// [`leading_columns`](Self::leading_columns) entries are context columns
    /// and are never smoothed.
    pub required_columns: Vec<String>,

    /// How many of `required_columns` are leading context columns.
    pub leading_columns: usize,

    /// Rolling-median window applied to gauge columns.
    pub smoothing_window: usize,

    /// Event-detection thresholds.
    pub thresholds: DetectionThresholds,

    /// Litre calibration for derived volumes.
    pub calibration: VolumeCalibration,

    /// Maximum vehicles analysed concurrently.
    pub max_concurrent_vehicles: usize,

    /// Validate and write the ledger, then stop before merge and analysis.
    pub validate_only: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            expected_context_version: constants::EXPECTED_CONTEXT_VERSION.to_string(),
            required_columns: constants::required_columns(),
            leading_columns: constants::LEADING_COLUMNS.len(),
            smoothing_window: constants::SMOOTHING_WINDOW,
            thresholds: DetectionThresholds::default(),
            calibration: VolumeCalibration::default(),
            max_concurrent_vehicles: num_cpus::get().clamp(1, 8),
            validate_only: false,
        }
    }
}

impl PipelineConfig {
    /// Set the concurrent-vehicle cap.
    pub fn with_max_concurrent_vehicles(mut self, workers: usize) -> Self {
        self.max_concurrent_vehicles = workers.max(1);
        self
    }

    /// Stop after validation.
    pub fn with_validate_only(mut self) -> Self {
        self.validate_only = true;
        self
    }

    /// Override the smoothing window.
    pub fn with_smoothing_window(mut self, window: usize) -> Self {
        self.smoothing_window = window;
        self
    }

    /// Gauge columns: everything in the manifest past the leading context
    /// columns.
    pub fn gauge_columns(&self) -> &[String] {
        &self.required_columns[self.leading_columns..]
    }

    /// Reject configurations the pipeline cannot run with. An empty column
    /// manifest is fatal at the root: without it there is no completeness
    /// gate and no projection.
    pub fn validate(&self) -> Result<()> {
        if self.required_columns.is_empty() {
            return Err(PipelineError::configuration(
                "required-column manifest is empty",
            ));
        }
        if self.leading_columns >= self.required_columns.len() {
            return Err(PipelineError::configuration(
                "column manifest has no gauge columns past the leading context columns",
            ));
        }
        if self.smoothing_window < 2 {
            return Err(PipelineError::configuration(
                "smoothing window must be at least 2 samples",
            ));
        }
        if self.expected_context_version.is_empty() {
            return Err(PipelineError::configuration(
                "expected context version is empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_manifest_is_fatal() {
        let config = PipelineConfig {
            required_columns: vec![],
            leading_columns: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn gauge_columns_skip_context_columns() {
        let config = PipelineConfig::default();
        assert_eq!(config.gauge_columns().len(), 20);
        assert!(config.gauge_columns()[0].starts_with("WC_CAR01"));
    }
}
