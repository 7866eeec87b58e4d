//! Pinned defaults for the water-system recording pipeline.
//!
//! Everything here is a default: components never read these directly, they
//! receive a [`crate::config::PipelineConfig`] built from them. Keeping the
//! manifest and calibration values in one place makes the pinned wire format
//! auditable.

// =============================================================================
// Recording-unit layout
// =============================================================================

/// Time-table file inside every recording-unit directory.
pub const TIME_TABLE_FILE: &str = "tt_IP.parquet";

/// Context/metadata file inside every recording-unit directory.
pub const CONTEXT_FILE: &str = "ctxt_IP.parquet";

/// Column of the context file holding the on-board software format version.
pub const CONTEXT_VERSION_COLUMN: &str = "conf";

/// Context format version this pipeline understands. Anything else is a hard
/// per-unit exclusion.
pub const EXPECTED_CONTEXT_VERSION: &str = "v1.0.0.91";

// =============================================================================
// Exclusion ledger
// =============================================================================

/// Ledger file name, created next to the source directory.
pub const LEDGER_FILE_NAME: &str = "parquet_exclusion.txt";

/// Header written when the ledger file is (re)created. Four lines; readers
/// skip exactly this many.
pub const LEDGER_HEADER: &str = "Parquet folder exclusion list\n\
Reading: \"<folder name>: <exclude reason>\"\n\
-- See logs for further details --\n\n";

/// Number of reserved header lines at the top of the ledger file.
pub const LEDGER_HEADER_LINES: usize = 4;

// =============================================================================
// Time-table column manifest
// =============================================================================

/// Car units carrying an independent water installation.
pub const CAR_UNITS: &[&str] = &["CAR01", "CAR03", "CAR05", "CAR07"];

/// Gauge column suffixes recorded per car unit.
pub const GAUGE_GREY_LEVEL: &str = "IWSUTANKLEVEL";
pub const GAUGE_TAP_COUNT: &str = "IWATERTAPCNT";
pub const GAUGE_FLUSH_COUNT: &str = "IFLUSHCYCCNT";
pub const GAUGE_WASTE_LEVEL: &str = "IWWTANKCONTENT";
pub const GAUGE_CLEAN_LEVEL: &str = "IFWTANKCONTENT";

/// Leading context columns of the time table. These are never smoothed; the
/// smoothing window applies to everything after them.
pub const LEADING_COLUMNS: &[&str] = &[
    "time",
    "x__IMISSIONTRAINNUMBER",
    "x__ILATITUDE",
    "x__ILONGITUDE",
    "x__ISPEED",
    "x__IODOMETER",
];

/// Timestamp column, renamed from `time` before analysis.
pub const TIMESTAMP_COLUMN: &str = "x_time";

/// Mission identifier column. Rows where it is 0 carry no mission and are
/// dropped after smoothing.
pub const MISSION_COLUMN: &str = "x__IMISSIONTRAINNUMBER";

/// Sentinel mission identifier meaning "no mission assigned".
pub const MISSION_NONE: i64 = 0;

/// Build the full required-column manifest: the leading context columns
/// followed by the five gauges of each car unit.
pub fn required_columns() -> Vec<String> {
    let mut columns: Vec<String> = LEADING_COLUMNS.iter().map(|c| c.to_string()).collect();
    for car in CAR_UNITS {
        for gauge in [
            GAUGE_GREY_LEVEL,
            GAUGE_TAP_COUNT,
            GAUGE_FLUSH_COUNT,
            GAUGE_WASTE_LEVEL,
            GAUGE_CLEAN_LEVEL,
        ] {
            columns.push(gauge_column(car, gauge));
        }
    }
    columns
}

/// Column name of one gauge on one car unit, e.g.
/// `WC_CAR01_LCST_IWSUTANKLEVEL`.
pub fn gauge_column(car: &str, gauge: &str) -> String {
    format!("WC_{car}_LCST_{gauge}")
}

/// Derived-column name for one event kind on one car unit.
pub fn derived_column(car: &str, kind: &str) -> String {
    format!("WC_{car}_LCST_{kind}")
}

// =============================================================================
// Analysis defaults
// =============================================================================

/// Rolling-median window applied to gauge columns (one sample per second, so
/// this is 15 seconds of signal).
pub const SMOOTHING_WINDOW: usize = 15;

/// Grey-water refill arms only while the tank level is at or below this
/// percentage.
pub const GREY_REFILL_ARM_LEVEL: f64 = 25.0;

/// Grey-water automatic drain triggers at or above this percentage.
pub const GREY_DRAIN_LEVEL: f64 = 95.0;

/// Waste-water maintenance drain is recognised once the level falls to or
/// below this percentage.
pub const WASTE_DRAIN_FLOOR: f64 = 5.0;

/// Clean-water tank reading reported when the tank is full. Calibration value
/// from the on-board gauge, not a percentage.
pub const CLEAN_TANK_MAX: f64 = 5.0;

/// Litres drawn from the clean-water tank per tap use.
pub const TAP_DRAW_LITRES: f64 = 0.4;

/// Litres drawn from the clean-water tank per grey-water refill cycle.
pub const GREY_REFILL_DRAW_LITRES: f64 = 0.665;

/// Litres added to the waste-water tank per flush cycle (0.4 water + 0.3
/// waste).
pub const FLUSH_FILL_LITRES: f64 = 0.7;

/// Litres added to the waste-water tank per grey-water drain cycle.
pub const GREY_DRAIN_FILL_LITRES: f64 = 0.475;

// =============================================================================
// Derived columns
// =============================================================================

/// Per-car event-kind suffixes, combined with [`derived_column`].
pub const EVENT_GREY_REFILL: &str = "grey_refill_pulse";
pub const EVENT_GREY_DRAIN: &str = "grey_drain_pulse";
pub const EVENT_WASTE_DRAIN: &str = "waste_drain_pulse";
pub const EVENT_CLEAN_REFILL: &str = "clean_refill_pulse";
pub const EVENT_CLEAN_CONSUMPTION: &str = "clean_consumption";
pub const EVENT_WASTE_FILL: &str = "waste_fill";

/// Calendar day of the sample, derived from the timestamp.
pub const DAY_COLUMN: &str = "day";

/// Vehicle identifier column added during analysis.
pub const VEHICLE_COLUMN: &str = "vehicle";

/// Whole-train litre totals across the four car units.
pub const CLEAN_TOTAL_COLUMN: &str = "clean_consumption_total";
pub const WASTE_TOTAL_COLUMN: &str = "waste_fill_total";

/// Zero-based mission-run counter within one vehicle's assembled frame.
pub const MISSION_RUN_COLUMN: &str = "mission_run";

// =============================================================================
// Output tables
// =============================================================================

/// Flat per-row table with every derived column, all vehicles concatenated.
pub const TABLE_GLOBAL: &str = "global_data";

pub const TABLE_CLEAN_BY_RUN: &str = "clean_consumption_by_run";
pub const TABLE_CLEAN_BY_DAY: &str = "clean_consumption_by_day";
pub const TABLE_WASTE_BY_RUN: &str = "waste_fill_by_run";
pub const TABLE_WASTE_BY_DAY: &str = "waste_fill_by_day";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_covers_all_cars_and_gauges() {
        let columns = required_columns();
        assert_eq!(columns.len(), LEADING_COLUMNS.len() + 4 * 5);
        assert!(columns.contains(&"WC_CAR05_LCST_IFLUSHCYCCNT".to_string()));
        assert_eq!(&columns[..6], LEADING_COLUMNS);
    }

    #[test]
    fn ledger_header_is_four_lines() {
        assert_eq!(LEDGER_HEADER.lines().count(), LEDGER_HEADER_LINES);
        assert!(LEDGER_HEADER.ends_with("\n\n"));
    }
}
