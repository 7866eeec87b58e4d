//! Tank-event detection over one vehicle's assembled signal frame.
//!
//! Each car unit carries five smoothed gauges; four edge/threshold state
//! machines turn them into event pulse columns, and two litre columns are
//! derived from the counters and pulses. Every machine is a plain forward
//! scan with a busy flag so a multi-sample transition is counted once. The
//! scans compare row `t` with row `t + 1`, so the last row of the frame never
//! carries a pulse.

use crate::config::PipelineConfig;
use crate::constants::{
    self, CLEAN_TOTAL_COLUMN, DAY_COLUMN, TIMESTAMP_COLUMN, VEHICLE_COLUMN, WASTE_TOTAL_COLUMN,
};
use crate::error::Result;
use polars::prelude::*;
use tracing::debug;

/// Grey-water automatic refill: a rising edge while the machine is idle and
/// the level is at or below the arm threshold.
pub fn detect_grey_refill(levels: &[f64], arm_level: f64) -> Vec<i64> {
    let mut pulses = vec![0i64; levels.len()];
    let mut busy = false;
    for t in 0..levels.len().saturating_sub(1) {
        if levels[t] < levels[t + 1] && !busy && levels[t] <= arm_level {
            pulses[t] = 1;
            busy = true;
        }
        if levels[t] >= levels[t + 1] {
            busy = false;
        }
    }
    pulses
}

/// Grey-water automatic drain: the level sitting at or above the drain
/// threshold while the machine is idle.
pub fn detect_grey_drain(levels: &[f64], drain_level: f64) -> Vec<i64> {
    let mut pulses = vec![0i64; levels.len()];
    let mut busy = false;
    for t in 0..levels.len().saturating_sub(1) {
        if levels[t] >= drain_level && !busy {
            pulses[t] = 1;
            busy = true;
        }
        if levels[t] < drain_level {
            busy = false;
        }
    }
    pulses
}

/// Waste-water maintenance drain: a falling edge while idle that lands at or
/// below the floor.
pub fn detect_waste_drain(levels: &[f64], floor: f64) -> Vec<i64> {
    let mut pulses = vec![0i64; levels.len()];
    let mut busy = false;
    for t in 0..levels.len().saturating_sub(1) {
        if levels[t] > levels[t + 1] && !busy && levels[t + 1] <= floor {
            pulses[t] = 1;
            busy = true;
        }
        if levels[t] <= levels[t + 1] {
            busy = false;
        }
    }
    pulses
}

/// Clean-water maintenance refill: a rising edge while idle that reaches the
/// gauge's full reading.
pub fn detect_clean_refill(levels: &[f64], tank_max: f64) -> Vec<i64> {
    let mut pulses = vec![0i64; levels.len()];
    let mut busy = false;
    for t in 0..levels.len().saturating_sub(1) {
        if levels[t] < levels[t + 1] && !busy && levels[t + 1] == tank_max {
            pulses[t] = 1;
            busy = true;
        }
        if levels[t] >= levels[t + 1] {
            busy = false;
        }
    }
    pulses
}

fn gauge_values(df: &DataFrame, car: &str, gauge: &str) -> Result<Vec<f64>> {
    let name = constants::gauge_column(car, gauge);
    let values = df
        .column(&name)?
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}

/// Run every state machine over one vehicle's assembled frame and append the
/// per-car pulse and litre columns, the whole-train totals, the calendar day,
/// and the vehicle identifier.
pub fn annotate_events(
    df: DataFrame,
    vehicle_id: &str,
    config: &PipelineConfig,
) -> Result<DataFrame> {
    let mut df = df;
    let rows = df.height();
    let thresholds = &config.thresholds;
    let calibration = &config.calibration;

    let mut clean_total = vec![0.0f64; rows];
    let mut waste_total = vec![0.0f64; rows];

    for car in constants::CAR_UNITS {
        let grey = gauge_values(&df, car, constants::GAUGE_GREY_LEVEL)?;
        let waste = gauge_values(&df, car, constants::GAUGE_WASTE_LEVEL)?;
        let clean = gauge_values(&df, car, constants::GAUGE_CLEAN_LEVEL)?;
        let taps = gauge_values(&df, car, constants::GAUGE_TAP_COUNT)?;
        let flushes = gauge_values(&df, car, constants::GAUGE_FLUSH_COUNT)?;

        let grey_refill = detect_grey_refill(&grey, thresholds.grey_refill_arm_level);
        let grey_drain = detect_grey_drain(&grey, thresholds.grey_drain_level);
        let waste_drain = detect_waste_drain(&waste, thresholds.waste_drain_floor);
        let clean_refill = detect_clean_refill(&clean, thresholds.clean_tank_max);

        let clean_consumption: Vec<f64> = (0..rows)
            .map(|t| {
                taps[t] * calibration.tap_draw_litres
                    + grey_refill[t] as f64 * calibration.grey_refill_draw_litres
            })
            .collect();
        let waste_fill: Vec<f64> = (0..rows)
            .map(|t| {
                flushes[t] * calibration.flush_fill_litres
                    + grey_drain[t] as f64 * calibration.grey_drain_fill_litres
            })
            .collect();

        for t in 0..rows {
            clean_total[t] += clean_consumption[t];
            waste_total[t] += waste_fill[t];
        }

        for (kind, pulses) in [
            (constants::EVENT_GREY_REFILL, grey_refill),
            (constants::EVENT_GREY_DRAIN, grey_drain),
            (constants::EVENT_WASTE_DRAIN, waste_drain),
            (constants::EVENT_CLEAN_REFILL, clean_refill),
        ] {
            let name = constants::derived_column(car, kind);
            df.with_column(Series::new(name.as_str(), pulses))?;
        }
        for (kind, litres) in [
            (constants::EVENT_CLEAN_CONSUMPTION, clean_consumption),
            (constants::EVENT_WASTE_FILL, waste_fill),
        ] {
            let name = constants::derived_column(car, kind);
            df.with_column(Series::new(name.as_str(), litres))?;
        }
    }

    df.with_column(Series::new(CLEAN_TOTAL_COLUMN, clean_total))?;
    df.with_column(Series::new(WASTE_TOTAL_COLUMN, waste_total))?;

    let annotated = df
        .lazy()
        .with_column(col(TIMESTAMP_COLUMN).dt().date().alias(DAY_COLUMN))
        .with_column(lit(vehicle_id).alias(VEHICLE_COLUMN))
        .collect()?;
    debug!(
        "Annotated {} rows with event columns for vehicle {}",
        rows, vehicle_id
    );
    Ok(annotated)
}
