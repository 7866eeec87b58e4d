//! Indicator aggregation over the annotated global frame.
//!
//! The litre columns are cumulative within a mission run, so the litres
//! attributable to one run are the spread (max minus min) of the total inside
//! that run. The by-run tables hold one row per (vehicle, day, mission, run);
//! the by-day tables reduce those runs to min/max/mean/median per vehicle and
//! day.

use crate::constants::{
    CLEAN_TOTAL_COLUMN, DAY_COLUMN, MISSION_COLUMN, MISSION_RUN_COLUMN, VEHICLE_COLUMN,
    WASTE_TOTAL_COLUMN,
};
use crate::error::Result;
use polars::prelude::*;

/// Litre value column of the by-run tables.
pub const LITRES_COLUMN: &str = "litres";

/// The four indicator tables derived from one batch's global frame.
#[derive(Debug)]
pub struct IndicatorTables {
    pub clean_by_run: DataFrame,
    pub clean_by_day: DataFrame,
    pub waste_by_run: DataFrame,
    pub waste_by_day: DataFrame,
}

/// Litres per mission run: the spread of a cumulative litre column within
/// each (vehicle, day, mission, run) group.
pub fn litres_by_run(global: &DataFrame, value_column: &str) -> Result<DataFrame> {
    let keys = [
        col(VEHICLE_COLUMN),
        col(DAY_COLUMN),
        col(MISSION_COLUMN),
        col(MISSION_RUN_COLUMN),
    ];
    let out = global
        .clone()
        .lazy()
        .group_by(keys.clone())
        .agg([(col(value_column).max() - col(value_column).min()).alias(LITRES_COLUMN)])
        .sort_by_exprs(keys, SortMultipleOptions::default())
        .collect()?;
    Ok(out)
}

/// Day-level statistics over the per-run litre values.
pub fn litres_by_day(by_run: &DataFrame) -> Result<DataFrame> {
    let keys = [col(VEHICLE_COLUMN), col(DAY_COLUMN)];
    let out = by_run
        .clone()
        .lazy()
        .group_by(keys.clone())
        .agg([
            col(LITRES_COLUMN).min().alias("min"),
            col(LITRES_COLUMN).max().alias("max"),
            col(LITRES_COLUMN).mean().alias("mean"),
            col(LITRES_COLUMN).median().alias("median"),
        ])
        .sort_by_exprs(keys, SortMultipleOptions::default())
        .collect()?;
    Ok(out)
}

/// Build all four indicator tables from the annotated global frame.
pub fn indicator_tables(global: &DataFrame) -> Result<IndicatorTables> {
    let clean_by_run = litres_by_run(global, CLEAN_TOTAL_COLUMN)?;
    let clean_by_day = litres_by_day(&clean_by_run)?;
    let waste_by_run = litres_by_run(global, WASTE_TOTAL_COLUMN)?;
    let waste_by_day = litres_by_day(&waste_by_run)?;
    Ok(IndicatorTables {
        clean_by_run,
        clean_by_day,
        waste_by_run,
        waste_by_day,
    })
}
