//! Mission-run segmentation.
//!
//! Within one vehicle's assembled frame, consecutive rows sharing a mission
//! identifier form a run. The counter starts at 0 on the first row and
//! increments whenever the identifier changes, so a mission flown twice in
//! one day yields two distinct runs.

use crate::constants::{MISSION_COLUMN, MISSION_RUN_COLUMN};
use crate::error::Result;
use polars::prelude::*;

/// Zero-based run counter over a mission-identifier sequence.
pub fn mission_runs(missions: &[i64]) -> Vec<i64> {
    let mut runs = vec![0i64; missions.len()];
    let mut counter = 0i64;
    for t in 1..missions.len() {
        if missions[t] != missions[t - 1] {
            counter += 1;
        }
        runs[t] = counter;
    }
    runs
}

/// Append the run-counter column to an assembled frame.
pub fn annotate_mission_runs(mut df: DataFrame) -> Result<DataFrame> {
    let missions: Vec<i64> = df
        .column(MISSION_COLUMN)?
        .i64()?
        .into_iter()
        .map(|v| v.unwrap_or(0))
        .collect();
    df.with_column(Series::new(MISSION_RUN_COLUMN, mission_runs(&missions)))?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_increments_on_every_change() {
        let runs = mission_runs(&[5, 5, 5, 7, 7, 3, 3, 3]);
        assert_eq!(runs, vec![0, 0, 0, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn repeated_mission_gets_distinct_runs() {
        let runs = mission_runs(&[5, 5, 7, 7, 5, 5]);
        assert_eq!(runs, vec![0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn empty_and_single_row_sequences() {
        assert!(mission_runs(&[]).is_empty());
        assert_eq!(mission_runs(&[9]), vec![0]);
    }
}
