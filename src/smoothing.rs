//! Per-run preprocessing: projection, trimming, smoothing, assembly.
//!
//! Each merged run's time table goes through the same shaping before event
//! detection: project down to the column manifest, drop the duplicated
//! boundary row at the end of the file, normalise the timestamp and mission
//! columns, and replace each gauge column with its rolling median. Rows
//! without a full smoothing window are dropped, as are rows recorded outside
//! a mission.

use crate::config::PipelineConfig;
use crate::constants::{MISSION_COLUMN, MISSION_NONE, TIMESTAMP_COLUMN};
use crate::error::Result;
use crate::models::MergedRun;
use polars::prelude::*;
use std::fs::File;
use tracing::debug;

/// Rolling median over a fixed trailing window. The first `window - 1` slots
/// have no full window and come back as NaN; a NaN anywhere in a window makes
/// that output NaN. Readings are noisy step signals, so the median is taken
/// over a sorted copy of each window rather than an incremental structure.
pub fn rolling_median(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    let mut buffer = Vec::with_capacity(window);
    for end in window - 1..values.len() {
        let slice = &values[end + 1 - window..=end];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        buffer.clear();
        buffer.extend_from_slice(slice);
        buffer.sort_by(f64::total_cmp);
        out[end] = if window % 2 == 1 {
            buffer[window / 2]
        } else {
            (buffer[window / 2 - 1] + buffer[window / 2]) / 2.0
        };
    }
    out
}

/// Shape one merged run's time table for analysis. Works on an in-memory
/// frame so the file layer stays out of the way in tests.
pub fn preprocess_frame(df: DataFrame, config: &PipelineConfig) -> Result<DataFrame> {
    let manifest: Vec<&str> = config.required_columns.iter().map(|s| s.as_str()).collect();
    let mut df = df.select(manifest)?;

    // The last row of every recording repeats the first row of the next one;
    // drop it before concatenation.
    let height = df.height();
    df = df.slice(0, height.saturating_sub(1));

    df.rename("time", TIMESTAMP_COLUMN)?;

    let mut smoothed = df;
    for gauge in config.gauge_columns() {
        let values: Vec<f64> = smoothed
            .column(gauge)?
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        let series = Series::new(gauge.as_str(), rolling_median(&values, config.smoothing_window));
        smoothed.with_column(series)?;
    }

    let mut lf = smoothed
        .lazy()
        .with_column(
            col(TIMESTAMP_COLUMN).cast(DataType::Datetime(TimeUnit::Milliseconds, None)),
        )
        .with_column(col(MISSION_COLUMN).cast(DataType::Int64));
    for gauge in config.gauge_columns() {
        lf = lf.filter(col(gauge).is_not_nan());
    }
    Ok(lf.collect()?)
}

/// Read and preprocess one merged run's time table.
pub fn preprocess_run(run: &MergedRun, config: &PipelineConfig) -> Result<DataFrame> {
    let path = run.dest_path.join(crate::constants::TIME_TABLE_FILE);
    let df = ParquetReader::new(File::open(&path)?)
        .with_columns(Some(config.required_columns.clone()))
        .finish()?;
    debug!("Preprocessing '{}' ({} rows)", run.destination, df.height());
    preprocess_frame(df, config)
}

/// Stack preprocessed runs for one vehicle in run order, then drop every row
/// recorded outside a mission.
pub fn assemble_vehicle(frames: Vec<DataFrame>) -> Result<DataFrame> {
    let mut stacked: Option<DataFrame> = None;
    for frame in frames {
        stacked = Some(match stacked {
            None => frame,
            Some(acc) => acc.vstack(&frame)?,
        });
    }
    let Some(stacked) = stacked else {
        return Ok(DataFrame::default());
    };

    let filtered = stacked
        .lazy()
        .filter(col(MISSION_COLUMN).neq(lit(MISSION_NONE)))
        .collect()?;
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants;

    #[test]
    fn rolling_median_trailing_window() {
        let out = rolling_median(&[1.0, 9.0, 2.0, 8.0, 3.0], 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_eq!(&out[2..], &[2.0, 8.0, 3.0]);
    }

    #[test]
    fn rolling_median_even_window_averages_middle_pair() {
        let out = rolling_median(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(out[0].is_nan());
        assert_eq!(&out[1..], &[1.5, 2.5, 3.5]);
    }

    #[test]
    fn rolling_median_propagates_nan_through_window() {
        let out = rolling_median(&[1.0, f64::NAN, 3.0, 4.0, 5.0], 2);
        assert!(out[1].is_nan());
        assert!(out[2].is_nan());
        assert_eq!(out[3], 3.5);
    }

    #[test]
    fn short_input_is_all_nan() {
        let out = rolling_median(&[1.0, 2.0], 3);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    fn fixture_frame(rows: usize) -> DataFrame {
        let config = PipelineConfig::default();
        let mut columns = Vec::new();
        for (index, name) in config.required_columns.iter().enumerate() {
            let series = if name == "time" {
                Series::new(name.as_str(), (0..rows as i64).map(|i| i * 1000).collect::<Vec<_>>())
            } else if name == MISSION_COLUMN {
                Series::new(name.as_str(), vec![7i64; rows])
            } else {
                Series::new(
                    name.as_str(),
                    (0..rows).map(|i| (i + index) as f64).collect::<Vec<_>>(),
                )
            };
            columns.push(series);
        }
        DataFrame::new(columns).unwrap()
    }

    #[test]
    fn preprocess_drops_boundary_row_and_unsmoothed_head() {
        let config = PipelineConfig::default().with_smoothing_window(3);
        let df = fixture_frame(10);
        let out = preprocess_frame(df, &config).unwrap();

        // 10 rows, minus the trailing boundary row, minus the two rows with
        // no full window.
        assert_eq!(out.height(), 7);
        assert!(out.column(TIMESTAMP_COLUMN).is_ok());
        assert!(out.column("time").is_err());
        assert_eq!(
            out.column(MISSION_COLUMN).unwrap().dtype(),
            &DataType::Int64
        );
    }

    #[test]
    fn assemble_drops_out_of_mission_rows() {
        let config = PipelineConfig::default().with_smoothing_window(2);
        let mut df = fixture_frame(6);
        df.with_column(Series::new(MISSION_COLUMN, vec![7i64, 7, 0, 0, 5, 5]))
            .unwrap();
        let frame = preprocess_frame(df, &config).unwrap();
        let assembled = assemble_vehicle(vec![frame]).unwrap();

        let missions: Vec<i64> = assembled
            .column(MISSION_COLUMN)
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert!(missions.iter().all(|m| *m != constants::MISSION_NONE));
    }
}
