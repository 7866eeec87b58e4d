//! Structural and continuity validation of recording units.
//!
//! Walks one vehicle's alphabetically sorted unit list and classifies each
//! unit as included or excluded, writing every exclusion to the ledger.
//! Continuity is decided in two passes over immutable neighbour lookups: the
//! first pass marks direct naming-sequence breaks, the second propagates the
//! cascade through a broken chain. Structural checks (file presence, context
//! version, column completeness) are additive and independent of continuity.

use crate::config::PipelineConfig;
use crate::constants::{CONTEXT_FILE, CONTEXT_VERSION_COLUMN, TIME_TABLE_FILE};
use crate::error::Result;
use crate::ledger::{ExclusionLedger, ExclusionReason};
use crate::models::RecordingUnit;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of validating one ordered unit list.
#[derive(Debug)]
pub struct ValidationOutcome {
    /// Units that passed every check, in input order.
    pub valid_units: Vec<RecordingUnit>,
    pub units_seen: usize,
    pub units_excluded: usize,
}

/// Validator for one batch of recording units under a common source root.
pub struct ContinuityValidator<'a> {
    source_dir: &'a Path,
    config: &'a PipelineConfig,
    ledger: &'a ExclusionLedger,
}

impl<'a> ContinuityValidator<'a> {
    pub fn new(
        source_dir: &'a Path,
        config: &'a PipelineConfig,
        ledger: &'a ExclusionLedger,
    ) -> Self {
        Self {
            source_dir,
            config,
            ledger,
        }
    }

    /// Validate one vehicle's sorted unit list. Never fails for a unit-level
    /// problem; only ledger I/O errors surface.
    pub fn validate(&self, units: &[RecordingUnit]) -> Result<ValidationOutcome> {
        let mut continuity_excluded = vec![false; units.len()];

        // Pass 1: direct continuity breaks from neighbour comparison only.
        for (index, unit) in units.iter().enumerate() {
            if index == 0 {
                if unit.split_index != 0 {
                    warn!(
                        "First recording unit of the batch is mid-chain: expected '{}', found '{}'",
                        unit.expected_chain_start_name(),
                        unit.name
                    );
                    continuity_excluded[0] = true;
                }
                continue;
            }

            let previous = &units[index - 1];
            let continues = unit.split_index == previous.split_index + 1;
            let restarts = unit.split_index == 0;
            if !continues && !restarts {
                warn!(
                    "Continuity break between '{}' and '{}'",
                    previous.name, unit.name
                );
                continuity_excluded[index] = true;
            }
        }

        // Pass 2: cascade. A unit counting down one step from an already
        // continuity-excluded predecessor is dragged along; a chain restart
        // (split 0) never is.
        for index in 1..units.len() {
            if continuity_excluded[index - 1]
                && units[index].split_index > 0
                && units[index - 1].split_index == units[index].split_index + 1
            {
                debug!(
                    "Cascading continuity exclusion from '{}' to '{}'",
                    units[index - 1].name,
                    units[index].name
                );
                continuity_excluded[index] = true;
            }
        }

        // Structural checks, then ledger write-out. Reasons are additive.
        let mut valid_units = Vec::new();
        let mut units_excluded = 0;
        for (index, unit) in units.iter().enumerate() {
            let mut reasons = self.inspect_unit(unit);
            if continuity_excluded[index] {
                reasons.push(ExclusionReason::Continuity);
            }

            if reasons.is_empty() {
                valid_units.push(unit.clone());
            } else {
                units_excluded += 1;
                for reason in reasons {
                    self.ledger.add(&unit.name, reason)?;
                }
            }
        }

        Ok(ValidationOutcome {
            valid_units,
            units_seen: units.len(),
            units_excluded,
        })
    }

    fn unit_dir(&self, unit: &RecordingUnit) -> PathBuf {
        self.source_dir.join(&unit.name)
    }

    /// Structural checks for one unit: data-file presence, context format
    /// version, required-column completeness. Per-unit I/O failures are
    /// logged and reported as MissingFiles; they never abort the batch.
    fn inspect_unit(&self, unit: &RecordingUnit) -> Vec<ExclusionReason> {
        let mut reasons = Vec::new();

        let tt_path = self.unit_dir(unit).join(TIME_TABLE_FILE);
        let ctxt_path = self.unit_dir(unit).join(CONTEXT_FILE);

        let tt_present = tt_path.is_file();
        let ctxt_present = ctxt_path.is_file();
        if !tt_present || !ctxt_present {
            match (tt_present, ctxt_present) {
                (false, false) => warn!(
                    "Missing both '{}' and '{}' in '{}'",
                    TIME_TABLE_FILE, CONTEXT_FILE, unit.name
                ),
                (false, true) => warn!("Missing '{}' in '{}'", TIME_TABLE_FILE, unit.name),
                (true, false) => warn!("Missing '{}' in '{}'", CONTEXT_FILE, unit.name),
                (true, true) => unreachable!(),
            }
            reasons.push(ExclusionReason::MissingFiles);
            return reasons;
        }

        match read_context_version(&ctxt_path) {
            Ok(Some(version)) if version == self.config.expected_context_version => {}
            Ok(declared) => {
                warn!(
                    "Context version mismatch in '{}': expected '{}', found {:?}",
                    unit.name, self.config.expected_context_version, declared
                );
                reasons.push(ExclusionReason::VersionMismatch);
            }
            Err(e) => {
                warn!("Unreadable context file in '{}': {:#}", unit.name, e);
                reasons.push(ExclusionReason::MissingFiles);
            }
        }

        match time_table_columns(&tt_path) {
            Ok(columns) => {
                let missing: Vec<&String> = self
                    .config
                    .required_columns
                    .iter()
                    .filter(|required| !columns.iter().any(|c| &c == required))
                    .collect();
                if !missing.is_empty() {
                    warn!(
                        "Time table in '{}' lacks {} required column(s): {:?}",
                        unit.name,
                        missing.len(),
                        missing
                    );
                    reasons.push(ExclusionReason::MissingColumns);
                }
            }
            Err(e) => {
                warn!("Unreadable time table in '{}': {:#}", unit.name, e);
                reasons.push(ExclusionReason::MissingFiles);
            }
        }

        reasons
    }
}

/// Declared format version from the context file, or None if the file has no
/// version column or no rows.
fn read_context_version(path: &Path) -> Result<Option<String>> {
    let mut frame = LazyFrame::scan_parquet(path, ScanArgsParquet::default())?;
    let schema = frame.schema()?;
    if !schema.iter_names().any(|n| n == CONTEXT_VERSION_COLUMN) {
        return Ok(None);
    }

    let df = ParquetReader::new(File::open(path)?)
        .with_columns(Some(vec![CONTEXT_VERSION_COLUMN.to_string()]))
        .finish()?;
    let version = df
        .column(CONTEXT_VERSION_COLUMN)?
        .str()?
        .get(0)
        .map(|v| v.to_string());
    Ok(version)
}

/// Column names of a time-table file, from the Parquet schema only.
fn time_table_columns(path: &Path) -> Result<Vec<String>> {
    let mut frame = LazyFrame::scan_parquet(path, ScanArgsParquet::default())?;
    let schema = frame.schema()?;
    Ok(schema.iter_names().map(|n| n.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ExclusionLedger;
    use tempfile::TempDir;

    fn units(names: &[&str]) -> Vec<RecordingUnit> {
        names
            .iter()
            .map(|name| RecordingUnit::parse(name).unwrap())
            .collect()
    }

    /// Run validation over units that all pass the structural checks and
    /// report which of them end up continuity-excluded in the ledger.
    fn continuity_reasons(names: &[&str]) -> Vec<bool> {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::default();
        let ledger = ExclusionLedger::create(dir.path().join("ledger.txt")).unwrap();

        // Give every unit its directory and files so only continuity applies.
        let source = dir.path().join("Source");
        for name in names {
            let unit_dir = source.join(name);
            std::fs::create_dir_all(&unit_dir).unwrap();
            write_context(&unit_dir, "v1.0.0.91");
            write_time_table(&unit_dir, &config);
        }

        let validator = ContinuityValidator::new(&source, &config, &ledger);
        validator.validate(&units(names)).unwrap();

        names
            .iter()
            .map(|name| ledger.is_excluded_for(name, ExclusionReason::Continuity))
            .collect()
    }

    fn write_context(unit_dir: &Path, version: &str) {
        let mut df = DataFrame::new(vec![Series::new(
            CONTEXT_VERSION_COLUMN,
            vec![version.to_string()],
        )])
        .unwrap();
        let file = File::create(unit_dir.join(CONTEXT_FILE)).unwrap();
        ParquetWriter::new(file).finish(&mut df).unwrap();
    }

    fn write_time_table(unit_dir: &Path, config: &PipelineConfig) {
        let columns: Vec<Series> = config
            .required_columns
            .iter()
            .map(|name| Series::new(name.as_str(), vec![0.0f64]))
            .collect();
        let mut df = DataFrame::new(columns).unwrap();
        let file = File::create(unit_dir.join(TIME_TABLE_FILE)).unwrap();
        ParquetWriter::new(file).finish(&mut df).unwrap();
    }

    #[test]
    fn contiguous_chain_is_fully_included() {
        let flags = continuity_reasons(&[
            "z5500503_20230406_123456_0",
            "z5500503_20230406_123456_1",
            "z5500503_20230406_123456_2",
        ]);
        assert_eq!(flags, vec![false, false, false]);
    }

    #[test]
    fn chain_restart_is_included() {
        let flags = continuity_reasons(&[
            "z5500503_20230406_123456_0",
            "z5500503_20230406_123456_1",
            "z5500503_20230407_081500_0",
            "z5500503_20230407_081500_1",
        ]);
        assert_eq!(flags, vec![false, false, false, false]);
    }

    #[test]
    fn first_unit_mid_chain_is_excluded() {
        let flags = continuity_reasons(&[
            "z5500503_20230406_123456_1",
            "z5500503_20230406_123456_2",
        ]);
        // Second unit legitimately continues from the first; only the first
        // is a continuity exclusion.
        assert_eq!(flags, vec![true, false]);
    }

    #[test]
    fn break_cascades_down_counting_units_until_restart() {
        // 0,1 then a jump to 4, then 3,2 counting down, then a restart.
        let flags = continuity_reasons(&[
            "z5500503_20230406_123456_0",
            "z5500503_20230406_123456_1",
            "z5500503_20230406_123456_4",
            "z5500503_20230406_123456_3",
            "z5500503_20230406_123456_2",
            "z5500503_20230407_081500_0",
        ]);
        assert_eq!(flags, vec![false, false, true, true, true, false]);
    }

    #[test]
    fn restart_after_break_at_split_one_is_not_cascaded() {
        let flags = continuity_reasons(&[
            "z5500503_20230406_123456_1",
            "z5500503_20230407_081500_0",
        ]);
        assert_eq!(flags, vec![true, false]);
    }

    #[test]
    fn missing_files_and_version_checks_are_additive() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::default();
        let ledger = ExclusionLedger::create(dir.path().join("ledger.txt")).unwrap();
        let source = dir.path().join("Source");

        // Unit 0: complete but wrong context version.
        let unit0 = source.join("z5500503_20230406_123456_0");
        std::fs::create_dir_all(&unit0).unwrap();
        write_context(&unit0, "v0.9.0.01");
        write_time_table(&unit0, &config);

        // Unit 1: directory exists, data files absent.
        let unit1 = source.join("z5500503_20230406_123456_1");
        std::fs::create_dir_all(&unit1).unwrap();

        let validator = ContinuityValidator::new(&source, &config, &ledger);
        let outcome = validator
            .validate(&units(&[
                "z5500503_20230406_123456_0",
                "z5500503_20230406_123456_1",
            ]))
            .unwrap();

        assert!(outcome.valid_units.is_empty());
        assert_eq!(outcome.units_excluded, 2);
        assert!(ledger.is_excluded_for(
            "z5500503_20230406_123456_0",
            ExclusionReason::VersionMismatch
        ));
        assert!(ledger.is_excluded_for(
            "z5500503_20230406_123456_1",
            ExclusionReason::MissingFiles
        ));
    }

    #[test]
    fn missing_required_column_is_excluded() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::default();
        let ledger = ExclusionLedger::create(dir.path().join("ledger.txt")).unwrap();
        let source = dir.path().join("Source");

        let unit = source.join("z5500503_20230406_123456_0");
        std::fs::create_dir_all(&unit).unwrap();
        write_context(&unit, "v1.0.0.91");
        // Time table missing every gauge column.
        let mut df = DataFrame::new(vec![Series::new("time", vec![0i64])]).unwrap();
        let file = File::create(unit.join(TIME_TABLE_FILE)).unwrap();
        ParquetWriter::new(file).finish(&mut df).unwrap();

        let validator = ContinuityValidator::new(&source, &config, &ledger);
        let outcome = validator
            .validate(&units(&["z5500503_20230406_123456_0"]))
            .unwrap();

        assert!(outcome.valid_units.is_empty());
        assert!(ledger.is_excluded_for(
            "z5500503_20230406_123456_0",
            ExclusionReason::MissingColumns
        ));
    }
}
