//! Merging split recording chains into single runs.
//!
//! A chain is a maximal sequence of validated units whose split indices count
//! up from the previous unit; every chain becomes one destination directory
//! `<vehicle>_<date>_<time>_0T<k-1>` holding one concatenated time table and
//! one concatenated context file, both gzip-compressed Parquet. A chain that
//! fails to merge is written to the ledger and skipped; the batch carries on.

use crate::constants::{CONTEXT_FILE, TIME_TABLE_FILE};
use crate::error::Result;
use crate::ledger::{ExclusionLedger, ExclusionReason};
use crate::models::{MergedRun, RecordingUnit};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Group an ordered, validated unit list into continuity chains. A unit
/// extends the current chain when its split index is the successor of the
/// previous unit's; any other unit starts a new chain.
pub fn plan_chains(units: &[RecordingUnit]) -> Vec<Vec<RecordingUnit>> {
    let mut chains: Vec<Vec<RecordingUnit>> = Vec::new();
    for unit in units {
        match chains.last_mut() {
            Some(chain)
                if chain
                    .last()
                    .is_some_and(|previous| unit.split_index == previous.split_index + 1) =>
            {
                chain.push(unit.clone());
            }
            _ => chains.push(vec![unit.clone()]),
        }
    }
    chains
}

struct MergeProblem {
    offender: String,
    reason: String,
}

/// Merges validated units from a source root into a destination root.
pub struct RunMerger<'a> {
    source_dir: &'a Path,
    dest_dir: &'a Path,
    ledger: &'a ExclusionLedger,
}

impl<'a> RunMerger<'a> {
    pub fn new(source_dir: &'a Path, dest_dir: &'a Path, ledger: &'a ExclusionLedger) -> Self {
        Self {
            source_dir,
            dest_dir,
            ledger,
        }
    }

    /// Merge every chain in the ordered unit list. Chain-level failures are
    /// recorded in the ledger and skipped; only ledger and destination-root
    /// I/O errors surface.
    pub fn merge_all(&self, units: &[RecordingUnit]) -> Result<Vec<MergedRun>> {
        fs::create_dir_all(self.dest_dir)?;

        let mut runs = Vec::new();
        for chain in plan_chains(units) {
            match self.merge_chain(&chain) {
                Ok(run) => {
                    debug!(
                        "Merged {} unit(s) into '{}'",
                        run.members.len(),
                        run.destination
                    );
                    runs.push(run);
                }
                Err(problem) => {
                    warn!(
                        "Merge failed at '{}': {}; chain of {} unit(s) skipped",
                        problem.offender,
                        problem.reason,
                        chain.len()
                    );
                    self.ledger
                        .add(&problem.offender, ExclusionReason::SchemaMergeFailure)?;
                }
            }
        }
        Ok(runs)
    }

    fn merge_chain(&self, chain: &[RecordingUnit]) -> std::result::Result<MergedRun, MergeProblem> {
        let head = &chain[0];
        let destination = format!(
            "{}_{}_{}_0T{}",
            head.vehicle_id,
            head.date,
            head.time,
            chain.len() - 1
        );
        let dest_path = self.dest_dir.join(&destination);

        let outcome = self.write_destination(chain, &dest_path);
        if outcome.is_err() {
            // Never leave a partial destination behind.
            if let Err(e) = fs::remove_dir_all(&dest_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "Could not remove partial destination '{}': {}",
                        dest_path.display(),
                        e
                    );
                }
            }
        }
        outcome?;

        Ok(MergedRun {
            destination,
            dest_path,
            members: chain.to_vec(),
        })
    }

    fn write_destination(
        &self,
        chain: &[RecordingUnit],
        dest_path: &Path,
    ) -> std::result::Result<(), MergeProblem> {
        let head = &chain[0];
        fs::create_dir_all(dest_path).map_err(|e| MergeProblem {
            offender: head.name.clone(),
            reason: e.to_string(),
        })?;

        for file_name in [TIME_TABLE_FILE, CONTEXT_FILE] {
            if chain.len() == 1 {
                let from = self.source_dir.join(&head.name).join(file_name);
                fs::copy(&from, dest_path.join(file_name)).map_err(|e| MergeProblem {
                    offender: head.name.clone(),
                    reason: format!("copying {}: {}", file_name, e),
                })?;
                continue;
            }

            let head_path = self.source_dir.join(&head.name).join(file_name);
            let mut merged = read_parquet(&head_path).map_err(|e| MergeProblem {
                offender: head.name.clone(),
                reason: format!("reading {}: {}", file_name, e),
            })?;
            for unit in &chain[1..] {
                let path = self.source_dir.join(&unit.name).join(file_name);
                let df = read_parquet(&path).map_err(|e| MergeProblem {
                    offender: unit.name.clone(),
                    reason: format!("reading {}: {}", file_name, e),
                })?;
                merged.vstack_mut(&df).map_err(|e| MergeProblem {
                    offender: unit.name.clone(),
                    reason: format!("stacking {}: {}", file_name, e),
                })?;
            }

            write_parquet(&dest_path.join(file_name), &mut merged).map_err(|e| MergeProblem {
                offender: head.name.clone(),
                reason: format!("writing {}: {}", file_name, e),
            })?;
        }
        Ok(())
    }
}

fn read_parquet(path: &PathBuf) -> PolarsResult<DataFrame> {
    ParquetReader::new(File::open(path).map_err(PolarsError::from)?).finish()
}

fn write_parquet(path: &Path, df: &mut DataFrame) -> PolarsResult<()> {
    let file = File::create(path).map_err(PolarsError::from)?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Gzip(None))
        .finish(df)?;
    Ok(())
}
