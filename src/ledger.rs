//! Durable, append-only record of excluded recording units.
//!
//! The ledger is a plain-text file: four reserved header lines, then one
//! `"<unit name>: <reason>"` line per exclusion. It is both a log for humans
//! and the authority downstream stages query to skip rejected data. Entries
//! are never removed; re-adding an existing (unit, reason) pair is a no-op.

use crate::constants::{LEDGER_HEADER, LEDGER_HEADER_LINES};
use crate::error::{PipelineError, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Why a recording unit was excluded from the batch. A unit may carry several
/// reasons; any one of them removes it from the merge set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExclusionReason {
    /// Naming-sequence break, or cascade from a broken chain.
    Continuity,
    /// Time-table or context file absent or unreadable.
    MissingFiles,
    /// Time table lacks a required column.
    MissingColumns,
    /// Context file declares an unsupported format version.
    VersionMismatch,
    /// Concatenation or write failure during merge.
    SchemaMergeFailure,
}

impl ExclusionReason {
    /// Wire word written to the ledger file.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionReason::Continuity => "continuity",
            ExclusionReason::MissingFiles => "missing file(s)",
            ExclusionReason::MissingColumns => "missing column(s)",
            ExclusionReason::VersionMismatch => "version",
            ExclusionReason::SchemaMergeFailure => "schema",
        }
    }

    /// Parse a wire word back into a reason.
    pub fn from_wire(word: &str) -> Option<Self> {
        match word {
            "continuity" => Some(ExclusionReason::Continuity),
            "missing file(s)" => Some(ExclusionReason::MissingFiles),
            "missing column(s)" => Some(ExclusionReason::MissingColumns),
            "version" => Some(ExclusionReason::VersionMismatch),
            "schema" => Some(ExclusionReason::SchemaMergeFailure),
            _ => None,
        }
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct LedgerState {
    file: File,
    entries: BTreeSet<(String, ExclusionReason)>,
}

/// File-backed exclusion ledger. Writes are serialized behind a mutex; reads
/// take a snapshot of the in-memory entry set.
pub struct ExclusionLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl ExclusionLedger {
    /// Create a fresh ledger, truncating any previous file and writing the
    /// header. Used at validator start.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut file = File::create(&path).map_err(|e| PipelineError::LedgerUnusable {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        file.write_all(LEDGER_HEADER.as_bytes())?;
        debug!("Created exclusion ledger at {}", path.display());

        let file = OpenOptions::new().append(true).open(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(LedgerState {
                file,
                entries: BTreeSet::new(),
            }),
        })
    }

    /// Open an existing ledger and load its entries, skipping the header.
    /// Lines that do not parse are logged and ignored.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let reader =
            BufReader::new(
                File::open(&path).map_err(|e| PipelineError::LedgerUnusable {
                    path: path.clone(),
                    reason: e.to_string(),
                })?,
            );

        let mut entries = BTreeSet::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if number < LEDGER_HEADER_LINES || line.trim().is_empty() {
                continue;
            }
            match parse_entry(&line) {
                Some(entry) => {
                    entries.insert(entry);
                }
                None => warn!(
                    "Skipping unparseable ledger line {} in {}: '{}'",
                    number + 1,
                    path.display(),
                    line
                ),
            }
        }

        let file = OpenOptions::new().append(true).open(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(LedgerState { file, entries }),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an exclusion. Appends to the file unless the (unit, reason)
    /// pair is already present.
    pub fn add(&self, unit_name: &str, reason: ExclusionReason) -> Result<()> {
        let mut state = self.state.lock().expect("ledger mutex poisoned");
        let entry = (unit_name.to_string(), reason);
        if state.entries.contains(&entry) {
            return Ok(());
        }
        writeln!(state.file, "{}: {}", unit_name, reason)?;
        state.file.flush()?;
        state.entries.insert(entry);
        debug!("Excluded '{}': {}", unit_name, reason);
        Ok(())
    }

    /// Is this unit excluded for any reason?
    pub fn is_excluded(&self, unit_name: &str) -> bool {
        let state = self.state.lock().expect("ledger mutex poisoned");
        state.entries.iter().any(|(name, _)| name == unit_name)
    }

    /// Is this unit excluded for one specific reason?
    pub fn is_excluded_for(&self, unit_name: &str, reason: ExclusionReason) -> bool {
        let state = self.state.lock().expect("ledger mutex poisoned");
        state.entries.contains(&(unit_name.to_string(), reason))
    }

    /// Snapshot of all excluded unit names, deduplicated, in ledger order.
    pub fn excluded_names(&self) -> Vec<String> {
        let state = self.state.lock().expect("ledger mutex poisoned");
        let mut names: Vec<String> = state.entries.iter().map(|(name, _)| name.clone()).collect();
        names.dedup();
        names
    }

    /// Number of distinct excluded units.
    pub fn excluded_count(&self) -> usize {
        self.excluded_names().len()
    }
}

/// Parse one `"<name>: <reason>"` line. The reason is everything after the
/// last `": "`, so unit names containing colons would still round-trip.
fn parse_entry(line: &str) -> Option<(String, ExclusionReason)> {
    let (name, word) = line.rsplit_once(": ")?;
    let reason = ExclusionReason::from_wire(word.trim())?;
    Some((name.to_string(), reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_in(dir: &TempDir) -> ExclusionLedger {
        ExclusionLedger::create(dir.path().join("parquet_exclusion.txt")).unwrap()
    }

    #[test]
    fn create_writes_header() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let content = std::fs::read_to_string(ledger.path()).unwrap();
        assert!(content.starts_with("Parquet folder exclusion list\n"));
        assert_eq!(content.lines().count(), LEDGER_HEADER_LINES);
    }

    #[test]
    fn add_is_idempotent_per_reason() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);

        ledger
            .add("z5500503_20230406_123456_1", ExclusionReason::Continuity)
            .unwrap();
        ledger
            .add("z5500503_20230406_123456_1", ExclusionReason::Continuity)
            .unwrap();
        ledger
            .add("z5500503_20230406_123456_1", ExclusionReason::MissingFiles)
            .unwrap();

        let content = std::fs::read_to_string(ledger.path()).unwrap();
        let entries: Vec<&str> = content.lines().skip(LEDGER_HEADER_LINES).collect();
        assert_eq!(
            entries,
            vec![
                "z5500503_20230406_123456_1: continuity",
                "z5500503_20230406_123456_1: missing file(s)",
            ]
        );
        assert_eq!(ledger.excluded_count(), 1);
    }

    #[test]
    fn load_round_trips_entries() {
        let dir = TempDir::new().unwrap();
        let path = {
            let ledger = ledger_in(&dir);
            ledger
                .add("z5500503_20230406_123456_2", ExclusionReason::VersionMismatch)
                .unwrap();
            ledger.path().to_path_buf()
        };

        let reloaded = ExclusionLedger::load(&path).unwrap();
        assert!(reloaded.is_excluded("z5500503_20230406_123456_2"));
        assert!(reloaded.is_excluded_for(
            "z5500503_20230406_123456_2",
            ExclusionReason::VersionMismatch
        ));
        assert!(!reloaded.is_excluded("z5500503_20230406_123456_0"));
    }

    #[test]
    fn load_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("parquet_exclusion.txt");
        let mut content = LEDGER_HEADER.to_string();
        content.push_str("not a ledger line\n");
        content.push_str("z5500503_20230406_123456_3: continuity\n");
        std::fs::write(&path, content).unwrap();

        let ledger = ExclusionLedger::load(&path).unwrap();
        assert_eq!(ledger.excluded_count(), 1);
    }
}
