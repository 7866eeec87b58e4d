//! Publication of result tables.
//!
//! The publication contract mirrors a relational sink: ensure the table
//! exists, truncate it, insert the batch. The shipping implementation writes
//! one gzip Parquet file per table under an output directory; the trait seam
//! keeps the pipeline indifferent to where tables land.

use crate::error::Result;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sink for named result tables. Publishing replaces the table's previous
/// contents wholesale.
pub trait TableStore: Send + Sync {
    /// Ensure the table exists, empty or not.
    fn create_table(&self, name: &str) -> Result<()>;

    /// Drop the table's current rows.
    fn truncate(&self, name: &str) -> Result<()>;

    /// Append the frame's rows to the table.
    fn insert(&self, name: &str, df: &mut DataFrame) -> Result<()>;

    /// Replace the table with this frame.
    fn publish(&self, name: &str, df: &mut DataFrame) -> Result<()> {
        self.create_table(name)?;
        self.truncate(name)?;
        self.insert(name, df)
    }
}

/// Table store writing one `<name>.parquet` per table under a root directory.
pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File backing one table.
    pub fn table_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.parquet"))
    }
}

impl TableStore for ParquetStore {
    fn create_table(&self, _name: &str) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn truncate(&self, name: &str) -> Result<()> {
        let path = self.table_path(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Truncated table '{}'", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn insert(&self, name: &str, df: &mut DataFrame) -> Result<()> {
        let path = self.table_path(name);
        let file = File::create(&path)?;
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Gzip(None))
            .finish(df)?;
        info!(
            "Published {} row(s) to table '{}' at {}",
            df.height(),
            name,
            path.display()
        );
        Ok(())
    }
}

/// Read a published table back. Test and inspection helper.
pub fn read_table(store: &ParquetStore, name: &str) -> Result<DataFrame> {
    let df = ParquetReader::new(File::open(store.table_path(name))?).finish()?;
    Ok(df)
}
