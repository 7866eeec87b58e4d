//! Batch orchestration: discovery, validation, merge, analysis, publication.
//!
//! The pipeline walks one source directory of recording units and drives the
//! stages in order, keeping unit- and vehicle-level failures out of the
//! batch's way. Validation and merging are sequential per vehicle; analysis
//! fans out across vehicles with bounded concurrency, backing off when the
//! system is under memory pressure.

use crate::aggregate;
use crate::config::PipelineConfig;
use crate::constants::{
    LEDGER_FILE_NAME, TABLE_CLEAN_BY_DAY, TABLE_CLEAN_BY_RUN, TABLE_GLOBAL, TABLE_WASTE_BY_DAY,
    TABLE_WASTE_BY_RUN,
};
use crate::error::{PipelineError, Result};
use crate::events;
use crate::ledger::ExclusionLedger;
use crate::merger::RunMerger;
use crate::missions;
use crate::models::{BatchStats, MergedRun, RecordingUnit};
use crate::smoothing;
use crate::storage::TableStore;
use crate::validator::ContinuityValidator;

use colored::*;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use sysinfo::System;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Directory layout for one batch. Defaults put everything next to the
/// source directory.
#[derive(Debug, Clone)]
pub struct BatchPaths {
    /// Directory holding the recording-unit directories.
    pub source_dir: PathBuf,
    /// Destination for merged runs.
    pub edited_dir: PathBuf,
    /// Exclusion ledger file.
    pub ledger_path: PathBuf,
}

impl BatchPaths {
    /// Derive the sibling layout from a source directory.
    pub fn for_source(source_dir: impl Into<PathBuf>) -> Self {
        let source_dir = source_dir.into();
        let parent = source_dir
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            edited_dir: parent.join("Edited"),
            ledger_path: parent.join(LEDGER_FILE_NAME),
            source_dir,
        }
    }
}

/// One batch run over a source directory.
pub struct BatchPipeline {
    config: Arc<PipelineConfig>,
    paths: BatchPaths,
    system_monitor: Arc<Mutex<System>>,
    memory_threshold: f64,
}

impl BatchPipeline {
    pub fn new(paths: BatchPaths, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        if !paths.source_dir.is_dir() {
            return Err(PipelineError::SourceUnreadable {
                path: paths.source_dir.clone(),
            });
        }
        Ok(Self {
            config: Arc::new(config),
            paths,
            system_monitor: Arc::new(Mutex::new(System::new())),
            memory_threshold: 0.8,
        })
    }

    /// Run the whole batch and publish the result tables.
    pub async fn process(
        &self,
        store: Arc<dyn TableStore>,
        token: CancellationToken,
    ) -> Result<BatchStats> {
        let start_time = Instant::now();
        println!(
            "{}",
            "Starting water-system batch processing".bright_green().bold()
        );
        println!(
            "  {} {}",
            "Source:".bright_cyan(),
            self.paths.source_dir.display()
        );
        println!(
            "  {} {}",
            "Merged runs:".bright_cyan(),
            self.paths.edited_dir.display()
        );

        // Step 1: Discover recording units
        println!("\n{}", "Discovering recording units...".bright_yellow());
        let by_vehicle = self.discover_units().await?;
        let units_seen: usize = by_vehicle.values().map(Vec::len).sum();
        println!(
            "  {} {} unit(s) from {} vehicle(s)",
            "Found".bright_green(),
            units_seen.to_string().bright_white().bold(),
            by_vehicle.len().to_string().bright_white().bold()
        );

        let mut stats = BatchStats {
            units_seen,
            ..Default::default()
        };
        if units_seen == 0 {
            stats.processing_time_ms = start_time.elapsed().as_millis();
            return Ok(stats);
        }

        // Step 2: Validate continuity and structure, writing the ledger
        println!("\n{}", "Validating recording units...".bright_yellow());
        let ledger = ExclusionLedger::create(&self.paths.ledger_path)?;
        let validator =
            ContinuityValidator::new(&self.paths.source_dir, self.config.as_ref(), &ledger);

        let pb = stage_bar(by_vehicle.len() as u64, "Validating vehicles");
        let mut valid_by_vehicle: BTreeMap<String, Vec<RecordingUnit>> = BTreeMap::new();
        for (vehicle, units) in &by_vehicle {
            if token.is_cancelled() {
                return Err(PipelineError::interrupted("validation cancelled"));
            }
            pb.set_message(format!("Validating {}", vehicle));
            let outcome = validator.validate(units)?;
            stats.units_excluded += outcome.units_excluded;
            if !outcome.valid_units.is_empty() {
                valid_by_vehicle.insert(vehicle.clone(), outcome.valid_units);
            }
            pb.inc(1);
        }
        pb.finish_with_message("Validation complete");
        println!(
            "  {} {} unit(s) excluded, see {}",
            "Excluded".bright_green(),
            stats.units_excluded.to_string().bright_white().bold(),
            self.paths.ledger_path.display()
        );

        if self.config.validate_only {
            println!("\n{}", "Validate-only mode - stopping here".bright_green());
            stats.processing_time_ms = start_time.elapsed().as_millis();
            return Ok(stats);
        }

        // Step 3: Merge continuity chains into runs
        println!("\n{}", "Merging split recordings...".bright_yellow());
        let merger = RunMerger::new(&self.paths.source_dir, &self.paths.edited_dir, &ledger);
        let pb = stage_bar(valid_by_vehicle.len() as u64, "Merging vehicles");
        let mut runs_by_vehicle: BTreeMap<String, Vec<MergedRun>> = BTreeMap::new();
        for (vehicle, units) in &valid_by_vehicle {
            if token.is_cancelled() {
                return Err(PipelineError::interrupted("merge cancelled"));
            }
            pb.set_message(format!("Merging {}", vehicle));
            let mut runs = merger.merge_all(units)?;
            runs.sort_by(|a, b| a.destination.cmp(&b.destination));
            stats.runs_merged += runs.len();
            if !runs.is_empty() {
                runs_by_vehicle.insert(vehicle.clone(), runs);
            }
            pb.inc(1);
        }
        pb.finish_with_message("Merge complete");
        println!(
            "  {} {} merged run(s)",
            "Produced".bright_green(),
            stats.runs_merged.to_string().bright_white().bold()
        );

        // Step 4: Analyse vehicles concurrently
        println!("\n{}", "Analysing vehicles...".bright_yellow());
        let mut concurrent_limit = self
            .config
            .max_concurrent_vehicles
            .min(runs_by_vehicle.len().max(1));
        if self.check_memory_pressure().await {
            concurrent_limit = (concurrent_limit / 2).max(1);
            debug!(
                "Memory pressure detected, reducing concurrency to {}",
                concurrent_limit
            );
        }

        let pb = stage_bar(runs_by_vehicle.len() as u64, "Analysing vehicles");
        let jobs: Vec<(String, Vec<MergedRun>)> = runs_by_vehicle.into_iter().collect();
        let (mut frames, vehicles_failed) = stream::iter(jobs)
            .map(|(vehicle, runs)| {
                let config = Arc::clone(&self.config);
                let token = token.clone();
                let pb = pb.clone();
                async move {
                    if token.is_cancelled() {
                        return Err(PipelineError::interrupted("analysis cancelled"));
                    }
                    pb.set_message(format!("Analysing {}", vehicle));
                    let result = task::spawn_blocking({
                        let vehicle = vehicle.clone();
                        move || analyse_vehicle(&vehicle, &runs, &config)
                    })
                    .await
                    .map_err(|e| PipelineError::AnalysisFailed {
                        vehicle: vehicle.clone(),
                        reason: format!("analysis task panicked: {}", e),
                    })?;
                    pb.inc(1);

                    match result {
                        Ok(frame) => Ok((vehicle, frame)),
                        Err(e) => {
                            error!("Analysis failed for vehicle {}: {:#}", vehicle, e);
                            Err(e)
                        }
                    }
                }
            })
            .buffer_unordered(concurrent_limit)
            .fold(
                (Vec::new(), 0usize),
                |(mut frames, failed), result| async move {
                    match result {
                        Ok((vehicle, frame)) => {
                            frames.push((vehicle, frame));
                            (frames, failed)
                        }
                        Err(_) => (frames, failed + 1),
                    }
                },
            )
            .await;
        pb.finish_with_message("Analysis complete");

        if token.is_cancelled() {
            return Err(PipelineError::interrupted("analysis cancelled"));
        }
        stats.vehicles_analysed = frames.len();
        if vehicles_failed > 0 {
            println!(
                "  {} {}",
                "Vehicles failed:".bright_red(),
                vehicles_failed.to_string().bright_red().bold()
            );
        }

        // Deterministic vehicle order regardless of completion order.
        frames.sort_by(|a, b| a.0.cmp(&b.0));
        let frames: Vec<DataFrame> = frames
            .into_iter()
            .filter(|(vehicle, frame)| {
                if frame.height() == 0 {
                    warn!("Vehicle {} produced no in-mission rows", vehicle);
                    false
                } else {
                    true
                }
            })
            .map(|(_, frame)| frame)
            .collect();

        // Step 5: Aggregate and publish
        println!("\n{}", "Publishing result tables...".bright_yellow());
        let mut frames = frames.into_iter();
        let mut global = match frames.next() {
            Some(frame) => frame,
            None => {
                warn!("No vehicle produced analysable data");
                stats.processing_time_ms = start_time.elapsed().as_millis();
                return Ok(stats);
            }
        };
        for frame in frames {
            global.vstack_mut(&frame)?;
        }
        let tables = aggregate::indicator_tables(&global)?;

        stats.rows_published = global.height();
        store.publish(TABLE_GLOBAL, &mut global)?;
        for (name, mut table) in [
            (TABLE_CLEAN_BY_RUN, tables.clean_by_run),
            (TABLE_CLEAN_BY_DAY, tables.clean_by_day),
            (TABLE_WASTE_BY_RUN, tables.waste_by_run),
            (TABLE_WASTE_BY_DAY, tables.waste_by_day),
        ] {
            store.publish(name, &mut table)?;
        }

        let total_time = start_time.elapsed().as_millis();
        println!("\n{}", "Batch Summary".bright_green().bold());
        println!(
            "  {} {}ms",
            "Time elapsed:".bright_cyan(),
            total_time.to_string().bright_white()
        );
        println!(
            "  {} {}/{}",
            "Units excluded:".bright_cyan(),
            stats.units_excluded.to_string().bright_white(),
            stats.units_seen.to_string().bright_white()
        );
        println!(
            "  {} {}",
            "Runs merged:".bright_cyan(),
            stats.runs_merged.to_string().bright_white()
        );
        println!(
            "  {} {}",
            "Vehicles analysed:".bright_cyan(),
            stats.vehicles_analysed.to_string().bright_white()
        );
        println!(
            "  {} {}",
            "Rows published:".bright_cyan(),
            stats.rows_published.to_string().bright_white().bold()
        );

        stats.processing_time_ms = total_time;
        Ok(stats)
    }

    /// List the source directory and parse unit names, grouped per vehicle in
    /// alphabetical (chronological) order. Foreign directories are logged and
    /// skipped, never touched.
    async fn discover_units(&self) -> Result<BTreeMap<String, Vec<RecordingUnit>>> {
        let mut dir =
            fs::read_dir(&self.paths.source_dir)
                .await
                .map_err(|_| PipelineError::SourceUnreadable {
                    path: self.paths.source_dir.clone(),
                })?;

        let mut units = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match RecordingUnit::parse(&name) {
                Ok(unit) => units.push(unit),
                Err(_) => warn!("Skipping foreign directory '{}'", name),
            }
        }
        units.sort_by(|a, b| a.name.cmp(&b.name));

        let mut by_vehicle: BTreeMap<String, Vec<RecordingUnit>> = BTreeMap::new();
        for unit in units {
            by_vehicle.entry(unit.vehicle_id.clone()).or_default().push(unit);
        }
        debug!("Discovered units for {} vehicle(s)", by_vehicle.len());
        Ok(by_vehicle)
    }

    /// Check if system is under memory pressure.
    async fn check_memory_pressure(&self) -> bool {
        let mut system = self.system_monitor.lock().await;
        system.refresh_memory();

        let used_memory = system.used_memory() as f64;
        let total_memory = system.total_memory() as f64;
        if total_memory == 0.0 {
            return false;
        }

        let memory_usage = used_memory / total_memory;
        let is_pressure = memory_usage > self.memory_threshold;
        if is_pressure {
            debug!(
                "Memory pressure detected: {:.1}% usage (threshold: {:.1}%)",
                memory_usage * 100.0,
                self.memory_threshold * 100.0
            );
        }
        is_pressure
    }
}

/// Preprocess, assemble and annotate one vehicle's merged runs. Blocking;
/// runs on the blocking thread pool.
fn analyse_vehicle(
    vehicle: &str,
    runs: &[MergedRun],
    config: &PipelineConfig,
) -> Result<DataFrame> {
    debug!("Analysing vehicle {} ({} run(s))", vehicle, runs.len());

    let mut frames = Vec::with_capacity(runs.len());
    for run in runs {
        let frame =
            smoothing::preprocess_run(run, config).map_err(|e| PipelineError::AnalysisFailed {
                vehicle: vehicle.to_string(),
                reason: format!("preprocessing '{}': {}", run.destination, e),
            })?;
        frames.push(frame);
    }

    let assembled = smoothing::assemble_vehicle(frames)?;
    if assembled.height() == 0 {
        return Ok(assembled);
    }
    let segmented = missions::annotate_mission_runs(assembled)?;
    events::annotate_events(segmented, vehicle, config)
}

fn stage_bar(len: u64, message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message(message);
    pb
}
