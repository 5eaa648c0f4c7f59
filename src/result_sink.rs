// result_sink.rs - Collects enriched records and writes the dated results table
//
// Records are buffered in memory for the whole discovery run, sorted once by
// join time and written in one go. If the output file cannot be written the
// same table goes to stdout so a finished scan is never lost.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::export::write_records;
use crate::record::{sort_by_event_time, EnrichedRecord};

const FILE_PREFIX: &str = "banhammer-";
const FILE_SUFFIX: &str = ".users.csv";

/// Where the results ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    File(PathBuf),
    Stdout,
}

#[derive(Debug, Default)]
pub struct ResultSink {
    records: Vec<EnrichedRecord>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EnrichedRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sort and write everything to `path`, falling back to stdout.
    ///
    /// Only a failure to write stdout as well is returned as an error.
    pub fn finish(mut self, path: &Path) -> Result<SinkTarget> {
        sort_by_event_time(&mut self.records);
        if self.records.is_empty() {
            info!("No users found in the search window");
        }

        match write_file(path, &self.records) {
            Ok(()) => {
                info!("Wrote {} users to {}", self.records.len(), path.display());
                Ok(SinkTarget::File(path.to_path_buf()))
            }
            Err(e) => {
                warn!("Could not write {}: {:#}. Writing results to stdout", path.display(), e);
                let stdout = io::stdout();
                write_records(stdout.lock(), &self.records)
                    .context("Failed to write results to stdout")?;
                Ok(SinkTarget::Stdout)
            }
        }
    }

    pub fn records(&self) -> &[EnrichedRecord] {
        &self.records
    }
}

fn write_file(path: &Path, records: &[EnrichedRecord]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create results file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_records(&mut writer, records)?;
    writer.flush()?;
    Ok(())
}

/// `banhammer-<YYYY-MM-DDTHH-MM-SS>.users.csv`
pub fn output_file_name(started: DateTime<Local>) -> String {
    format!(
        "{}{}{}",
        FILE_PREFIX,
        started.format("%Y-%m-%dT%H-%M-%S"),
        FILE_SUFFIX
    )
}

/// Create the results directory if needed. An existing non-directory path is an error.
pub fn ensure_results_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            bail!("{} exists but is not a directory", dir.display());
        }
        return Ok(());
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create results directory: {}", dir.display()))
}

/// Dated output path inside `dir`, creating `dir` when missing
pub fn results_path(dir: &Path, started: DateTime<Local>) -> Result<PathBuf> {
    ensure_results_dir(dir)?;
    Ok(dir.join(output_file_name(started)))
}
