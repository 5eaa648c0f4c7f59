// checkpoint.rs - Resume support for interrupted moderation runs
//
// The ban file itself is the checkpoint: when a run is interrupted the rows not
// yet processed are written back over the input path, so rerunning the same
// command picks up where the previous run stopped.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::batch::{write_ban_table, BanTask};

/// Temporary file the remainder is staged in before it replaces `path`
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("banhammer"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with the header plus `remaining` rows using an atomic write
/// (write to temp file, fsync, then rename over the original)
pub fn save_remainder(path: &Path, header: &[u8], remaining: &[BanTask]) -> Result<()> {
    let temp_path = temp_path_for(path);

    {
        let file = File::create(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        let mut writer = BufWriter::new(file);
        write_ban_table(&mut writer, header, remaining)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        let file = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .context("Failed to flush remainder")?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    info!(
        "Saved {} unprocessed entries to {}",
        remaining.len(),
        path.display()
    );
    Ok(())
}
