//! Ban file parsing for the moderation run
//!
//! A ban file is the tab-separated table written by a discovery run, possibly
//! edited by hand. Only the user id and access hash columns are interpreted;
//! every row is also kept as the exact bytes it was read from so an
//! interrupted run can write the unprocessed rows back unchanged.

use anyhow::{bail, Context, Result};
use csv::{ByteRecord, ReaderBuilder};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

use crate::api::UserRef;
use crate::export::{COL_ACCESS_HASH, COL_USER_ID, DELIMITER};

/// Column positions used when the header does not name them
const FALLBACK_USER_ID_COL: usize = 1;
const FALLBACK_ACCESS_HASH_COL: usize = 2;

/// One entry of a ban file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanTask {
    pub user: UserRef,
    /// Row as read, without its line terminator
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanFile {
    /// Header row as read, without its line terminator
    pub header: Vec<u8>,
    pub tasks: Vec<BanTask>,
    /// Rows dropped because their id or hash could not be parsed
    pub skipped: usize,
}

/// Read and parse a ban file. Any I/O error is fatal for the run.
pub fn read_ban_file(path: &Path) -> Result<BanFile> {
    let data = fs::read(path)
        .with_context(|| format!("Failed to read ban file: {}", path.display()))?;
    parse_ban_table(&data).with_context(|| format!("Invalid ban file: {}", path.display()))
}

pub fn parse_ban_table(data: &[u8]) -> Result<BanFile> {
    let mut reader = ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut record = ByteRecord::new();
    let mut start = reader.position().byte();
    if !reader.read_byte_record(&mut record)? {
        bail!("file has no header row");
    }
    let mut end = reader.position().byte();
    let header = raw_line(data, start, end);

    let user_id_col = find_column(&record, COL_USER_ID).unwrap_or(FALLBACK_USER_ID_COL);
    let access_hash_col =
        find_column(&record, COL_ACCESS_HASH).unwrap_or(FALLBACK_ACCESS_HASH_COL);
    debug!(
        "Ban file columns: {} at {}, {} at {}",
        COL_USER_ID, user_id_col, COL_ACCESS_HASH, access_hash_col
    );

    let mut tasks = Vec::new();
    let mut skipped = 0;
    let mut row = 1;
    loop {
        start = end;
        if !reader.read_byte_record(&mut record)? {
            break;
        }
        end = reader.position().byte();
        row += 1;

        let user_id = parse_field(&record, user_id_col);
        let access_hash = parse_field(&record, access_hash_col);
        match (user_id, access_hash) {
            (Some(user_id), Some(access_hash)) => tasks.push(BanTask {
                user: UserRef {
                    user_id,
                    access_hash,
                },
                raw: raw_line(data, start, end),
            }),
            _ => {
                warn!(
                    "Skipping row {}: invalid {} or {} value",
                    row, COL_USER_ID, COL_ACCESS_HASH
                );
                skipped += 1;
            }
        }
    }

    Ok(BanFile {
        header,
        tasks,
        skipped,
    })
}

/// Write the header followed by `tasks`, one row per line
pub fn write_ban_table<W: Write>(
    mut writer: W,
    header: &[u8],
    tasks: &[BanTask],
) -> std::io::Result<()> {
    writer.write_all(header)?;
    writer.write_all(b"\n")?;
    for task in tasks {
        writer.write_all(&task.raw)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

fn find_column(header: &ByteRecord, name: &str) -> Option<usize> {
    header
        .iter()
        .position(|field| trim_ascii(field) == name.as_bytes())
}

fn parse_field(record: &ByteRecord, index: usize) -> Option<i64> {
    let field = record.get(index)?;
    std::str::from_utf8(trim_ascii(field)).ok()?.parse().ok()
}

/// Bytes between two reader positions, minus surrounding line terminators
/// and any blank lines the reader skipped over
fn raw_line(data: &[u8], start: u64, end: u64) -> Vec<u8> {
    let start = (start as usize).min(data.len());
    let end = (end as usize).clamp(start, data.len());
    let is_eol = |b: &u8| *b == b'\r' || *b == b'\n';

    let slice = &data[start..end];
    let first = slice.iter().position(|b| !is_eol(b)).unwrap_or(slice.len());
    let last = slice.iter().rposition(|b| !is_eol(b)).map_or(first, |i| i + 1);
    slice[first..last.max(first)].to_vec()
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let is_space = |b: &u8| b.is_ascii_whitespace();
    let first = bytes.iter().position(|b| !is_space(b)).unwrap_or(bytes.len());
    let last = bytes.iter().rposition(|b| !is_space(b)).map_or(first, |i| i + 1);
    &bytes[first..last.max(first)]
}
