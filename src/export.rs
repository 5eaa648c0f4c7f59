//! Tab-separated serialization of enriched records.
//!
//! The same layout is read back by `batch` for the moderation run, so the
//! column names here double as the ban file schema.

use chrono::SecondsFormat;
use csv::WriterBuilder;
use std::io::Write;
use tracing::debug;

use crate::record::EnrichedRecord;

pub const DELIMITER: u8 = b'\t';

pub const COL_JOINED: &str = "joined";
pub const COL_USER_ID: &str = "userID";
pub const COL_ACCESS_HASH: &str = "access_hash";

pub const HEADER: [&str; 8] = [
    COL_JOINED,
    COL_USER_ID,
    COL_ACCESS_HASH,
    "username",
    "firstName",
    "lastName",
    "langCode",
    "message",
];

/// Tabs would shift every following column
fn clean(field: &str) -> String {
    field.replace('\t', " ")
}

fn record_row(record: &EnrichedRecord) -> [String; 8] {
    [
        record
            .event_time
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        record.subject_id.to_string(),
        record.access_token.to_string(),
        clean(&record.username),
        clean(&record.first_name),
        clean(&record.last_name),
        clean(&record.language_code),
        clean(&record.last_message),
    ]
}

/// Write the header and one row per record, in the given order
pub fn write_records<W: Write>(writer: W, records: &[EnrichedRecord]) -> csv::Result<()> {
    debug!("Exporting {} records as TSV", records.len());

    let mut wtr = WriterBuilder::new().delimiter(DELIMITER).from_writer(writer);
    wtr.write_record(HEADER)?;
    for record in records {
        wtr.write_record(record_row(record))?;
    }
    wtr.flush()?;
    Ok(())
}
