use chrono::{TimeZone, Utc};
use std::path::{Path, PathBuf};

use banhammer::export::write_records;
use banhammer::EnrichedRecord;

pub const HEADER: &str = "joined\tuserID\taccess_hash\tusername\tfirstName\tlastName\tlangCode\tmessage";

pub fn record(id: i64, joined: i64) -> EnrichedRecord {
    EnrichedRecord {
        subject_id: id,
        access_token: id * 1000,
        event_time: Utc.timestamp_opt(joined, 0).unwrap(),
        username: format!("user{}", id),
        first_name: format!("First{}", id),
        last_name: format!("Last{}", id),
        language_code: "en".to_string(),
        last_message: format!("hello from {}", id),
    }
}

/// Write a ban file for users `1..=n` the way a discovery run would
pub fn write_ban_file(dir: &Path, n: i64) -> PathBuf {
    let records: Vec<EnrichedRecord> = (1..=n).map(|id| record(id, 1_700_000_000 + id)).collect();
    let path = dir.join("ban.users.csv");
    let file = std::fs::File::create(&path).unwrap();
    write_records(file, &records).unwrap();
    path
}

/// Write raw table rows under the standard header
pub fn write_raw_ban_file(dir: &Path, rows: &[&str]) -> PathBuf {
    let mut content = String::from(HEADER);
    content.push('\n');
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    let path = dir.join("raw.users.csv");
    std::fs::write(&path, content).unwrap();
    path
}
