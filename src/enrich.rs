//! Enricher: completes each candidate with its most recent message.

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{Channel, GroupApi};
use crate::record::{Candidate, EnrichedRecord};

const PREVIEW_LIMIT: usize = 50;
const PREVIEW_KEEP: usize = 45;

pub struct Enricher {
    api: Arc<dyn GroupApi>,
    channel: Channel,
    fetch_messages: bool,
}

impl Enricher {
    pub fn new(api: Arc<dyn GroupApi>, channel: Channel, fetch_messages: bool) -> Self {
        Self {
            api,
            channel,
            fetch_messages,
        }
    }

    /// Build the full record for one candidate. Lookup failures leave the message empty.
    pub async fn enrich(&self, candidate: Candidate) -> EnrichedRecord {
        let last_message = if self.fetch_messages {
            self.lookup_last_message(&candidate).await
        } else {
            String::new()
        };

        let record = EnrichedRecord::from_candidate(candidate, last_message);
        log_record(&record);
        record
    }

    async fn lookup_last_message(&self, candidate: &Candidate) -> String {
        match self.api.last_message(&self.channel, &candidate.user_ref()).await {
            Ok(Some(message)) => message.display_text(),
            Ok(None) => {
                info!("User {}: no message found", candidate.subject_id);
                String::new()
            }
            Err(e) => {
                warn!(
                    "User {}: error looking up last message: {}",
                    candidate.subject_id, e
                );
                String::new()
            }
        }
    }
}

fn log_record(record: &EnrichedRecord) {
    info!("{}", record_line(record));
}

/// Console line for a found user; the `@handle` part only when they have one
pub fn record_line(record: &EnrichedRecord) -> String {
    let mut line = if record.username.is_empty() {
        format!(
            "{} {} joined {}",
            record.first_name, record.last_name, record.event_time
        )
    } else {
        format!(
            "@{} ({} {}) joined {}",
            record.username, record.first_name, record.last_name, record.event_time
        )
    };
    if !record.last_message.is_empty() {
        line.push_str(": ");
        line.push_str(&message_preview(&record.last_message));
    }
    line
}

/// One-line preview of a message for the console
pub fn message_preview(text: &str) -> String {
    let flat = text.replace(['\r', '\n'], " ");
    if flat.chars().count() > PREVIEW_LIMIT {
        let kept: String = flat.chars().take(PREVIEW_KEEP).collect();
        format!("{}... (truncated)", kept)
    } else {
        flat
    }
}
