//! Records flowing through a discovery run.

use chrono::{DateTime, Utc};

use crate::api::{UserRef, UserSummary};

/// Open scan window: both ends are excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl ScanWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Window ending at `to` and spanning `duration` backwards.
    /// `None` when the start falls outside the representable date range.
    pub fn ending_at(to: DateTime<Utc>, duration: chrono::Duration) -> Option<Self> {
        let from = to.checked_sub_signed(duration)?;
        Some(Self { from, to })
    }

    /// `from < t < to`
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t > self.from && t < self.to
    }
}

/// A user found by the scanner, already carrying the access hash needed to moderate them
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub subject_id: i64,
    pub access_token: i64,
    pub event_time: DateTime<Utc>,
    pub profile: UserSummary,
}

impl Candidate {
    pub fn user_ref(&self) -> UserRef {
        UserRef {
            user_id: self.subject_id,
            access_hash: self.access_token,
        }
    }
}

/// A candidate with everything a reviewer needs to decide on a ban
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub subject_id: i64,
    pub access_token: i64,
    pub event_time: DateTime<Utc>,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub language_code: String,
    pub last_message: String,
}

impl EnrichedRecord {
    pub fn from_candidate(candidate: Candidate, last_message: String) -> Self {
        let Candidate {
            subject_id,
            access_token,
            event_time,
            profile,
        } = candidate;
        Self {
            subject_id,
            access_token,
            event_time,
            username: profile.username,
            first_name: profile.first_name,
            last_name: profile.last_name,
            language_code: profile.lang_code,
            last_message,
        }
    }
}

/// Stable sort by event time, oldest first
pub fn sort_by_event_time(records: &mut [EnrichedRecord]) {
    records.sort_by_key(|r| r.event_time);
}
