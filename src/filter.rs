//! Time-window filtering of scanned pages and the join against each page's user summaries.

use std::collections::HashMap;
use tracing::debug;

use crate::api::{unix_to_utc, Message, ParticipantsPage, ServiceAction, UserSummary};
use crate::record::{Candidate, ScanWindow};

/// A join notice inside the window that still needs its access hash resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinEvent {
    pub user_id: i64,
    pub msg_id: i64,
    pub date: chrono::DateTime<chrono::Utc>,
}

/// Keep in-window members of a listing page, attaching the page's summary for each.
///
/// Members without a summary, or whose summary carries no access hash, are dropped:
/// nothing could be done with them in the moderation run.
pub fn filter_participants(page: ParticipantsPage, window: &ScanWindow) -> Vec<Candidate> {
    let mut summaries: HashMap<i64, UserSummary> =
        page.users.into_iter().map(|u| (u.id, u)).collect();

    let mut candidates = Vec::new();
    for participant in page.participants {
        let joined = participant.joined();
        if !window.contains(joined) {
            continue;
        }
        let Some(profile) = summaries.remove(&participant.user_id) else {
            debug!("No user summary on page for member {}, skipping", participant.user_id);
            continue;
        };
        let Some(access_token) = profile.access_hash else {
            debug!("Member {} has no access hash, skipping", participant.user_id);
            continue;
        };
        candidates.push(Candidate {
            subject_id: participant.user_id,
            access_token,
            event_time: joined,
            profile,
        });
    }
    candidates
}

/// Join notices inside the window, in page order, one per joining user
pub fn join_events(messages: &[Message], window: &ScanWindow) -> Vec<JoinEvent> {
    let mut events = Vec::new();
    for message in messages {
        let Message::Service {
            id,
            date,
            from_id,
            action,
        } = message
        else {
            continue;
        };
        if !action.is_join() {
            continue;
        }
        let date = unix_to_utc(*date);
        if !window.contains(date) {
            continue;
        }

        let subjects: Vec<i64> = match action {
            ServiceAction::ChatAddUser { users } if !users.is_empty() => users.clone(),
            _ => from_id.iter().copied().collect(),
        };
        events.extend(subjects.into_iter().map(|user_id| JoinEvent {
            user_id,
            msg_id: *id,
            date,
        }));
    }
    events
}

/// Build a candidate from a join notice and the point lookup made for it
pub fn candidate_from_lookup(event: &JoinEvent, profile: UserSummary) -> Option<Candidate> {
    let access_token = profile.access_hash?;
    Some(Candidate {
        subject_id: event.user_id,
        access_token,
        event_time: event.date,
        profile,
    })
}
