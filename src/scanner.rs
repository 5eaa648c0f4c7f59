//! Paginated scanner: walks the member list or the join notices of a channel and
//! feeds in-window candidates into the pipeline.
//!
//! The scanner owns its cursor and hands it back in the `ScanReport`; dropping the
//! sender when `run` returns is what closes the pipeline for the consumer.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::{Channel, GroupApi, SearchQuery};
use crate::cancel::CancelToken;
use crate::config::ScanStrategy;
use crate::filter::{candidate_from_lookup, filter_participants, join_events};
use crate::record::{Candidate, ScanWindow};

#[derive(Debug, Clone)]
pub struct ScanParams {
    pub strategy: ScanStrategy,
    pub window: ScanWindow,
    /// Member-list offset to start from (member listing only)
    pub start_offset: usize,
    pub page_size: usize,
    /// Stop after this many items have been traversed
    pub limit: Option<usize>,
}

impl ScanParams {
    /// Cursor before the first page is requested
    pub fn start_cursor(&self) -> ScanCursor {
        match self.strategy {
            ScanStrategy::MemberListing => ScanCursor::Offset(self.start_offset),
            ScanStrategy::JoinMessages => ScanCursor::MessageId(0),
        }
    }
}

/// Position reached when the scan stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCursor {
    Offset(usize),
    MessageId(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The remote collection returned an empty page
    Exhausted,
    LimitReached,
    Cancelled,
    FetchFailed(String),
    /// The consumer went away; nothing left to feed
    ReceiverClosed,
    /// The scanner task itself died; its own report was lost
    TaskFailed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Exhausted => write!(f, "no more results"),
            StopReason::LimitReached => write!(f, "search limit reached"),
            StopReason::Cancelled => write!(f, "interrupted"),
            StopReason::FetchFailed(e) => write!(f, "fetch failed: {}", e),
            StopReason::ReceiverClosed => write!(f, "consumer closed"),
            StopReason::TaskFailed(e) => write!(f, "scanner task failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub pages: usize,
    pub items_seen: usize,
    pub candidates_sent: usize,
    pub cursor: ScanCursor,
    pub stop: StopReason,
}

impl ScanReport {
    /// Stand-in report for a scanner task that never returned one
    pub fn task_failed(start: ScanCursor, candidates_received: usize, reason: String) -> Self {
        Self {
            pages: 0,
            items_seen: 0,
            candidates_sent: candidates_received,
            cursor: start,
            stop: StopReason::TaskFailed(reason),
        }
    }
}

pub struct Scanner {
    api: Arc<dyn GroupApi>,
    channel: Channel,
    params: ScanParams,
}

/// Mutable scan progress, threaded through the page loop
struct Progress {
    pages: usize,
    items_seen: usize,
    candidates_sent: usize,
}

impl Progress {
    fn new() -> Self {
        Self {
            pages: 0,
            items_seen: 0,
            candidates_sent: 0,
        }
    }

    fn finish(self, cursor: ScanCursor, stop: StopReason) -> ScanReport {
        ScanReport {
            pages: self.pages,
            items_seen: self.items_seen,
            candidates_sent: self.candidates_sent,
            cursor,
            stop,
        }
    }
}

impl Scanner {
    pub fn new(api: Arc<dyn GroupApi>, channel: Channel, params: ScanParams) -> Self {
        Self {
            api,
            channel,
            params,
        }
    }

    /// Run the scan to completion, sending candidates to `tx`.
    pub async fn run(self, tx: mpsc::Sender<Candidate>, cancel: CancelToken) -> ScanReport {
        info!(
            "Looking for users who joined between {} and {} ({:?})",
            self.params.window.from, self.params.window.to, self.params.strategy
        );
        let report = match self.params.strategy {
            ScanStrategy::MemberListing => self.scan_members(&tx, &cancel).await,
            ScanStrategy::JoinMessages => self.scan_join_messages(&tx, &cancel).await,
        };
        info!(
            "Scan finished ({}): {} pages, {} items, {} candidates",
            report.stop, report.pages, report.items_seen, report.candidates_sent
        );
        report
    }

    fn limit_reached(&self, items_seen: usize) -> bool {
        matches!(self.params.limit, Some(limit) if items_seen >= limit)
    }

    async fn scan_members(
        &self,
        tx: &mpsc::Sender<Candidate>,
        cancel: &CancelToken,
    ) -> ScanReport {
        let mut offset = self.params.start_offset;
        let mut progress = Progress::new();

        loop {
            if cancel.is_cancelled() {
                return progress.finish(ScanCursor::Offset(offset), StopReason::Cancelled);
            }
            if self.limit_reached(progress.items_seen) {
                return progress.finish(ScanCursor::Offset(offset), StopReason::LimitReached);
            }

            let page = match self
                .api
                .participants(&self.channel, offset, self.params.page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    error!("Error retrieving members at offset {}: {}", offset, e);
                    return progress.finish(
                        ScanCursor::Offset(offset),
                        StopReason::FetchFailed(e.to_string()),
                    );
                }
            };
            if page.participants.is_empty() {
                return progress.finish(ScanCursor::Offset(offset), StopReason::Exhausted);
            }

            progress.pages += 1;
            progress.items_seen += page.participants.len();
            for candidate in filter_participants(page, &self.params.window) {
                if tx.send(candidate).await.is_err() {
                    warn!("Candidate pipeline closed, stopping scan");
                    return progress.finish(ScanCursor::Offset(offset), StopReason::ReceiverClosed);
                }
                progress.candidates_sent += 1;
            }

            // Relies on the server keeping member order stable between requests
            offset += self.params.page_size;
            info!("Processed {} members", progress.items_seen);
        }
    }

    async fn scan_join_messages(
        &self,
        tx: &mpsc::Sender<Candidate>,
        cancel: &CancelToken,
    ) -> ScanReport {
        let mut offset_id: i64 = 0;
        let mut progress = Progress::new();
        let window = self.params.window;

        loop {
            if cancel.is_cancelled() {
                return progress.finish(ScanCursor::MessageId(offset_id), StopReason::Cancelled);
            }
            if self.limit_reached(progress.items_seen) {
                return progress.finish(ScanCursor::MessageId(offset_id), StopReason::LimitReached);
            }

            let query = SearchQuery {
                min_date: window.from.timestamp(),
                max_date: window.to.timestamp(),
                offset_id,
                limit: self.params.page_size,
            };
            let response = match self.api.search_messages(&self.channel, &query).await {
                Ok(response) => response,
                Err(e) => {
                    error!("Error retrieving messages below id {}: {}", offset_id, e);
                    return progress.finish(
                        ScanCursor::MessageId(offset_id),
                        StopReason::FetchFailed(e.to_string()),
                    );
                }
            };
            let (messages, _) = response.into_parts();
            let Some(last) = messages.last() else {
                return progress.finish(ScanCursor::MessageId(offset_id), StopReason::Exhausted);
            };
            let next_offset_id = last.id();

            progress.pages += 1;
            progress.items_seen += messages.len();
            for event in join_events(&messages, &window) {
                let profile = match self
                    .api
                    .resolve_participant(&self.channel, event.user_id, event.msg_id)
                    .await
                {
                    Ok(profile) => profile,
                    Err(e) => {
                        debug!(
                            "Could not resolve user {} from message {}: {}",
                            event.user_id, event.msg_id, e
                        );
                        continue;
                    }
                };
                let Some(candidate) = candidate_from_lookup(&event, profile) else {
                    debug!("User {} resolved without an access hash, skipping", event.user_id);
                    continue;
                };
                if tx.send(candidate).await.is_err() {
                    warn!("Candidate pipeline closed, stopping scan");
                    return progress
                        .finish(ScanCursor::MessageId(offset_id), StopReason::ReceiverClosed);
                }
                progress.candidates_sent += 1;
            }

            if offset_id != 0 && next_offset_id >= offset_id {
                warn!(
                    "Message search did not move past id {} (got {}), stopping",
                    offset_id, next_offset_id
                );
                return progress
                    .finish(ScanCursor::MessageId(next_offset_id), StopReason::Exhausted);
            }
            offset_id = next_offset_id;
            info!("Processed {} messages", progress.items_seen);
        }
    }
}
