//! Remote group API: the types it returns and the calls the tool makes.
//!
//! Responses are decoded exactly once into the sum types below; the scanner,
//! enricher and moderation executor only ever match on these.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::rate_limit::RetryHint;

pub mod http;

pub use http::HttpGroupApi;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("flood wait of {seconds}s requested by the server")]
    FloodWait { seconds: u64 },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl RetryHint for ApiError {
    fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(e) => !e.is_builder(),
            ApiError::FloodWait { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::NotFound(_) | ApiError::Decode(_) | ApiError::Unexpected(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::FloodWait { seconds } => Some(Duration::from_secs(*seconds)),
            _ => None,
        }
    }
}

/// The supergroup or channel being moderated
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub access_hash: i64,
    #[serde(default)]
    pub title: String,
}

/// Identity plus the long-lived access hash needed to address a user in later calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserRef {
    pub user_id: i64,
    pub access_hash: i64,
}

/// Public profile data of a user as returned alongside pages
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    #[serde(default)]
    pub access_hash: Option<i64>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub lang_code: String,
}

/// A member entry: who, and when they joined (unix seconds)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Participant {
    pub user_id: i64,
    pub date: i64,
}

impl Participant {
    pub fn joined(&self) -> DateTime<Utc> {
        unix_to_utc(self.date)
    }
}

/// One page of the member listing with the user summaries for that page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParticipantsPage {
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub users: Vec<UserSummary>,
}

/// What a service message announces
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceAction {
    ChatAddUser {
        #[serde(default)]
        users: Vec<i64>,
    },
    ChatJoinedByLink,
    ChatJoinedByRequest,
    ChatDeleteUser,
    #[serde(other)]
    Other,
}

impl ServiceAction {
    pub fn is_join(&self) -> bool {
        matches!(
            self,
            ServiceAction::ChatAddUser { .. }
                | ServiceAction::ChatJoinedByLink
                | ServiceAction::ChatJoinedByRequest
        )
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ServiceAction::ChatAddUser { .. } => "joining the channel",
            ServiceAction::ChatJoinedByLink => "joining the channel by invite link",
            ServiceAction::ChatJoinedByRequest => "joining the channel by request",
            ServiceAction::ChatDeleteUser => "leaving the channel",
            ServiceAction::Other => "service message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Text {
        id: i64,
        date: i64,
        #[serde(default)]
        from_id: Option<i64>,
        #[serde(default)]
        text: String,
    },
    Service {
        id: i64,
        date: i64,
        #[serde(default)]
        from_id: Option<i64>,
        action: ServiceAction,
    },
    Empty {
        id: i64,
    },
}

impl Message {
    pub fn id(&self) -> i64 {
        match self {
            Message::Text { id, .. } | Message::Service { id, .. } | Message::Empty { id } => *id,
        }
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        match self {
            Message::Text { date, .. } | Message::Service { date, .. } => Some(unix_to_utc(*date)),
            Message::Empty { .. } => None,
        }
    }

    /// Text shown for a user's most recent message
    pub fn display_text(&self) -> String {
        match self {
            Message::Text { text, .. } => text.clone(),
            Message::Service { action, .. } => format!("[system] {}", action.describe()),
            Message::Empty { .. } => String::new(),
        }
    }
}

/// Result of a message search. Only ever inspected through `into_parts`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagesResponse {
    Messages {
        messages: Vec<Message>,
        #[serde(default)]
        users: Vec<UserSummary>,
    },
    Slice {
        messages: Vec<Message>,
        #[serde(default)]
        users: Vec<UserSummary>,
        count: i64,
    },
    ChannelMessages {
        messages: Vec<Message>,
        #[serde(default)]
        users: Vec<UserSummary>,
        count: i64,
    },
    NotModified {
        #[serde(default)]
        count: i64,
    },
}

impl MessagesResponse {
    pub fn into_parts(self) -> (Vec<Message>, Vec<UserSummary>) {
        match self {
            MessagesResponse::Messages { messages, users }
            | MessagesResponse::Slice { messages, users, .. }
            | MessagesResponse::ChannelMessages { messages, users, .. } => (messages, users),
            MessagesResponse::NotModified { .. } => (Vec::new(), Vec::new()),
        }
    }
}

/// Message search parameters; the server applies the date range itself
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchQuery {
    pub min_date: i64,
    pub max_date: i64,
    /// Continue below this message id; 0 starts from the newest
    pub offset_id: i64,
    pub limit: usize,
}

/// Rights removed from a banned user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BannedRights {
    pub view_messages: bool,
    pub send_messages: bool,
    pub send_media: bool,
    pub send_stickers: bool,
    pub send_gifs: bool,
    pub send_games: bool,
    pub send_inline: bool,
    pub embed_links: bool,
    pub send_polls: bool,
    pub change_info: bool,
    pub invite_users: bool,
    pub pin_messages: bool,
    /// 0 means forever
    pub until_date: i64,
}

impl BannedRights {
    /// Every right denied, no expiry
    pub fn permanent() -> Self {
        Self {
            view_messages: true,
            send_messages: true,
            send_media: true,
            send_stickers: true,
            send_gifs: true,
            send_games: true,
            send_inline: true,
            embed_links: true,
            send_polls: true,
            change_info: true,
            invite_users: true,
            pin_messages: true,
            until_date: 0,
        }
    }
}

#[async_trait]
pub trait GroupApi: Send + Sync {
    async fn resolve_channel(&self, channel_id: i64) -> Result<Channel, ApiError>;

    async fn participants(
        &self,
        channel: &Channel,
        offset: usize,
        limit: usize,
    ) -> Result<ParticipantsPage, ApiError>;

    async fn search_messages(
        &self,
        channel: &Channel,
        query: &SearchQuery,
    ) -> Result<MessagesResponse, ApiError>;

    /// Look up a member as seen in a specific message, yielding their access hash
    async fn resolve_participant(
        &self,
        channel: &Channel,
        user_id: i64,
        msg_id: i64,
    ) -> Result<UserSummary, ApiError>;

    async fn last_message(
        &self,
        channel: &Channel,
        user: &UserRef,
    ) -> Result<Option<Message>, ApiError>;

    async fn delete_history(&self, channel: &Channel, user: &UserRef) -> Result<(), ApiError>;

    async fn ban(
        &self,
        channel: &Channel,
        user: &UserRef,
        rights: &BannedRights,
    ) -> Result<(), ApiError>;
}

pub fn unix_to_utc(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}
