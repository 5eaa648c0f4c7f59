//! In-memory `GroupApi` for pipeline and executor tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use banhammer::api::{
    ApiError, BannedRights, Channel, GroupApi, Message, MessagesResponse, Participant,
    ParticipantsPage, SearchQuery, UserRef, UserSummary,
};
use banhammer::CancelToken;

/// A recorded moderation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DeleteHistory(i64),
    Ban(i64),
}

#[derive(Default)]
pub struct FakeGroupApi {
    pub channel: Option<Channel>,
    /// Full member list in server order
    pub members: Vec<(Participant, UserSummary)>,
    /// Message history, newest first
    pub messages: Vec<Message>,
    /// Users `resolve_participant` knows about
    pub resolvable: HashMap<i64, UserSummary>,
    pub last_messages: HashMap<i64, Message>,
    pub last_message_errors: HashSet<i64>,
    pub fail_delete: HashSet<i64>,
    pub fail_ban: HashSet<i64>,
    /// Fail the member page fetched at this offset
    pub fail_members_at: Option<usize>,
    /// Panic while serving the member page at this offset
    pub panic_members_at: Option<usize>,
    /// Cancel this token once this many pages have been served
    pub cancel_after_pages: Option<(usize, CancelToken)>,
    /// Cancel this token once this many ban calls have been made
    pub cancel_after_bans: Option<(usize, CancelToken)>,
    /// `last_message` waits for a permit from this gate
    pub message_gate: Option<Arc<Semaphore>>,

    pub offsets_requested: Mutex<Vec<usize>>,
    pub searches: Mutex<Vec<SearchQuery>>,
    pub lookups: Mutex<Vec<(i64, i64)>>,
    pub message_lookups: Mutex<Vec<i64>>,
    pub calls: Mutex<Vec<Call>>,
    pages_served: Mutex<usize>,
}

pub fn channel() -> Channel {
    Channel {
        id: 1001,
        access_hash: 77,
        title: "test group".to_string(),
    }
}

pub fn summary(id: i64) -> UserSummary {
    UserSummary {
        id,
        access_hash: Some(id * 1000),
        username: format!("user{}", id),
        first_name: format!("First{}", id),
        last_name: format!("Last{}", id),
        lang_code: "en".to_string(),
    }
}

pub fn member(id: i64, joined: i64) -> (Participant, UserSummary) {
    (Participant { user_id: id, date: joined }, summary(id))
}

pub fn join_message(msg_id: i64, date: i64, user_id: i64) -> Message {
    Message::Service {
        id: msg_id,
        date,
        from_id: Some(user_id),
        action: banhammer::api::ServiceAction::ChatJoinedByLink,
    }
}

pub fn text_message(msg_id: i64, date: i64, user_id: i64, text: &str) -> Message {
    Message::Text {
        id: msg_id,
        date,
        from_id: Some(user_id),
        text: text.to_string(),
    }
}

impl FakeGroupApi {
    pub fn new() -> Self {
        Self {
            channel: Some(channel()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn banned(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Ban(id) => Some(id),
                Call::DeleteHistory(_) => None,
            })
            .collect()
    }

    pub fn offsets(&self) -> Vec<usize> {
        self.offsets_requested.lock().unwrap().clone()
    }

    fn page_served(&self) {
        let mut served = self.pages_served.lock().unwrap();
        *served += 1;
        if let Some((after, token)) = &self.cancel_after_pages {
            if *served >= *after {
                token.cancel();
            }
        }
    }
}

#[async_trait]
impl GroupApi for FakeGroupApi {
    async fn resolve_channel(&self, channel_id: i64) -> Result<Channel, ApiError> {
        match &self.channel {
            Some(channel) if channel.id == channel_id => Ok(channel.clone()),
            _ => Err(ApiError::NotFound(format!("channel {}", channel_id))),
        }
    }

    async fn participants(
        &self,
        _channel: &Channel,
        offset: usize,
        limit: usize,
    ) -> Result<ParticipantsPage, ApiError> {
        self.offsets_requested.lock().unwrap().push(offset);
        if self.panic_members_at == Some(offset) {
            panic!("member listing handler crashed at offset {}", offset);
        }
        if self.fail_members_at == Some(offset) {
            return Err(ApiError::Status {
                status: 500,
                body: "boom".to_string(),
            });
        }

        let page: Vec<_> = self
            .members
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        self.page_served();
        Ok(ParticipantsPage {
            participants: page.iter().map(|(p, _)| *p).collect(),
            users: page.into_iter().map(|(_, u)| u).collect(),
        })
    }

    async fn search_messages(
        &self,
        _channel: &Channel,
        query: &SearchQuery,
    ) -> Result<MessagesResponse, ApiError> {
        self.searches.lock().unwrap().push(*query);

        let messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| query.offset_id == 0 || m.id() < query.offset_id)
            .filter(|m| match m.date() {
                Some(d) => d.timestamp() >= query.min_date && d.timestamp() <= query.max_date,
                None => true,
            })
            .take(query.limit)
            .cloned()
            .collect();
        self.page_served();
        Ok(MessagesResponse::ChannelMessages {
            count: messages.len() as i64,
            messages,
            users: Vec::new(),
        })
    }

    async fn resolve_participant(
        &self,
        _channel: &Channel,
        user_id: i64,
        msg_id: i64,
    ) -> Result<UserSummary, ApiError> {
        self.lookups.lock().unwrap().push((user_id, msg_id));
        self.resolvable
            .get(&user_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("user {}", user_id)))
    }

    async fn last_message(
        &self,
        _channel: &Channel,
        user: &UserRef,
    ) -> Result<Option<Message>, ApiError> {
        self.message_lookups.lock().unwrap().push(user.user_id);
        if let Some(gate) = &self.message_gate {
            let _permit = gate.acquire().await.unwrap();
        }
        if self.last_message_errors.contains(&user.user_id) {
            return Err(ApiError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.last_messages.get(&user.user_id).cloned())
    }

    async fn delete_history(&self, _channel: &Channel, user: &UserRef) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(Call::DeleteHistory(user.user_id));
        if self.fail_delete.contains(&user.user_id) {
            return Err(ApiError::Status {
                status: 400,
                body: "CHANNEL_PRIVATE".to_string(),
            });
        }
        Ok(())
    }

    async fn ban(
        &self,
        _channel: &Channel,
        user: &UserRef,
        rights: &BannedRights,
    ) -> Result<(), ApiError> {
        assert_eq!(rights, &BannedRights::permanent());
        let bans = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::Ban(user.user_id));
            calls.iter().filter(|c| matches!(c, Call::Ban(_))).count()
        };
        if let Some((after, token)) = &self.cancel_after_bans {
            if bans >= *after {
                token.cancel();
            }
        }
        if self.fail_ban.contains(&user.user_id) {
            return Err(ApiError::Status {
                status: 400,
                body: "USER_ADMIN_INVALID".to_string(),
            });
        }
        Ok(())
    }
}
