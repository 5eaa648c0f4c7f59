//! JSON gateway client implementing `GroupApi` over HTTP.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    ApiError, BannedRights, Channel, GroupApi, Message, MessagesResponse, Participant,
    ParticipantsPage, SearchQuery, UserRef, UserSummary,
};
use crate::config::AppConfig;
use crate::rate_limit::{RateLimitContext, RetryHelper};

/// Body of 420/429 responses
#[derive(Debug, Deserialize)]
struct FloodWaitBody {
    retry_after: u64,
}

#[derive(Debug, Deserialize)]
struct ParticipantResponse {
    participant: Participant,
    #[serde(default)]
    users: Vec<UserSummary>,
}

#[derive(Debug, Serialize)]
struct HistoryRequest {
    access_hash: i64,
}

#[derive(Debug, Serialize)]
struct BanRequest<'a> {
    access_hash: i64,
    rights: &'a BannedRights,
}

#[derive(Debug, Clone)]
pub struct HttpGroupApi {
    client: Client,
    base_url: String,
    session_token: String,
    rate_limits: RateLimitContext,
    retry: RetryHelper,
}

impl HttpGroupApi {
    pub fn new(config: &AppConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("banhammer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let rate_limits = RateLimitContext::from_config(&config.rate_limit);
        rate_limits.log_config();

        Ok(Self {
            client,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            session_token: config.api.session_token.clone(),
            retry: rate_limits.retry_helper(),
            rate_limits,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.session_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.session_token)
        }
    }

    /// Send one request under the throttle and retry policy, decoding a JSON body
    async fn call<T, F>(&self, what: &str, build: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let body = self.call_raw(what, build).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Same as `call` for endpoints whose body is irrelevant
    async fn call_unit<F>(&self, what: &str, build: F) -> Result<(), ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.call_raw(what, build).await.map(|_| ())
    }

    async fn call_raw<F>(&self, what: &str, build: F) -> Result<String, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let this = self;
        let build = &build;
        self.retry
            .with_retry(|| async move {
                this.rate_limits.throttle.wait().await;
                debug!("API call: {}", what);
                let response = this.authorize(build()).send().await?;
                let status = response.status();
                let body = response.text().await?;
                check_status(status, body, what)
            })
            .await
    }
}

fn check_status(status: StatusCode, body: String, what: &str) -> Result<String, ApiError> {
    if status.is_success() {
        return Ok(body);
    }
    match status.as_u16() {
        404 => Err(ApiError::NotFound(what.to_string())),
        420 | 429 => {
            let seconds = serde_json::from_str::<FloodWaitBody>(&body)
                .map(|b| b.retry_after)
                .unwrap_or(1);
            Err(ApiError::FloodWait { seconds })
        }
        code => Err(ApiError::Status { status: code, body }),
    }
}

#[async_trait]
impl GroupApi for HttpGroupApi {
    async fn resolve_channel(&self, channel_id: i64) -> Result<Channel, ApiError> {
        let url = self.url(&format!("/channels/{}", channel_id));
        self.call(&format!("resolve channel {}", channel_id), || {
            self.client.get(&url)
        })
        .await
    }

    async fn participants(
        &self,
        channel: &Channel,
        offset: usize,
        limit: usize,
    ) -> Result<ParticipantsPage, ApiError> {
        let url = self.url(&format!("/channels/{}/participants", channel.id));
        self.call(&format!("participants offset {}", offset), || {
            self.client.get(&url).query(&[
                ("access_hash", channel.access_hash.to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ])
        })
        .await
    }

    async fn search_messages(
        &self,
        channel: &Channel,
        query: &SearchQuery,
    ) -> Result<MessagesResponse, ApiError> {
        let url = self.url(&format!("/channels/{}/messages", channel.id));
        self.call(&format!("message search offset_id {}", query.offset_id), || {
            self.client.get(&url).query(&[
                ("access_hash", channel.access_hash.to_string()),
                ("min_date", query.min_date.to_string()),
                ("max_date", query.max_date.to_string()),
                ("offset_id", query.offset_id.to_string()),
                ("limit", query.limit.to_string()),
            ])
        })
        .await
    }

    async fn resolve_participant(
        &self,
        channel: &Channel,
        user_id: i64,
        msg_id: i64,
    ) -> Result<UserSummary, ApiError> {
        let url = self.url(&format!("/channels/{}/participants/{}", channel.id, user_id));
        let response: ParticipantResponse = self
            .call(&format!("participant {}", user_id), || {
                self.client.get(&url).query(&[
                    ("access_hash", channel.access_hash.to_string()),
                    ("msg_id", msg_id.to_string()),
                ])
            })
            .await?;

        response
            .users
            .into_iter()
            .find(|u| u.id == response.participant.user_id)
            .ok_or_else(|| ApiError::NotFound(format!("user {} in participant response", user_id)))
    }

    async fn last_message(
        &self,
        channel: &Channel,
        user: &UserRef,
    ) -> Result<Option<Message>, ApiError> {
        let url = self.url(&format!("/channels/{}/messages", channel.id));
        let response: MessagesResponse = self
            .call(&format!("last message of user {}", user.user_id), || {
                self.client.get(&url).query(&[
                    ("access_hash", channel.access_hash.to_string()),
                    ("from_id", user.user_id.to_string()),
                    ("from_access_hash", user.access_hash.to_string()),
                    ("limit", "1".to_string()),
                ])
            })
            .await?;

        let (messages, _) = response.into_parts();
        Ok(messages.into_iter().next())
    }

    async fn delete_history(&self, channel: &Channel, user: &UserRef) -> Result<(), ApiError> {
        let url = self.url(&format!(
            "/channels/{}/participants/{}/delete-history",
            channel.id, user.user_id
        ));
        let body = HistoryRequest {
            access_hash: user.access_hash,
        };
        self.call_unit(&format!("delete history of user {}", user.user_id), || {
            self.client
                .post(&url)
                .query(&[("access_hash", channel.access_hash.to_string())])
                .json(&body)
        })
        .await
    }

    async fn ban(
        &self,
        channel: &Channel,
        user: &UserRef,
        rights: &BannedRights,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!(
            "/channels/{}/participants/{}/ban",
            channel.id, user.user_id
        ));
        let body = BanRequest {
            access_hash: user.access_hash,
            rights,
        };
        self.call_unit(&format!("ban user {}", user.user_id), || {
            self.client
                .post(&url)
                .query(&[("access_hash", channel.access_hash.to_string())])
                .json(&body)
        })
        .await
    }
}
