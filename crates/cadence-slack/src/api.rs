//! Thin client for the Slack Web API methods the integration uses.
//!
//! Every call decodes the platform's `{ok, error}` envelope; an `ok: false`
//! body becomes [`ApiError::Platform`] carrying the platform error code.
//! The client is always constructed with an explicit base URL and token and
//! passed in by the caller, so organizations with different tokens get
//! different instances and tests point it at a local server.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

/// Request timeout for all Web API calls.
const API_TIMEOUT_SECS: u64 = 10;

/// Failures of a single Web API call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The platform answered with `ok: false`.
    #[error("{method} failed: {code}")]
    Platform { method: &'static str, code: String },

    /// The request never produced a decodable answer.
    #[error("{method} transport failure: {detail}")]
    Transport { method: &'static str, detail: String },
}

impl ApiError {
    /// The platform error code, when there is one.
    #[must_use]
    pub fn platform_code(&self) -> Option<&str> {
        match self {
            ApiError::Platform { code, .. } => Some(code),
            ApiError::Transport { .. } => None,
        }
    }
}

/// A channel as listed by the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One page of the channel catalog.
#[derive(Debug)]
pub struct ChannelPage {
    pub channels: Vec<Channel>,
    pub next_cursor: Option<String>,
}

/// One page of channel member ids.
#[derive(Debug)]
pub struct MemberPage {
    pub member_ids: Vec<String>,
    pub next_cursor: Option<String>,
}

/// A member profile as returned by the user-info lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberInfo {
    pub id: String,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile: MemberProfile,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_bot: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl MemberInfo {
    /// Best available human-readable name.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.real_name
            .clone()
            .or_else(|| self.profile.display_name.clone())
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Normalize Slack's "empty string means no more pages" convention.
fn cursor_of(meta: Option<ResponseMetadata>) -> Option<String> {
    meta.and_then(|m| m.next_cursor).filter(|c| !c.is_empty())
}

#[derive(Debug, Deserialize)]
struct ChannelsListBody {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ChannelInfoBody {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<Channel>,
}

#[derive(Debug, Deserialize)]
struct MembersBody {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct UserInfoBody {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<MemberInfo>,
}

#[derive(Debug, Deserialize)]
struct OpenDmBody {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<DmChannel>,
}

#[derive(Debug, Deserialize)]
struct DmChannel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PostMessageBody {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Slack Web API client bound to one bot token.
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl SlackClient {
    #[must_use]
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(API_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// One page of the channel catalog.
    pub async fn conversations_list(
        &self,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ChannelPage, ApiError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let body: ChannelsListBody = self.get("conversations.list", &query).await?;
        ensure_ok("conversations.list", body.ok, body.error)?;
        Ok(ChannelPage {
            channels: body.channels,
            next_cursor: cursor_of(body.response_metadata),
        })
    }

    /// Verify a channel id resolves and is visible to the bot.
    pub async fn conversations_info(&self, channel_id: &str) -> Result<Channel, ApiError> {
        let query = [("channel", channel_id.to_string())];
        let body: ChannelInfoBody = self.get("conversations.info", &query).await?;
        ensure_ok("conversations.info", body.ok, body.error)?;
        body.channel.ok_or(ApiError::Transport {
            method: "conversations.info",
            detail: "ok response without channel".to_string(),
        })
    }

    /// One page of member ids for a channel.
    pub async fn conversations_members(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<MemberPage, ApiError> {
        let mut query = vec![
            ("channel", channel_id.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let body: MembersBody = self.get("conversations.members", &query).await?;
        ensure_ok("conversations.members", body.ok, body.error)?;
        Ok(MemberPage {
            member_ids: body.members,
            next_cursor: cursor_of(body.response_metadata),
        })
    }

    /// Profile lookup for one member id.
    pub async fn users_info(&self, user_id: &str) -> Result<MemberInfo, ApiError> {
        let query = [("user", user_id.to_string())];
        let body: UserInfoBody = self.get("users.info", &query).await?;
        ensure_ok("users.info", body.ok, body.error)?;
        body.user.ok_or(ApiError::Transport {
            method: "users.info",
            detail: "ok response without user".to_string(),
        })
    }

    /// Open (or reuse) a direct-message conversation with a user.
    pub async fn open_dm(&self, user_id: &str) -> Result<String, ApiError> {
        let body: OpenDmBody = self
            .post("conversations.open", &json!({ "users": user_id }))
            .await?;
        ensure_ok("conversations.open", body.ok, body.error)?;
        body.channel
            .map(|c| c.id)
            .ok_or(ApiError::Transport {
                method: "conversations.open",
                detail: "ok response without channel".to_string(),
            })
    }

    /// Post a message with plain-text fallback and optional rich blocks.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<serde_json::Value>,
    ) -> Result<(), ApiError> {
        let mut payload = json!({ "channel": channel, "text": text });
        if let Some(blocks) = blocks {
            payload["blocks"] = blocks;
        }
        let body: PostMessageBody = self.post("chat.postMessage", &payload).await?;
        ensure_ok("chat.postMessage", body.ok, body.error)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: &'static str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self
            .http
            .get(format!("{}/{method}", self.base_url))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                method,
                detail: e.to_string(),
            })?;
        decode_body(method, response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        method: &'static str,
        payload: &serde_json::Value,
    ) -> Result<T, ApiError> {
        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                method,
                detail: e.to_string(),
            })?;
        decode_body(method, response).await
    }
}

async fn decode_body<T: DeserializeOwned>(
    method: &'static str,
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Transport {
            method,
            detail: format!("HTTP {status}"),
        });
    }
    response.json().await.map_err(|e| ApiError::Transport {
        method,
        detail: format!("undecodable body: {e}"),
    })
}

fn ensure_ok(method: &'static str, ok: bool, error: Option<String>) -> Result<(), ApiError> {
    if ok {
        return Ok(());
    }
    Err(ApiError::Platform {
        method,
        code: error.unwrap_or_else(|| "unknown_error".to_string()),
    })
}
