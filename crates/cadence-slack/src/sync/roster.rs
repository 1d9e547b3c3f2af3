//! Channel resolution and paginated member enumeration.

use tracing::{debug, warn};

use crate::api::{ApiError, SlackClient};
use crate::config::ChannelRef;
use crate::error::RosterError;

use super::ExternalIdentity;

/// Page size for catalog and member listings.
const PAGE_SIZE: u32 = 1000;

/// Hard cap on pages read per listing. Pagination normally terminates on an
/// absent cursor; the cap turns a misbehaving API into an error instead of an
/// infinite loop.
const MAX_PAGES: u32 = 100;

/// Fetches the membership snapshot a sync run reconciles against.
pub struct RosterFetcher {
    client: SlackClient,
}

impl RosterFetcher {
    #[must_use]
    pub fn new(client: SlackClient) -> Self {
        Self { client }
    }

    /// Resolve `channel` and return its members as identities.
    ///
    /// Individual profile-lookup failures are logged and that member dropped;
    /// everything else surfaces as a [`RosterError`] value. Callers always
    /// get a result object, never a propagated panic or raw API error.
    pub async fn list_channel_members(
        &self,
        channel: &ChannelRef,
    ) -> Result<Vec<ExternalIdentity>, RosterError> {
        let channel_id = self.resolve_channel(channel).await?;
        let member_ids = self.member_ids(&channel_id, channel).await?;
        if member_ids.is_empty() {
            return Err(RosterError::NoMembers {
                channel: channel.to_string(),
            });
        }

        let mut identities = Vec::with_capacity(member_ids.len());
        for member_id in &member_ids {
            match self.client.users_info(member_id).await {
                Ok(info) => identities.push(ExternalIdentity {
                    external_id: info.id.clone(),
                    display_name: info.display_name(),
                    email: info.profile.email.clone(),
                    is_active: !info.deleted && !info.is_bot,
                }),
                Err(e) => {
                    // One unreadable profile must not sink the whole batch.
                    warn!(member = %member_id, error = %e, "profile lookup failed, dropping member");
                }
            }
        }

        if identities.is_empty() {
            return Err(RosterError::MembersFetchError {
                detail: format!(
                    "all {} profile lookups failed for {channel}",
                    member_ids.len()
                ),
            });
        }

        debug!(
            channel = %channel,
            members = identities.len(),
            dropped = member_ids.len() - identities.len(),
            "fetched channel roster"
        );
        Ok(identities)
    }

    /// An id-shaped reference is verified once; a name is searched for in the
    /// paginated catalog, case-insensitively.
    async fn resolve_channel(&self, channel: &ChannelRef) -> Result<String, RosterError> {
        match channel {
            ChannelRef::Id(id) => {
                self.client
                    .conversations_info(id)
                    .await
                    .map_err(|e| map_api_error(e, channel))?;
                Ok(id.clone())
            }
            ChannelRef::Name(name) => {
                let mut cursor: Option<String> = None;
                for _page in 0..MAX_PAGES {
                    let page = self
                        .client
                        .conversations_list(cursor.as_deref(), PAGE_SIZE)
                        .await
                        .map_err(|e| map_api_error(e, channel))?;

                    if let Some(found) = page
                        .channels
                        .iter()
                        .find(|c| c.name.eq_ignore_ascii_case(name))
                    {
                        return Ok(found.id.clone());
                    }

                    match page.next_cursor {
                        None => {
                            return Err(RosterError::ChannelNotFound {
                                channel: channel.to_string(),
                            })
                        }
                        Some(next) if Some(&next) == cursor.as_ref() => {
                            return Err(RosterError::MembersFetchError {
                                detail: format!("channel catalog cursor did not advance ({next})"),
                            })
                        }
                        Some(next) => cursor = Some(next),
                    }
                }
                Err(RosterError::MembersFetchError {
                    detail: format!("channel catalog exceeded {MAX_PAGES} pages"),
                })
            }
        }
    }

    async fn member_ids(
        &self,
        channel_id: &str,
        channel: &ChannelRef,
    ) -> Result<Vec<String>, RosterError> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        for _page in 0..MAX_PAGES {
            let page = self
                .client
                .conversations_members(channel_id, cursor.as_deref(), PAGE_SIZE)
                .await
                .map_err(|e| map_api_error(e, channel))?;
            ids.extend(page.member_ids);

            match page.next_cursor {
                None => return Ok(ids),
                Some(next) if Some(&next) == cursor.as_ref() => {
                    return Err(RosterError::MembersFetchError {
                        detail: format!("member listing cursor did not advance ({next})"),
                    })
                }
                Some(next) => cursor = Some(next),
            }
        }
        Err(RosterError::MembersFetchError {
            detail: format!("member listing exceeded {MAX_PAGES} pages"),
        })
    }
}

/// Collapse platform error codes into the closed roster taxonomy.
fn map_api_error(e: ApiError, channel: &ChannelRef) -> RosterError {
    match e.platform_code() {
        Some("invalid_auth" | "not_authed" | "account_inactive" | "token_revoked"
        | "token_expired") => RosterError::InvalidAuth {
            detail: e.to_string(),
        },
        Some("missing_scope") => RosterError::MissingScope {
            needed: "channels:read, users:read, users:read.email".to_string(),
        },
        Some("channel_not_found" | "not_in_channel") => RosterError::ChannelNotFound {
            channel: channel.to_string(),
        },
        _ => RosterError::MembersFetchError {
            detail: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(code: &str) -> ApiError {
        ApiError::Platform {
            method: "conversations.members",
            code: code.to_string(),
        }
    }

    #[test]
    fn test_platform_code_mapping() {
        let channel = ChannelRef::Name("team".into());
        assert_eq!(
            map_api_error(platform("invalid_auth"), &channel).error_code(),
            "invalid_auth"
        );
        assert_eq!(
            map_api_error(platform("token_revoked"), &channel).error_code(),
            "invalid_auth"
        );
        assert_eq!(
            map_api_error(platform("missing_scope"), &channel).error_code(),
            "missing_scope"
        );
        assert_eq!(
            map_api_error(platform("channel_not_found"), &channel).error_code(),
            "channel_not_found"
        );
        assert_eq!(
            map_api_error(platform("ratelimited"), &channel).error_code(),
            "members_fetch_error"
        );
    }

    #[test]
    fn test_transport_errors_map_to_fetch_error() {
        let channel = ChannelRef::Id("C0123ABCD".into());
        let err = ApiError::Transport {
            method: "conversations.members",
            detail: "HTTP 503".into(),
        };
        assert_eq!(map_api_error(err, &channel).error_code(), "members_fetch_error");
    }
}
