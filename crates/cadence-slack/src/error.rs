//! Error taxonomies for the login flow and the sync flow.
//!
//! Login errors reach end users, so every variant carries a generic
//! [`LoginError::user_message`] distinct from the internal diagnostic in its
//! `Display` output. Sync errors reach administrators as structured results
//! with a stable [`RosterError::error_code`] and a remediation hint; they are
//! values, never panics, past the fetch boundary.

use cadence_directory::DirectoryError;

/// Failures of the OAuth/OIDC login flow.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// The session holds no pending login state.
    #[error("no login state present in session")]
    StateMissing,

    /// The returned state token differs from the issued one.
    #[error("login state token mismatch")]
    StateMismatch,

    /// The issued state outlived its 10-minute window.
    #[error("login state expired")]
    StateExpired,

    /// The authorization-code grant was rejected or unreachable.
    #[error("token exchange failed (status {status:?}): {detail}")]
    TokenExchangeFailed {
        status: Option<u16>,
        detail: String,
    },

    /// The identity token's signature could not be established, including
    /// key-set fetch failures that leave it unverifiable.
    #[error("identity token signature invalid: {detail}")]
    SignatureInvalid { detail: String },

    /// The identity token was issued by someone else.
    #[error("identity token issuer mismatch: got {found}")]
    IssuerMismatch { found: String },

    /// The identity token is addressed to a different client.
    #[error("identity token audience mismatch: got {found}")]
    AudienceMismatch { found: String },

    /// The identity token is past its expiry.
    #[error("identity token expired")]
    TokenExpired,
}

impl LoginError {
    /// The single generic message shown to the person logging in.
    ///
    /// Internal diagnostics (issuer values, upstream status codes, verifier
    /// output) are logged, never rendered.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            LoginError::StateMissing | LoginError::StateMismatch | LoginError::StateExpired => {
                "Your login attempt could not be verified. Please start again."
            }
            LoginError::TokenExchangeFailed { .. } => {
                "Slack did not complete the sign-in. Please try again."
            }
            LoginError::SignatureInvalid { .. }
            | LoginError::IssuerMismatch { .. }
            | LoginError::AudienceMismatch { .. }
            | LoginError::TokenExpired => {
                "We couldn't verify your identity with Slack. Please try again."
            }
        }
    }
}

/// Failures while resolving a channel and enumerating its members.
///
/// Returned as a value from the fetch boundary; `error_code` is the closed
/// machine-readable set, `remediation` the admin-facing hint.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RosterError {
    #[error("no bot token configured for this organization")]
    MissingToken,

    #[error("the bot token was rejected: {detail}")]
    InvalidAuth { detail: String },

    #[error("the bot token lacks a required scope: {needed}")]
    MissingScope { needed: String },

    #[error("channel {channel} was not found or is not accessible")]
    ChannelNotFound { channel: String },

    #[error("channel {channel} has no members to sync")]
    NoMembers { channel: String },

    #[error("failed to enumerate channel members: {detail}")]
    MembersFetchError { detail: String },
}

impl RosterError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            RosterError::MissingToken => "missing_token",
            RosterError::InvalidAuth { .. } => "invalid_auth",
            RosterError::MissingScope { .. } => "missing_scope",
            RosterError::ChannelNotFound { .. } => "channel_not_found",
            RosterError::NoMembers { .. } => "no_members",
            RosterError::MembersFetchError { .. } => "members_fetch_error",
        }
    }

    /// What an administrator should do about it.
    #[must_use]
    pub fn remediation(&self) -> &'static str {
        match self {
            RosterError::MissingToken => {
                "Set a bot token for this organization (SLACK_BOT_TOKEN or an entry in SLACK_BOT_TOKENS)."
            }
            RosterError::InvalidAuth { .. } => {
                "Reinstall the Slack app for this workspace to obtain a fresh bot token."
            }
            RosterError::MissingScope { .. } => {
                "Reinstall the Slack app with the channels:read, users:read and users:read.email scopes."
            }
            RosterError::ChannelNotFound { .. } => {
                "Check the configured channel and invite the bot to it."
            }
            RosterError::NoMembers { .. } => {
                "The configured channel is empty; add the team members who should be synced."
            }
            RosterError::MembersFetchError { .. } => {
                "Slack did not return the member list; check connectivity and retry."
            }
        }
    }
}

/// Outcome-level sync failure carried in a reconciliation result.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Roster(#[from] RosterError),

    /// Another run for the same organization is in flight.
    #[error("a sync is already running for organization {organization}")]
    AlreadyRunning { organization: String },

    /// The organization slug or team id resolved to nothing.
    #[error("unknown organization: {organization}")]
    UnknownOrganization { organization: String },

    #[error("directory error during sync: {0}")]
    Directory(#[from] DirectoryError),

    /// Catch-all for anything unexpected inside the reconciliation pass.
    #[error("unexpected sync failure: {detail}")]
    Unexpected { detail: String },
}

impl SyncError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Roster(e) => e.error_code(),
            SyncError::AlreadyRunning { .. } => "sync_already_running",
            SyncError::UnknownOrganization { .. } => "unknown_organization",
            SyncError::Directory(_) => "directory_error",
            SyncError::Unexpected { .. } => "sync_error",
        }
    }

    #[must_use]
    pub fn remediation(&self) -> &'static str {
        match self {
            SyncError::Roster(e) => e.remediation(),
            SyncError::AlreadyRunning { .. } => {
                "Wait for the in-flight sync to finish; runs are serialized per organization."
            }
            SyncError::UnknownOrganization { .. } => {
                "Create the organization or link its Slack workspace before syncing."
            }
            SyncError::Directory(_) => "Check directory database connectivity and retry.",
            SyncError::Unexpected { .. } => "Inspect the service logs for the wrapped failure.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_error_codes_are_stable() {
        let cases: Vec<(RosterError, &str)> = vec![
            (RosterError::MissingToken, "missing_token"),
            (
                RosterError::InvalidAuth {
                    detail: "x".into(),
                },
                "invalid_auth",
            ),
            (
                RosterError::MissingScope {
                    needed: "users:read".into(),
                },
                "missing_scope",
            ),
            (
                RosterError::ChannelNotFound {
                    channel: "#general".into(),
                },
                "channel_not_found",
            ),
            (
                RosterError::NoMembers {
                    channel: "#general".into(),
                },
                "no_members",
            ),
            (
                RosterError::MembersFetchError {
                    detail: "x".into(),
                },
                "members_fetch_error",
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.error_code(), code);
            assert!(!err.remediation().is_empty());
        }
    }

    #[test]
    fn test_user_message_never_leaks_diagnostics() {
        let err = LoginError::IssuerMismatch {
            found: "https://evil.example".into(),
        };
        assert!(!err.user_message().contains("evil.example"));

        let err = LoginError::TokenExchangeFailed {
            status: Some(502),
            detail: "upstream exploded".into(),
        };
        assert!(!err.user_message().contains("502"));
        assert!(!err.user_message().contains("exploded"));
    }

    #[test]
    fn test_sync_error_wraps_roster_code() {
        let err = SyncError::from(RosterError::MissingToken);
        assert_eq!(err.error_code(), "missing_token");
    }
}
