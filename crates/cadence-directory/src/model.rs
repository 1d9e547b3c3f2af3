//! Directory domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadence_core::{OrgId, UserId};

/// Role of a directory member within their organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Member => write!(f, "member"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// An organization (one customer workspace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    /// URL-safe short name; also how login requests address the organization.
    pub slug: String,
    pub name: String,
    /// Id of the linked chat-platform workspace, once known.
    pub external_team_id: Option<String>,
}

/// A member record in the internal directory.
///
/// Records are never hard-deleted by synchronization: leaving the channel
/// only flips `is_active`, so the record (and its history) survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalUserRecord {
    pub id: UserId,
    pub organization_id: OrgId,
    /// Chat-platform user id, once linked. Absent for members created through
    /// the web app who have not yet appeared in the synced channel.
    pub external_id: Option<String>,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a directory record created by synchronization.
///
/// Carries no credential material; the member completes account setup through
/// the one-time token whose hash is stored here.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub organization_id: OrgId,
    pub external_id: Option<String>,
    pub email: String,
    pub name: String,
    pub role: Role,
    /// SHA-256 hex of the one-time setup token. The plaintext token is only
    /// ever held in memory on its way to the onboarding message.
    pub setup_token_hash: Option<String>,
}

/// Minimal set of changes to converge one record onto its fetched identity.
///
/// Reconciliation applies a diff only when it is non-empty; that is what
/// makes repeated runs over unchanged input produce zero writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDiff {
    /// Backfill the chat-platform id on a record matched by email.
    pub link_external_id: Option<String>,
    /// The display name changed upstream.
    pub rename: Option<String>,
    /// The member rejoined after having been deactivated.
    pub reactivate: bool,
}

impl UserDiff {
    /// True when applying this diff would write nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.link_external_id.is_none() && self.rename.is_none() && !self.reactivate
    }
}
