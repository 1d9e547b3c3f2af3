//! The persistence seam used by the sync engine and interaction handlers.

use async_trait::async_trait;

use cadence_core::{OrgId, UserId};

use crate::model::{InternalUserRecord, NewUser, Organization, UserDiff};

/// Errors surfaced by a directory backend.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// An insert or update would violate the one-record-per-key invariant
    /// (`(organization, external_id)` or `(organization, email)`).
    #[error("duplicate directory record for {field}")]
    DuplicateKey { field: &'static str },

    /// The referenced record does not exist.
    #[error("directory record {id} not found")]
    NotFound { id: UserId },

    /// Backend failure (connection, query, serialization).
    #[error("directory backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for DirectoryError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = e {
            if db.is_unique_violation() {
                let field = if db.message().contains("external_id") {
                    "external_id"
                } else {
                    "email"
                };
                return DirectoryError::DuplicateKey { field };
            }
        }
        DirectoryError::Backend(e.to_string())
    }
}

/// Result type alias for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Abstract directory backend.
///
/// All mutations are record-scoped and independently idempotent; there is no
/// transaction spanning a whole reconciliation pass, so a crash mid-run is
/// safe to resume.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Resolve an organization by its slug.
    async fn find_org_by_slug(&self, slug: &str) -> DirectoryResult<Option<Organization>>;

    /// Resolve an organization by its linked chat-platform workspace id.
    async fn find_org_by_team(&self, team_id: &str) -> DirectoryResult<Option<Organization>>;

    /// All organizations, for the periodic sync scheduler.
    async fn list_organizations(&self) -> DirectoryResult<Vec<Organization>>;

    /// All member records of one organization, active or not.
    async fn list_users(&self, org: OrgId) -> DirectoryResult<Vec<InternalUserRecord>>;

    async fn find_by_external_id(
        &self,
        org: OrgId,
        external_id: &str,
    ) -> DirectoryResult<Option<InternalUserRecord>>;

    async fn find_by_email(
        &self,
        org: OrgId,
        email: &str,
    ) -> DirectoryResult<Option<InternalUserRecord>>;

    /// Insert a new record. Fails with [`DirectoryError::DuplicateKey`] when
    /// either uniqueness key already exists.
    async fn insert_user(&self, user: NewUser) -> DirectoryResult<InternalUserRecord>;

    /// Apply a non-empty [`UserDiff`] to one record.
    async fn apply_diff(&self, id: UserId, diff: &UserDiff) -> DirectoryResult<()>;

    /// Soft-deactivate one record (`is_active = false`); never deletes.
    async fn deactivate(&self, id: UserId) -> DirectoryResult<()>;
}
