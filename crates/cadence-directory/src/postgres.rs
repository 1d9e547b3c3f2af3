//! Postgres-backed directory store.
//!
//! Queries are intentionally plain `SELECT`/`INSERT`/`UPDATE` statements over
//! two tables (`organizations`, `users`); schema design lives with the main
//! application, this crate only depends on the columns named here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use cadence_core::{OrgId, UserId};

use crate::model::{InternalUserRecord, NewUser, Organization, Role, UserDiff};
use crate::store::{DirectoryError, DirectoryResult, DirectoryStore};

/// [`DirectoryStore`] backed by a Postgres pool.
#[derive(Clone)]
pub struct PgDirectoryStore {
    pool: PgPool,
}

impl PgDirectoryStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrgRow {
    id: Uuid,
    slug: String,
    name: String,
    external_team_id: Option<String>,
}

impl OrgRow {
    fn into_organization(self) -> Organization {
        Organization {
            id: OrgId::from_uuid(self.id),
            slug: self.slug,
            name: self.name,
            external_team_id: self.external_team_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    organization_id: Uuid,
    external_id: Option<String>,
    email: String,
    name: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_record(self) -> InternalUserRecord {
        InternalUserRecord {
            id: UserId::from_uuid(self.id),
            organization_id: OrgId::from_uuid(self.organization_id),
            external_id: self.external_id,
            email: self.email,
            name: self.name,
            role: self.role.parse().unwrap_or(Role::Member),
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const USER_COLUMNS: &str =
    "id, organization_id, external_id, email, name, role, is_active, created_at, updated_at";

#[async_trait]
impl DirectoryStore for PgDirectoryStore {
    async fn find_org_by_slug(&self, slug: &str) -> DirectoryResult<Option<Organization>> {
        let row: Option<OrgRow> = sqlx::query_as(
            "SELECT id, slug, name, external_team_id FROM organizations WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(OrgRow::into_organization))
    }

    async fn find_org_by_team(&self, team_id: &str) -> DirectoryResult<Option<Organization>> {
        let row: Option<OrgRow> = sqlx::query_as(
            "SELECT id, slug, name, external_team_id FROM organizations WHERE external_team_id = $1",
        )
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(OrgRow::into_organization))
    }

    async fn list_organizations(&self) -> DirectoryResult<Vec<Organization>> {
        let rows: Vec<OrgRow> =
            sqlx::query_as("SELECT id, slug, name, external_team_id FROM organizations ORDER BY slug")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(OrgRow::into_organization).collect())
    }

    async fn list_users(&self, org: OrgId) -> DirectoryResult<Vec<InternalUserRecord>> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE organization_id = $1 ORDER BY created_at"
        ))
        .bind(org.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UserRow::into_record).collect())
    }

    async fn find_by_external_id(
        &self,
        org: OrgId,
        external_id: &str,
    ) -> DirectoryResult<Option<InternalUserRecord>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE organization_id = $1 AND external_id = $2"
        ))
        .bind(org.as_uuid())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserRow::into_record))
    }

    async fn find_by_email(
        &self,
        org: OrgId,
        email: &str,
    ) -> DirectoryResult<Option<InternalUserRecord>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE organization_id = $1 AND lower(email) = lower($2)"
        ))
        .bind(org.as_uuid())
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserRow::into_record))
    }

    async fn insert_user(&self, user: NewUser) -> DirectoryResult<InternalUserRecord> {
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users
                (id, organization_id, external_id, email, name, role, is_active, setup_token_hash,
                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, NOW(), NOW())
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user.organization_id.as_uuid())
        .bind(&user.external_id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.to_string())
        .bind(&user.setup_token_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_record())
    }

    async fn apply_diff(&self, id: UserId, diff: &UserDiff) -> DirectoryResult<()> {
        let result = sqlx::query(
            "UPDATE users
             SET external_id = COALESCE($2, external_id),
                 name = COALESCE($3, name),
                 is_active = (is_active OR $4),
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(&diff.link_external_id)
        .bind(&diff.rename)
        .bind(diff.reactivate)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DirectoryError::NotFound { id });
        }
        Ok(())
    }

    async fn deactivate(&self, id: UserId) -> DirectoryResult<()> {
        let result =
            sqlx::query("UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DirectoryError::NotFound { id });
        }
        Ok(())
    }
}
