//! In-memory directory backend for tests and local development.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use cadence_core::{OrgId, UserId};

use crate::model::{InternalUserRecord, NewUser, Organization, Role, UserDiff};
use crate::store::{DirectoryError, DirectoryResult, DirectoryStore};

/// Mutex-guarded maps mirroring the Postgres tables.
#[derive(Default)]
struct Inner {
    organizations: Vec<Organization>,
    users: HashMap<UserId, InternalUserRecord>,
}

/// An in-memory [`DirectoryStore`].
#[derive(Default)]
pub struct MemoryDirectory {
    inner: Mutex<Inner>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an organization; returns it for convenience.
    pub fn add_organization(
        &self,
        slug: &str,
        name: &str,
        external_team_id: Option<&str>,
    ) -> Organization {
        let org = Organization {
            id: OrgId::new(),
            slug: slug.to_string(),
            name: name.to_string(),
            external_team_id: external_team_id.map(str::to_string),
        };
        self.inner.lock().unwrap().organizations.push(org.clone());
        org
    }

    /// Seed an existing member record, bypassing uniqueness checks.
    pub fn seed_user(&self, record: InternalUserRecord) {
        self.inner.lock().unwrap().users.insert(record.id, record);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn find_org_by_slug(&self, slug: &str) -> DirectoryResult<Option<Organization>> {
        Ok(self
            .lock()
            .organizations
            .iter()
            .find(|o| o.slug == slug)
            .cloned())
    }

    async fn find_org_by_team(&self, team_id: &str) -> DirectoryResult<Option<Organization>> {
        Ok(self
            .lock()
            .organizations
            .iter()
            .find(|o| o.external_team_id.as_deref() == Some(team_id))
            .cloned())
    }

    async fn list_organizations(&self) -> DirectoryResult<Vec<Organization>> {
        Ok(self.lock().organizations.clone())
    }

    async fn list_users(&self, org: OrgId) -> DirectoryResult<Vec<InternalUserRecord>> {
        let mut users: Vec<_> = self
            .lock()
            .users
            .values()
            .filter(|u| u.organization_id == org)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn find_by_external_id(
        &self,
        org: OrgId,
        external_id: &str,
    ) -> DirectoryResult<Option<InternalUserRecord>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| {
                u.organization_id == org && u.external_id.as_deref() == Some(external_id)
            })
            .cloned())
    }

    async fn find_by_email(
        &self,
        org: OrgId,
        email: &str,
    ) -> DirectoryResult<Option<InternalUserRecord>> {
        let email = email.to_lowercase();
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.organization_id == org && u.email.to_lowercase() == email)
            .cloned())
    }

    async fn insert_user(&self, user: NewUser) -> DirectoryResult<InternalUserRecord> {
        let mut inner = self.lock();
        let duplicate_external = user.external_id.as_deref().is_some_and(|ext| {
            inner.users.values().any(|u| {
                u.organization_id == user.organization_id
                    && u.external_id.as_deref() == Some(ext)
            })
        });
        if duplicate_external {
            return Err(DirectoryError::DuplicateKey {
                field: "external_id",
            });
        }
        let email = user.email.to_lowercase();
        let duplicate_email = inner
            .users
            .values()
            .any(|u| u.organization_id == user.organization_id && u.email.to_lowercase() == email);
        if duplicate_email {
            return Err(DirectoryError::DuplicateKey { field: "email" });
        }

        let now = Utc::now();
        let record = InternalUserRecord {
            id: UserId::new(),
            organization_id: user.organization_id,
            external_id: user.external_id,
            email: user.email,
            name: user.name,
            role: user.role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn apply_diff(&self, id: UserId, diff: &UserDiff) -> DirectoryResult<()> {
        let mut inner = self.lock();
        let record = inner
            .users
            .get_mut(&id)
            .ok_or(DirectoryError::NotFound { id })?;
        if let Some(ext) = &diff.link_external_id {
            record.external_id = Some(ext.clone());
        }
        if let Some(name) = &diff.rename {
            record.name = name.clone();
        }
        if diff.reactivate {
            record.is_active = true;
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn deactivate(&self, id: UserId) -> DirectoryResult<()> {
        let mut inner = self.lock();
        let record = inner
            .users
            .get_mut(&id)
            .ok_or(DirectoryError::NotFound { id })?;
        record.is_active = false;
        record.updated_at = Utc::now();
        Ok(())
    }
}

/// Convenience constructor for a synced member record, used by tests in this
/// workspace.
#[must_use]
pub fn make_member(org: OrgId, external_id: Option<&str>, email: &str) -> InternalUserRecord {
    let now = Utc::now();
    InternalUserRecord {
        id: UserId::new(),
        organization_id: org,
        external_id: external_id.map(str::to_string),
        email: email.to_string(),
        name: email.split('@').next().unwrap_or(email).to_string(),
        role: Role::Member,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
