//! Durable reminder queue.
//!
//! "Remind me later" used to be an in-process timer, which silently dropped
//! every pending reminder on restart. Reminders are now rows with a due
//! timestamp: the service polls for due rows, delivers, and marks them
//! delivered. Delivery failures leave the row in place so the next poll
//! retries it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Mutex;
use uuid::Uuid;

use cadence_core::{OrgId, ReminderId};

use crate::store::{DirectoryError, DirectoryResult};

/// A scheduled reminder for one chat-platform user.
#[derive(Debug, Clone)]
pub struct Reminder {
    pub id: ReminderId,
    pub organization_id: OrgId,
    /// Chat-platform user id the reminder is delivered to.
    pub external_user_id: String,
    pub message: String,
    pub due_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Insert payload for [`ReminderQueue::schedule`].
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub organization_id: OrgId,
    pub external_user_id: String,
    pub message: String,
    pub due_at: DateTime<Utc>,
}

/// Durable delayed-task queue for reminders.
#[async_trait]
pub trait ReminderQueue: Send + Sync {
    async fn schedule(&self, reminder: NewReminder) -> DirectoryResult<Reminder>;

    /// Undelivered reminders whose `due_at` has passed, oldest first.
    async fn due(&self, now: DateTime<Utc>, limit: i64) -> DirectoryResult<Vec<Reminder>>;

    async fn mark_delivered(&self, id: ReminderId) -> DirectoryResult<()>;
}

/// Postgres-backed queue.
#[derive(Clone)]
pub struct PgReminderQueue {
    pool: PgPool,
}

impl PgReminderQueue {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReminderRow {
    id: Uuid,
    organization_id: Uuid,
    external_user_id: String,
    message: String,
    due_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

impl ReminderRow {
    fn into_reminder(self) -> Reminder {
        Reminder {
            id: ReminderId::from_uuid(self.id),
            organization_id: OrgId::from_uuid(self.organization_id),
            external_user_id: self.external_user_id,
            message: self.message,
            due_at: self.due_at,
            delivered_at: self.delivered_at,
        }
    }
}

#[async_trait]
impl ReminderQueue for PgReminderQueue {
    async fn schedule(&self, reminder: NewReminder) -> DirectoryResult<Reminder> {
        let row: ReminderRow = sqlx::query_as(
            "INSERT INTO reminders (id, organization_id, external_user_id, message, due_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, organization_id, external_user_id, message, due_at, delivered_at",
        )
        .bind(Uuid::new_v4())
        .bind(reminder.organization_id.as_uuid())
        .bind(&reminder.external_user_id)
        .bind(&reminder.message)
        .bind(reminder.due_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_reminder())
    }

    async fn due(&self, now: DateTime<Utc>, limit: i64) -> DirectoryResult<Vec<Reminder>> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            "SELECT id, organization_id, external_user_id, message, due_at, delivered_at
             FROM reminders
             WHERE delivered_at IS NULL AND due_at <= $1
             ORDER BY due_at
             LIMIT $2",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ReminderRow::into_reminder).collect())
    }

    async fn mark_delivered(&self, id: ReminderId) -> DirectoryResult<()> {
        sqlx::query("UPDATE reminders SET delivered_at = NOW() WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-memory queue for tests.
#[derive(Default)]
pub struct MemoryReminderQueue {
    reminders: Mutex<Vec<Reminder>>,
}

impl MemoryReminderQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReminderQueue for MemoryReminderQueue {
    async fn schedule(&self, reminder: NewReminder) -> DirectoryResult<Reminder> {
        let stored = Reminder {
            id: ReminderId::new(),
            organization_id: reminder.organization_id,
            external_user_id: reminder.external_user_id,
            message: reminder.message,
            due_at: reminder.due_at,
            delivered_at: None,
        };
        self.reminders.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn due(&self, now: DateTime<Utc>, limit: i64) -> DirectoryResult<Vec<Reminder>> {
        let mut due: Vec<_> = self
            .reminders
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.delivered_at.is_none() && r.due_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.due_at.cmp(&b.due_at));
        due.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(due)
    }

    async fn mark_delivered(&self, id: ReminderId) -> DirectoryResult<()> {
        let mut reminders = self.reminders.lock().unwrap();
        let reminder = reminders
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(DirectoryError::Backend(format!("reminder {id} not found")))?;
        reminder.delivered_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reminder_due_in(org: OrgId, minutes: i64) -> NewReminder {
        NewReminder {
            organization_id: org,
            external_user_id: "U1".to_string(),
            message: "Time for your check-in".to_string(),
            due_at: Utc::now() + Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn test_due_only_returns_past_undelivered() {
        let queue = MemoryReminderQueue::new();
        let org = OrgId::new();
        let past = queue.schedule(reminder_due_in(org, -5)).await.unwrap();
        queue.schedule(reminder_due_in(org, 60)).await.unwrap();

        let due = queue.due(Utc::now(), 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, past.id);
    }

    #[tokio::test]
    async fn test_delivered_reminders_drop_out() {
        let queue = MemoryReminderQueue::new();
        let org = OrgId::new();
        let reminder = queue.schedule(reminder_due_in(org, -1)).await.unwrap();

        queue.mark_delivered(reminder.id).await.unwrap();
        assert!(queue.due(Utc::now(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undelivered_survive_until_marked() {
        // A failed delivery leaves the row in place; the next poll sees it again.
        let queue = MemoryReminderQueue::new();
        let org = OrgId::new();
        queue.schedule(reminder_due_in(org, -1)).await.unwrap();

        assert_eq!(queue.due(Utc::now(), 10).await.unwrap().len(), 1);
        assert_eq!(queue.due(Utc::now(), 10).await.unwrap().len(), 1);
    }
}
