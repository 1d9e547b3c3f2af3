//! Internal user directory for Cadence.
//!
//! The directory is the internal source of truth for who belongs to an
//! organization. External synchronization (the Slack integration) converges
//! channel membership onto these records; nothing in this crate talks to the
//! chat platform itself.
//!
//! The [`DirectoryStore`] trait is the seam between the sync engine and
//! persistence: production uses [`PgDirectoryStore`], tests and local
//! development use [`MemoryDirectory`].

pub mod memory;
pub mod model;
pub mod postgres;
pub mod reminders;
pub mod store;

pub use memory::MemoryDirectory;
pub use model::{InternalUserRecord, NewUser, Organization, Role, UserDiff};
pub use postgres::PgDirectoryStore;
pub use reminders::{
    MemoryReminderQueue, NewReminder, PgReminderQueue, Reminder, ReminderQueue,
};
pub use store::{DirectoryError, DirectoryResult, DirectoryStore};
