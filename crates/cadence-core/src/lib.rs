//! Shared core types for Cadence services.
//!
//! Currently this is the home of the strongly typed identifiers used across
//! the directory and chat-integration crates.

pub mod ids;

pub use ids::{OrgId, ParseIdError, ReminderId, UserId};
