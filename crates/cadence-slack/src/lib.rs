//! Slack integration for Cadence.
//!
//! Two responsibilities live here:
//!
//! 1. **Login** — a CSRF-protected OAuth2/OpenID-Connect flow against Slack,
//!    with remote key-set signature verification of the identity token
//!    ([`oauth`]).
//! 2. **Directory sync** — reconciliation of the internal user directory
//!    against the membership of a Slack channel, with idempotent billing
//!    side effects and best-effort onboarding delivery ([`sync`]).
//!
//! Inbound slash commands and interactive payloads are dispatched by
//! [`interactions`]; the HTTP surface tying it all together is in [`router`]
//! and [`handlers`].
//!
//! Message wording, emoji and block layouts are deliberately confined to
//! [`sync::effects`] and handler implementations: delivering (or failing to
//! deliver) a message never affects reconciliation correctness.

pub mod api;
pub mod config;
pub mod error;
pub mod handlers;
pub mod interactions;
pub mod oauth;
pub mod router;
pub mod sync;

pub use config::{ChannelRef, RedirectUriSource, SlackAuthConfig, SlackConfig};
pub use error::{LoginError, RosterError, SyncError};
pub use router::{chat_router, ChatState};
pub use sync::{ReconciliationOutcome, SyncService};
