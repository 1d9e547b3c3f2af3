//! CSRF-protected OAuth2/OpenID-Connect login against Slack.
//!
//! The flow walks `Unauthenticated → StateIssued → CodeReceived →
//! TokenExchanged → IdentityVerified → SessionEstablished`; any failure is a
//! terminal rejection with a [`crate::LoginError`]. No directory writes
//! happen anywhere in this module: authenticating and having a directory
//! record are deliberately independent.

pub mod client;
pub mod state;
pub mod verifier;

pub use client::{OidcClient, TokenExchange};
pub use state::{OAuthSession, SessionKey, StateStore, STATE_LIFETIME};
pub use verifier::{IdentityVerifier, SlackIdTokenClaims, VerifiedIdentity};
