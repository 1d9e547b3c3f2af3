//! Single-use CSRF login state, scoped to the caller's session.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::LoginError;

/// How long an issued state stays valid.
pub const STATE_LIFETIME: Duration = Duration::minutes(10);

/// Random bytes per state token (hex-encoded, so 256 bits on the wire).
const STATE_TOKEN_BYTES: usize = 32;

/// Opaque key identifying one browser session (the session cookie value).
pub type SessionKey = String;

/// Pending login state for one session.
#[derive(Debug, Clone)]
pub struct OAuthSession {
    pub state: String,
    pub organization_slug: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OAuthSession {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Holds at most one pending [`OAuthSession`] per session key.
///
/// Every validation consumes the stored entry, success or not: a state token
/// can never be replayed, and a failed attempt forces a fresh login.
#[derive(Default)]
pub struct StateStore {
    sessions: Mutex<HashMap<SessionKey, OAuthSession>>,
}

impl StateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh state token for `session`, replacing any previous one.
    pub fn issue(&self, session: &str, organization_slug: &str) -> String {
        let mut bytes = [0u8; STATE_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let state = hex::encode(bytes);

        let now = Utc::now();
        let entry = OAuthSession {
            state: state.clone(),
            organization_slug: organization_slug.to_string(),
            issued_at: now,
            expires_at: now + STATE_LIFETIME,
        };

        let mut sessions = self.sessions.lock().unwrap();
        // Opportunistic cleanup so abandoned logins don't accumulate.
        sessions.retain(|_, s| !s.is_expired(now));
        sessions.insert(session.to_string(), entry);
        state
    }

    /// Validate a returned state token against the session's stored entry.
    ///
    /// Returns the organization slug the login was issued for. The entry is
    /// removed on every outcome.
    pub fn validate(&self, session: &str, received: &str) -> Result<String, LoginError> {
        let entry = self
            .sessions
            .lock()
            .unwrap()
            .remove(session)
            .ok_or(LoginError::StateMissing)?;

        if entry.is_expired(Utc::now()) {
            return Err(LoginError::StateExpired);
        }

        let matches: bool = entry
            .state
            .as_bytes()
            .ct_eq(received.as_bytes())
            .into();
        if !matches {
            return Err(LoginError::StateMismatch);
        }

        Ok(entry.organization_slug)
    }

    #[cfg(test)]
    fn insert_raw(&self, session: &str, entry: OAuthSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.to_string(), entry);
    }
}
