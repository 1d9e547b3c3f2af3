//! Axum router and shared state for the integration's HTTP surface.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tracing::warn;

use cadence_directory::{DirectoryStore, ReminderQueue};

use crate::config::SlackConfig;
use crate::handlers;
use crate::oauth::{IdentityVerifier, OidcClient, StateStore};
use crate::sync::SyncService;
use crate::interactions::InteractionRouter;

/// The two collaborators of a login attempt.
pub struct LoginFlow {
    pub client: OidcClient,
    pub verifier: IdentityVerifier,
}

/// Shared state behind every route.
#[derive(Clone)]
pub struct ChatState {
    pub config: Arc<SlackConfig>,
    /// `None` when OAuth credentials are absent; login routes answer 503.
    pub login: Option<Arc<LoginFlow>>,
    pub states: Arc<StateStore>,
    pub sync: Arc<SyncService>,
    pub interactions: Arc<InteractionRouter>,
    pub store: Arc<dyn DirectoryStore>,
    pub reminders: Arc<dyn ReminderQueue>,
}

impl ChatState {
    /// Wire up the state. A missing credential pair disables login and is
    /// logged exactly once, here.
    pub fn new(
        config: Arc<SlackConfig>,
        store: Arc<dyn DirectoryStore>,
        reminders: Arc<dyn ReminderQueue>,
        sync: Arc<SyncService>,
        interactions: Arc<InteractionRouter>,
    ) -> Self {
        let login = match &config.auth {
            Some(auth) => Some(Arc::new(LoginFlow {
                client: OidcClient::new(
                    auth.clone(),
                    &config.authorize_url,
                    &config.api_base_url,
                ),
                verifier: IdentityVerifier::new(
                    &auth.client_id,
                    &config.issuer,
                    &config.jwks_url,
                ),
            })),
            None => {
                warn!("Slack login disabled: SLACK_CLIENT_ID / SLACK_CLIENT_SECRET not configured");
                None
            }
        };

        Self {
            config,
            login,
            states: Arc::new(StateStore::new()),
            sync,
            interactions,
            store,
            reminders,
        }
    }
}

/// All routes of the integration service.
pub fn chat_router() -> Router<ChatState> {
    Router::new()
        .route("/auth/slack/login", get(handlers::login))
        .route("/auth/slack/callback", get(handlers::callback))
        .route("/slack/commands", post(handlers::slash_command))
        .route("/slack/interactions", post(handlers::interaction))
        .route("/slack/events", post(handlers::event))
}
