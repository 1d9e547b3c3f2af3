//! Sync orchestration: the single entry point behind every trigger.
//!
//! The periodic scheduler, the membership webhook and any manual trigger all
//! end up in [`SyncService::sync_organization`], so their semantics cannot
//! drift apart.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use cadence_directory::{DirectoryStore, Organization};

use crate::api::SlackClient;
use crate::config::SlackConfig;
use crate::error::{RosterError, SyncError};

use super::effects::{BillingNotifier, SideEffectCoordinator, ONBOARDING_SEND_DELAY};
use super::engine;
use super::gate::SyncGate;
use super::roster::RosterFetcher;
use super::ReconciliationOutcome;

/// Orchestrates fetch → reconcile → side effects for one organization at a
/// time.
pub struct SyncService {
    config: Arc<SlackConfig>,
    store: Arc<dyn DirectoryStore>,
    billing: Arc<dyn BillingNotifier>,
    gate: SyncGate,
    send_delay: Duration,
}

impl SyncService {
    #[must_use]
    pub fn new(
        config: Arc<SlackConfig>,
        store: Arc<dyn DirectoryStore>,
        billing: Arc<dyn BillingNotifier>,
    ) -> Self {
        Self {
            config,
            store,
            billing,
            gate: SyncGate::new(),
            send_delay: ONBOARDING_SEND_DELAY,
        }
    }

    /// Override the onboarding inter-send delay (tests).
    #[must_use]
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// The gate shared with anything else that must respect run serialization.
    #[must_use]
    pub fn gate(&self) -> &SyncGate {
        &self.gate
    }

    /// Sync the organization addressed by slug (scheduler trigger).
    pub async fn sync_by_slug(&self, slug: &str) -> ReconciliationOutcome {
        match self.store.find_org_by_slug(slug).await {
            Ok(Some(org)) => self.sync_organization(&org).await,
            Ok(None) => ReconciliationOutcome::failed(SyncError::UnknownOrganization {
                organization: slug.to_string(),
            }),
            Err(e) => ReconciliationOutcome::failed(e.into()),
        }
    }

    /// Sync the organization linked to a workspace id (webhook trigger).
    pub async fn sync_by_team(&self, team_id: &str) -> ReconciliationOutcome {
        match self.store.find_org_by_team(team_id).await {
            Ok(Some(org)) => self.sync_organization(&org).await,
            Ok(None) => ReconciliationOutcome::failed(SyncError::UnknownOrganization {
                organization: team_id.to_string(),
            }),
            Err(e) => ReconciliationOutcome::failed(e.into()),
        }
    }

    /// Run one full sync for `org`.
    pub async fn sync_organization(&self, org: &Organization) -> ReconciliationOutcome {
        let Some(_permit) = self.gate.try_acquire(org.id) else {
            return ReconciliationOutcome::failed(SyncError::AlreadyRunning {
                organization: org.slug.clone(),
            });
        };

        let Some(token) = self.config.bot_token_for(&org.slug) else {
            return ReconciliationOutcome::failed(RosterError::MissingToken.into());
        };
        let chat = SlackClient::new(&self.config.api_base_url, token);

        let fetcher = RosterFetcher::new(chat.clone());
        let fetched = match fetcher.list_channel_members(&self.config.channel).await {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(
                    org = %org.slug,
                    code = e.error_code(),
                    error = %e,
                    remediation = e.remediation(),
                    "roster fetch failed"
                );
                return ReconciliationOutcome::failed(e.into());
            }
        };

        let (mut outcome, pending) =
            match engine::reconcile(self.store.as_ref(), org.id, &fetched).await {
                Ok(result) => result,
                Err(e) => {
                    error!(org = %org.slug, error = %e, "reconciliation failed");
                    return ReconciliationOutcome::failed(e);
                }
            };

        let effects = SideEffectCoordinator::new(
            chat,
            Arc::clone(&self.billing),
            &self.config.frontend_url,
            self.config.private_channel_id.clone(),
            self.send_delay,
        );
        effects.dispatch(org, &mut outcome, pending).await;

        info!(
            org = %org.slug,
            created = outcome.created,
            reactivated = outcome.reactivated,
            deactivated = outcome.deactivated,
            onboarded = outcome.onboarded,
            onboarding_errors = outcome.onboarding_errors,
            "sync run finished"
        );
        outcome
    }
}
