//! Best-effort side effects of a sync run.
//!
//! Billing and messaging are collaborators, not participants: a failure here
//! is logged (and, for onboarding, counted) but never changes what the
//! reconciliation pass did.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use cadence_directory::Organization;

use crate::api::SlackClient;

use super::{PendingOnboarding, ReconciliationOutcome};

/// Pause between consecutive onboarding sends, respecting the platform's
/// message rate limits.
pub const ONBOARDING_SEND_DELAY: Duration = Duration::from_secs(1);

/// A billing notification that could not be delivered.
#[derive(Debug, thiserror::Error)]
#[error("billing notification failed: {detail}")]
pub struct BillingError {
    pub detail: String,
}

/// Seat-count change notifications. Aggregate per run, one call per
/// direction; billing reconciles its own ledger out-of-band, so there is no
/// retry here.
#[async_trait]
pub trait BillingNotifier: Send + Sync {
    async fn seats_added(&self, org: &Organization, count: u32) -> Result<(), BillingError>;

    async fn seats_removed(&self, org: &Organization, count: u32) -> Result<(), BillingError>;
}

/// Posts seat changes to the billing webhook.
pub struct HttpBillingNotifier {
    http: reqwest::Client,
    url: String,
}

impl HttpBillingNotifier {
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url: url.to_string(),
        }
    }

    async fn notify(
        &self,
        org: &Organization,
        change: &str,
        count: u32,
    ) -> Result<(), BillingError> {
        let payload = json!({
            "organization_id": org.id,
            "organization_slug": org.slug,
            "change": change,
            "seats": count,
        });
        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BillingError {
                detail: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(BillingError {
                detail: format!("billing webhook returned HTTP {}", response.status()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BillingNotifier for HttpBillingNotifier {
    async fn seats_added(&self, org: &Organization, count: u32) -> Result<(), BillingError> {
        self.notify(org, "addition", count).await
    }

    async fn seats_removed(&self, org: &Organization, count: u32) -> Result<(), BillingError> {
        self.notify(org, "removal", count).await
    }
}

/// Notifier for deployments without a billing webhook.
pub struct NoopBillingNotifier;

#[async_trait]
impl BillingNotifier for NoopBillingNotifier {
    async fn seats_added(&self, _org: &Organization, _count: u32) -> Result<(), BillingError> {
        Ok(())
    }

    async fn seats_removed(&self, _org: &Organization, _count: u32) -> Result<(), BillingError> {
        Ok(())
    }
}

/// Fans out the side effects of one finished reconciliation pass.
pub struct SideEffectCoordinator {
    chat: SlackClient,
    billing: Arc<dyn BillingNotifier>,
    frontend_url: String,
    private_channel_id: Option<String>,
    send_delay: Duration,
}

impl SideEffectCoordinator {
    #[must_use]
    pub fn new(
        chat: SlackClient,
        billing: Arc<dyn BillingNotifier>,
        frontend_url: &str,
        private_channel_id: Option<String>,
        send_delay: Duration,
    ) -> Self {
        Self {
            chat,
            billing,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            private_channel_id,
            send_delay,
        }
    }

    /// Fire billing notifications, deliver onboarding messages, and post the
    /// admin summary. Updates only the onboarding counters on `outcome`.
    pub async fn dispatch(
        &self,
        org: &Organization,
        outcome: &mut ReconciliationOutcome,
        pending: Vec<PendingOnboarding>,
    ) {
        let additions = outcome.created + outcome.reactivated;
        if additions > 0 {
            if let Err(e) = self.billing.seats_added(org, additions).await {
                warn!(org = %org.slug, error = %e, "seat addition notification failed");
            }
        }
        if outcome.deactivated > 0 {
            if let Err(e) = self.billing.seats_removed(org, outcome.deactivated).await {
                warn!(org = %org.slug, error = %e, "seat removal notification failed");
            }
        }

        // Sequential on purpose: one DM at a time, spaced out.
        for (i, entry) in pending.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.send_delay).await;
            }
            match self.send_onboarding(entry).await {
                Ok(()) => outcome.onboarded += 1,
                Err(e) => {
                    warn!(
                        org = %org.slug,
                        member = %entry.external_id,
                        error = %e,
                        "onboarding message failed"
                    );
                    outcome.onboarding_errors += 1;
                }
            }
        }

        if let Some(channel) = &self.private_channel_id {
            if !outcome.is_noop() {
                let summary = format!(
                    "Directory sync for *{}*: {} created, {} reactivated, {} deactivated, {} onboarding failures.",
                    org.name,
                    outcome.created,
                    outcome.reactivated,
                    outcome.deactivated,
                    outcome.onboarding_errors,
                );
                if let Err(e) = self.chat.post_message(channel, &summary, None).await {
                    warn!(org = %org.slug, error = %e, "sync summary post failed");
                }
            }
        }
    }

    async fn send_onboarding(&self, entry: &PendingOnboarding) -> Result<(), crate::api::ApiError> {
        let dm = self.chat.open_dm(&entry.external_id).await?;
        let setup_link = format!("{}/setup/{}", self.frontend_url, entry.setup_token);
        let text = format!(
            "Welcome to Cadence, {}! Finish setting up your account: {setup_link}",
            entry.name
        );
        let blocks = json!([
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        ":wave: Welcome to Cadence, *{}*!\nYour team shares weekly check-ins here.",
                        entry.name
                    )
                }
            },
            {
                "type": "actions",
                "elements": [{
                    "type": "button",
                    "text": { "type": "plain_text", "text": "Set up my account" },
                    "url": setup_link,
                    "style": "primary"
                }]
            }
        ]);
        self.chat.post_message(&dm, &text, Some(blocks)).await
    }
}
