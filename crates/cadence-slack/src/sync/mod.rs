//! Directory synchronization against channel membership.
//!
//! A sync run flows fetch → reconcile → side effects: [`roster`] produces a
//! point-in-time snapshot of channel membership, [`engine`] converges the
//! directory onto it, and [`effects`] fans out billing notifications and
//! onboarding messages that never feed back into correctness. Runs for the
//! same organization are serialized by [`gate`].

pub mod effects;
pub mod engine;
pub mod gate;
pub mod roster;
pub mod service;

pub use effects::{BillingError, BillingNotifier, HttpBillingNotifier, NoopBillingNotifier};
pub use gate::{SyncGate, SyncPermit};
pub use roster::RosterFetcher;
pub use service::SyncService;

use crate::error::SyncError;

/// Point-in-time snapshot of one channel member.
///
/// Rebuilt from the platform on every run, never persisted.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub external_id: String,
    pub display_name: String,
    pub email: Option<String>,
    /// False for deleted accounts and bots; inactive identities never create
    /// records and do not protect existing ones from deactivation.
    pub is_active: bool,
}

/// Onboarding work for one newly created record.
///
/// Produced by the engine, consumed exactly once by the side-effect
/// coordinator, then discarded. Carries the only plaintext copy of the setup
/// token.
#[derive(Debug, Clone)]
pub struct PendingOnboarding {
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub setup_token: String,
}

/// The sole result of a sync run: aggregated counts, or a structured error.
#[derive(Debug, Default)]
pub struct ReconciliationOutcome {
    pub created: u32,
    pub reactivated: u32,
    pub deactivated: u32,
    pub onboarded: u32,
    pub onboarding_errors: u32,
    pub error: Option<SyncError>,
}

impl ReconciliationOutcome {
    /// Outcome for a run that failed before reconciling anything.
    #[must_use]
    pub fn failed(error: SyncError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// True when the run changed nothing (the idempotent steady state).
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.reactivated == 0 && self.deactivated == 0
    }
}
