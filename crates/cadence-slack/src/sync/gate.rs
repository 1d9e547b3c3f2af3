//! Per-organization single-flight gate.
//!
//! Reconciliation is idempotent across runs but not under interleaving: two
//! concurrent runs over the same directory could both create the same missing
//! record. The gate serializes runs per organization; the losing trigger gets
//! an `AlreadyRunning` outcome instead of waiting.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use cadence_core::OrgId;

/// Tracks which organizations have a sync in flight.
#[derive(Clone, Default)]
pub struct SyncGate {
    inflight: Arc<Mutex<HashSet<OrgId>>>,
}

impl SyncGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate for `org`. Returns `None` when a run is already in
    /// flight; the permit releases the gate on drop.
    #[must_use]
    pub fn try_acquire(&self, org: OrgId) -> Option<SyncPermit> {
        let mut inflight = self.inflight.lock().unwrap();
        if !inflight.insert(org) {
            return None;
        }
        Some(SyncPermit {
            org,
            inflight: Arc::clone(&self.inflight),
        })
    }
}

/// RAII claim on one organization's sync slot.
pub struct SyncPermit {
    org: OrgId,
    inflight: Arc<Mutex<HashSet<OrgId>>>,
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        self.inflight.lock().unwrap().remove(&self.org);
    }
}
