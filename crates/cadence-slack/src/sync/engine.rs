//! The reconciliation pass: converge the directory onto a fetched roster.
//!
//! Two ordered passes. The first walks every active fetched identity,
//! matching by external id first and email second, applying only non-empty
//! diffs and creating records for the unmatched. The second deactivates
//! linked, active records that no longer appear among the active external
//! ids. The second pass runs strictly after the first has seen the whole
//! roster, so an identity that merely changed shape within one run is updated
//! rather than deactivated and recreated.
//!
//! Per-record failures are logged and excluded from the counts; they never
//! abort the remaining records. Re-running over an unchanged roster performs
//! zero writes.

use std::collections::{HashMap, HashSet};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::warn;

use cadence_core::OrgId;
use cadence_directory::{DirectoryStore, InternalUserRecord, NewUser, Role, UserDiff};

use crate::error::SyncError;

use super::{ExternalIdentity, PendingOnboarding, ReconciliationOutcome};

/// Random bytes per setup token (base64url on the wire).
const SETUP_TOKEN_BYTES: usize = 32;

/// Run the reconciliation passes against `store`.
///
/// Returns the partial outcome (create/reactivate/deactivate counts) and the
/// onboarding queue for the side-effect coordinator. Only a failure to read
/// the existing directory aborts the run; everything per-record is isolated.
pub async fn reconcile(
    store: &dyn DirectoryStore,
    org: OrgId,
    fetched: &[ExternalIdentity],
) -> Result<(ReconciliationOutcome, Vec<PendingOnboarding>), SyncError> {
    let existing = store.list_users(org).await?;

    let by_external: HashMap<&str, &InternalUserRecord> = existing
        .iter()
        .filter_map(|u| u.external_id.as_deref().map(|ext| (ext, u)))
        .collect();
    let by_email: HashMap<String, &InternalUserRecord> = existing
        .iter()
        .map(|u| (u.email.to_lowercase(), u))
        .collect();

    let mut outcome = ReconciliationOutcome::default();
    let mut pending = Vec::new();
    let mut processed: HashSet<&str> = HashSet::new();
    let active_ids: HashSet<&str> = fetched
        .iter()
        .filter(|i| i.is_active)
        .map(|i| i.external_id.as_str())
        .collect();

    for identity in fetched.iter().filter(|i| i.is_active) {
        if !processed.insert(identity.external_id.as_str()) {
            warn!(external_id = %identity.external_id, "duplicate identity in roster, skipping");
            continue;
        }

        let matched = by_external
            .get(identity.external_id.as_str())
            .copied()
            .or_else(|| {
                identity
                    .email
                    .as_ref()
                    .and_then(|email| by_email.get(&email.to_lowercase()).copied())
            });

        match matched {
            Some(record) => {
                let diff = compute_diff(record, identity);
                if diff.is_empty() {
                    continue;
                }
                match store.apply_diff(record.id, &diff).await {
                    Ok(()) => {
                        if diff.reactivate {
                            outcome.reactivated += 1;
                        }
                    }
                    Err(e) => {
                        warn!(
                            user = %record.id,
                            external_id = %identity.external_id,
                            error = %e,
                            "failed to update record, skipping"
                        );
                    }
                }
            }
            None => {
                let Some(email) = identity.email.clone() else {
                    warn!(
                        external_id = %identity.external_id,
                        "identity has no email, cannot create record"
                    );
                    continue;
                };
                let (setup_token, setup_token_hash) = generate_setup_token();
                let new_user = NewUser {
                    organization_id: org,
                    external_id: Some(identity.external_id.clone()),
                    email: email.clone(),
                    name: identity.display_name.clone(),
                    role: Role::Member,
                    setup_token_hash: Some(setup_token_hash),
                };
                match store.insert_user(new_user).await {
                    Ok(_) => {
                        outcome.created += 1;
                        pending.push(PendingOnboarding {
                            external_id: identity.external_id.clone(),
                            email,
                            name: identity.display_name.clone(),
                            setup_token,
                        });
                    }
                    Err(e) => {
                        warn!(
                            external_id = %identity.external_id,
                            error = %e,
                            "failed to create record, skipping"
                        );
                    }
                }
            }
        }
    }

    // Deactivation pass: strictly after the whole roster has been applied.
    for record in &existing {
        let Some(ext) = record.external_id.as_deref() else {
            continue;
        };
        if record.is_active && !active_ids.contains(ext) {
            match store.deactivate(record.id).await {
                Ok(()) => outcome.deactivated += 1,
                Err(e) => {
                    warn!(user = %record.id, error = %e, "failed to deactivate record, skipping");
                }
            }
        }
    }

    Ok((outcome, pending))
}

/// The minimal change set converging one matched record onto its identity.
fn compute_diff(record: &InternalUserRecord, identity: &ExternalIdentity) -> UserDiff {
    UserDiff {
        link_external_id: record
            .external_id
            .is_none()
            .then(|| identity.external_id.clone()),
        rename: (record.name != identity.display_name).then(|| identity.display_name.clone()),
        reactivate: !record.is_active,
    }
}

/// One-time setup token and the hash that is persisted in its place.
fn generate_setup_token() -> (String, String) {
    let mut bytes = [0u8; SETUP_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let token = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hex::encode(Sha256::digest(token.as_bytes()));
    (token, hash)
}
