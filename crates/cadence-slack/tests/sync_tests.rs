//! End-to-end sync runs: creation, reactivation, deactivation, idempotence,
//! onboarding delivery and billing aggregation, all against a mock platform
//! and the in-memory directory.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wiremock::MockServer;

use cadence_directory::{
    memory::make_member, DirectoryStore, MemoryDirectory, Organization,
};
use cadence_slack::config::{ChannelRef, SlackConfig};
use cadence_slack::sync::{engine, BillingError, BillingNotifier, ExternalIdentity, SyncService};
use cadence_slack::SyncError;

use common::*;

const CHANNEL_ID: &str = "C0123ABCD";

/// Records every billing call instead of delivering it.
#[derive(Default)]
struct RecordingBilling {
    calls: Mutex<Vec<(String, u32)>>,
    fail: bool,
}

impl RecordingBilling {
    fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BillingNotifier for RecordingBilling {
    async fn seats_added(&self, _org: &Organization, count: u32) -> Result<(), BillingError> {
        self.calls.lock().unwrap().push(("addition".into(), count));
        if self.fail {
            return Err(BillingError {
                detail: "billing rejected".into(),
            });
        }
        Ok(())
    }

    async fn seats_removed(&self, _org: &Organization, count: u32) -> Result<(), BillingError> {
        self.calls.lock().unwrap().push(("removal".into(), count));
        if self.fail {
            return Err(BillingError {
                detail: "billing rejected".into(),
            });
        }
        Ok(())
    }
}

struct Harness {
    server: MockServer,
    store: Arc<MemoryDirectory>,
    billing: Arc<RecordingBilling>,
    service: SyncService,
    org: Organization,
}

async fn harness() -> Harness {
    harness_with_billing(RecordingBilling::default()).await
}

async fn harness_with_billing(billing: RecordingBilling) -> Harness {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryDirectory::new());
    let org = store.add_organization("acme", "Acme", Some("T0001"));
    let billing = Arc::new(billing);

    let mut config = SlackConfig::new(
        None,
        ChannelRef::Id(CHANNEL_ID.into()),
        "https://app.cadence.test".into(),
    );
    config.api_base_url = server.uri();
    config.bot_token = Some("xoxb-test".into());

    let service = SyncService::new(
        Arc::new(config),
        store.clone() as Arc<dyn DirectoryStore>,
        billing.clone(),
    )
    .with_send_delay(Duration::ZERO);

    Harness {
        server,
        store,
        billing,
        service,
        org,
    }
}

/// Mount a healthy platform with the given member ids.
async fn mount_channel(server: &MockServer, member_ids: &[&str]) {
    mount_channel_info_ok(server, CHANNEL_ID).await;
    let ids: Vec<String> = member_ids.iter().map(|s| (*s).to_string()).collect();
    mount_member_pages(server, vec![members_body(&ids, None)]).await;
    mount_profiles(server, ProfileResponder::new()).await;
    mount_messaging(server, OpenDmResponder::new()).await;
}

#[tokio::test]
async fn test_new_member_creates_record_and_onboards() {
    let h = harness().await;
    mount_channel(&h.server, &["U0002"]).await;

    let outcome = h.service.sync_organization(&h.org).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.onboarded, 1);
    assert_eq!(outcome.onboarding_errors, 0);

    let record = h
        .store
        .find_by_external_id(h.org.id, "U0002")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.email, "u0002@acme.test");
    assert!(record.is_active);

    assert_eq!(h.billing.calls(), vec![("addition".to_string(), 1)]);
}

#[tokio::test]
async fn test_member_who_left_is_deactivated_not_deleted() {
    let h = harness().await;
    let leaver = make_member(h.org.id, Some("U0001"), "leaver@acme.test");
    let leaver_id = leaver.id;
    h.store.seed_user(leaver);
    h.store
        .seed_user(make_member(h.org.id, Some("U0002"), "u0002@acme.test"));
    mount_channel(&h.server, &["U0002"]).await;

    let outcome = h.service.sync_organization(&h.org).await;

    assert_eq!(outcome.deactivated, 1);
    assert_eq!(outcome.created, 0);

    let users = h.store.list_users(h.org.id).await.unwrap();
    assert_eq!(users.len(), 2, "soft delete only");
    let leaver = users.iter().find(|u| u.id == leaver_id).unwrap();
    assert!(!leaver.is_active);

    assert_eq!(h.billing.calls(), vec![("removal".to_string(), 1)]);
}

#[tokio::test]
async fn test_returning_member_is_reactivated_with_same_id() {
    let h = harness().await;
    let mut returning = make_member(h.org.id, Some("U0002"), "u0002@acme.test");
    returning.is_active = false;
    let original_id = returning.id;
    h.store.seed_user(returning);
    mount_channel(&h.server, &["U0002"]).await;

    let outcome = h.service.sync_organization(&h.org).await;

    assert_eq!(outcome.reactivated, 1);
    assert_eq!(outcome.created, 0, "reactivated, not recreated");

    let record = h
        .store
        .find_by_external_id(h.org.id, "U0002")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.id, original_id);
    assert!(record.is_active);

    // Reactivations count as seat additions.
    assert_eq!(h.billing.calls(), vec![("addition".to_string(), 1)]);
}

#[tokio::test]
async fn test_email_match_backfills_external_id_without_duplicate() {
    let h = harness().await;
    let existing = make_member(h.org.id, None, "U0002@acme.test");
    h.store.seed_user(existing);
    mount_channel(&h.server, &["U0002"]).await;

    let outcome = h.service.sync_organization(&h.org).await;

    assert_eq!(outcome.created, 0);
    assert_eq!(outcome.reactivated, 0);
    let users = h.store.list_users(h.org.id).await.unwrap();
    assert_eq!(users.len(), 1, "matched by email, no duplicate created");
    assert_eq!(users[0].external_id.as_deref(), Some("U0002"));

    // No additions, no removals: billing stays quiet.
    assert!(h.billing.calls().is_empty());
}

#[tokio::test]
async fn test_second_run_with_unchanged_roster_is_noop() {
    let h = harness().await;
    mount_channel(&h.server, &["U0002", "U0003"]).await;

    let first = h.service.sync_organization(&h.org).await;
    assert_eq!(first.created, 2);

    let second = h.service.sync_organization(&h.org).await;
    assert!(second.error.is_none());
    assert!(second.is_noop());
    assert_eq!(second.created, 0);
    assert_eq!(second.reactivated, 0);
    assert_eq!(second.deactivated, 0);
}

#[tokio::test]
async fn test_onboarding_failure_is_counted_not_fatal() {
    let h = harness().await;
    mount_channel_info_ok(&h.server, CHANNEL_ID).await;
    mount_member_pages(
        &h.server,
        vec![members_body(&["U0002".into(), "U0003".into()], None)],
    )
    .await;
    mount_profiles(&h.server, ProfileResponder::new()).await;
    mount_messaging(&h.server, OpenDmResponder::new().failing_for(&["U0003"])).await;

    let outcome = h.service.sync_organization(&h.org).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.created, 2);
    assert_eq!(outcome.onboarded, 1);
    assert_eq!(outcome.onboarding_errors, 1);
}

#[tokio::test]
async fn test_billing_failure_does_not_fail_the_sync() {
    let h = harness_with_billing(RecordingBilling::failing()).await;
    mount_channel(&h.server, &["U0002"]).await;

    let outcome = h.service.sync_organization(&h.org).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.created, 1);
    assert_eq!(h.billing.calls(), vec![("addition".to_string(), 1)]);
}

#[tokio::test]
async fn test_overlapping_runs_are_refused() {
    let h = harness().await;
    mount_channel(&h.server, &["U0002"]).await;

    let _permit = h.service.gate().try_acquire(h.org.id).unwrap();
    let outcome = h.service.sync_organization(&h.org).await;

    match outcome.error {
        Some(SyncError::AlreadyRunning { ref organization }) => assert_eq!(organization, "acme"),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert!(outcome.is_noop());
}

#[tokio::test]
async fn test_missing_bot_token_is_structured_failure() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryDirectory::new());
    let org = store.add_organization("acme", "Acme", Some("T0001"));

    let mut config = SlackConfig::new(
        None,
        ChannelRef::Id(CHANNEL_ID.into()),
        "https://app.cadence.test".into(),
    );
    config.api_base_url = server.uri();
    // No bot token anywhere.

    let service = SyncService::new(
        Arc::new(config),
        store as Arc<dyn DirectoryStore>,
        Arc::new(RecordingBilling::default()),
    );

    let outcome = service.sync_organization(&org).await;
    let error = outcome.error.expect("must carry a structured error");
    assert_eq!(error.error_code(), "missing_token");
    assert!(!error.remediation().is_empty());
}

#[tokio::test]
async fn test_unknown_slug_is_structured_failure() {
    let h = harness().await;
    let outcome = h.service.sync_by_slug("nope").await;
    assert_eq!(
        outcome.error.expect("must fail").error_code(),
        "unknown_organization"
    );
}

#[tokio::test]
async fn test_engine_deactivates_when_roster_is_empty() {
    // Directly at the engine boundary: an empty roster deactivates every
    // linked active record (the fetcher would have refused an empty channel
    // earlier with no_members).
    let store = MemoryDirectory::new();
    let org = store.add_organization("acme", "Acme", None);
    let u1 = make_member(org.id, Some("E1"), "u1@acme.test");
    let u1_id = u1.id;
    store.seed_user(u1);

    let fetched: Vec<ExternalIdentity> = vec![];
    let (outcome, pending) = engine::reconcile(&store, org.id, &fetched).await.unwrap();

    assert_eq!(outcome.deactivated, 1);
    assert!(pending.is_empty());
    let users = store.list_users(org.id).await.unwrap();
    assert_eq!(users[0].id, u1_id);
    assert!(!users[0].is_active);
}

#[tokio::test]
async fn test_engine_inactive_identity_does_not_protect_record() {
    // A member that became a deleted account stays in the roster snapshot as
    // inactive; its record is deactivated like any other absentee.
    let store = MemoryDirectory::new();
    let org = store.add_organization("acme", "Acme", None);
    store.seed_user(make_member(org.id, Some("U1"), "u1@acme.test"));

    let fetched = vec![ExternalIdentity {
        external_id: "U1".into(),
        display_name: "u1".into(),
        email: Some("u1@acme.test".into()),
        is_active: false,
    }];
    let (outcome, _) = engine::reconcile(&store, org.id, &fetched).await.unwrap();

    assert_eq!(outcome.deactivated, 1);
    assert_eq!(outcome.created, 0);
}
