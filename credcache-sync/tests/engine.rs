//! Synchronization engine behaviour against a scripted authority.

use std::sync::Arc;
use std::time::Duration;

use credcache_core::{CredentialClass, Payload, PROBE_SCHEMA, VPN_SERVICE_SCHEMA};
use credcache_storage::{CacheStore, InMemoryCacheStore};
use credcache_sync::{PollOutcome, SyncConfig, SyncEngine, SyncError, SyncWorker};
use credcache_test_utils::assertions::{assert_cached, assert_inventory, assert_not_cached};
use credcache_test_utils::fixtures::{self, probe_descriptor, probe_payloads};
use credcache_test_utils::MockAuthority;
use tokio::sync::watch;

type Worker<S> = SyncWorker<MockAuthority, S>;

async fn probe_worker<S: CacheStore>(authority: &Arc<MockAuthority>, store: &Arc<S>) -> Worker<S> {
    worker_for(CredentialClass::Probe, authority, store).await
}

async fn worker_for<S: CacheStore>(
    class: CredentialClass,
    authority: &Arc<MockAuthority>,
    store: &Arc<S>,
) -> Worker<S> {
    SyncEngine::new(
        class.schema(),
        Arc::clone(authority),
        Arc::clone(store),
        SyncConfig::default(),
    )
    .expect("built-in schema is valid")
    .init()
    .await
    .expect("init should succeed")
}

fn reconciled(outcome: PollOutcome) -> credcache_sync::ReconcileReport {
    match outcome {
        PollOutcome::Reconciled(report) => report,
        other => panic!("expected a reconciliation pass, got {:?}", other),
    }
}

#[tokio::test]
async fn test_add_writes_complete_entry() {
    let authority = Arc::new(MockAuthority::new());
    let store = Arc::new(InMemoryCacheStore::new());
    authority.publish(probe_descriptor("alice", "v1"), probe_payloads("v1"));

    let mut worker = probe_worker(&authority, &store).await;
    let report = reconciled(worker.poll_once().await);

    assert_eq!(report.written, 1);
    assert_eq!(report.failed, 0);
    assert_cached(store.as_ref(), &PROBE_SCHEMA, "alice", "v1");
    assert_eq!(
        store
            .get(&PROBE_SCHEMA, "alice", "host")
            .expect("read")
            .as_deref(),
        Some(&b"probe.example.com"[..])
    );
    assert_eq!(worker.snapshot().get("alice"), Some("v1"));
    assert_eq!(worker.last_index_version(), Some(1));
}

#[tokio::test]
async fn test_unchanged_version_does_no_work() {
    let authority = Arc::new(MockAuthority::new());
    let store = Arc::new(InMemoryCacheStore::new());
    authority.publish(probe_descriptor("alice", "v1"), probe_payloads("v1"));

    let mut worker = probe_worker(&authority, &store).await;
    reconciled(worker.poll_once().await);
    let writes = store.entries_written();

    assert_eq!(worker.poll_once().await, PollOutcome::Unchanged);
    assert_eq!(worker.poll_once().await, PollOutcome::Unchanged);

    assert_eq!(authority.index_calls(), 1);
    assert_eq!(authority.total_fetches(), 1);
    assert_eq!(store.entries_written(), writes);
}

#[tokio::test]
async fn test_idempotent_convergence_on_version_bump() {
    let authority = Arc::new(MockAuthority::new());
    let store = Arc::new(InMemoryCacheStore::new());
    authority.publish(probe_descriptor("alice", "v1"), probe_payloads("v1"));
    authority.publish(probe_descriptor("bob", "v1"), probe_payloads("v1"));

    let mut worker = probe_worker(&authority, &store).await;
    reconciled(worker.poll_once().await);
    let before = store.dump(&PROBE_SCHEMA).expect("dump");

    // A version bump without any change to this class re-reads the index but
    // fetches nothing and rewrites nothing.
    authority.set_version(authority.version() + 1);
    let report = reconciled(worker.poll_once().await);

    assert_eq!(report.carried, 2);
    assert_eq!(report.written, 0);
    assert_eq!(authority.total_fetches(), 2);
    assert_eq!(store.dump(&PROBE_SCHEMA).expect("dump"), before);
}

#[tokio::test]
async fn test_update_refetches_only_changed_credential() {
    let authority = Arc::new(MockAuthority::new());
    let store = Arc::new(InMemoryCacheStore::new());
    authority.publish(probe_descriptor("alice", "v1"), probe_payloads("v1"));
    authority.publish(probe_descriptor("bob", "v1"), probe_payloads("v1"));

    let mut worker = probe_worker(&authority, &store).await;
    reconciled(worker.poll_once().await);

    authority.publish(probe_descriptor("alice", "v2"), probe_payloads("v2"));
    let report = reconciled(worker.poll_once().await);

    assert_eq!(report.written, 1);
    assert_eq!(report.carried, 1);
    assert_eq!(authority.fetch_count(CredentialClass::Probe, "alice"), 2);
    assert_eq!(authority.fetch_count(CredentialClass::Probe, "bob"), 1);
    assert_cached(store.as_ref(), &PROBE_SCHEMA, "alice", "v2");
    assert_eq!(
        store
            .get(&PROBE_SCHEMA, "alice", "password")
            .expect("read")
            .as_deref(),
        Some(&b"pw-v2"[..])
    );
}

#[tokio::test]
async fn test_delete_removes_every_attribute() {
    let authority = Arc::new(MockAuthority::new());
    let store = Arc::new(InMemoryCacheStore::new());
    authority.publish(probe_descriptor("alice", "v1"), probe_payloads("v1"));
    authority.publish(probe_descriptor("bob", "v1"), probe_payloads("v1"));

    let mut worker = probe_worker(&authority, &store).await;
    reconciled(worker.poll_once().await);

    authority.remove(CredentialClass::Probe, "bob");
    let report = reconciled(worker.poll_once().await);

    assert_eq!(report.deleted, 1);
    assert_not_cached(store.as_ref(), &PROBE_SCHEMA, "bob");
    assert_cached(store.as_ref(), &PROBE_SCHEMA, "alice", "v1");
    assert!(!worker.snapshot().contains("bob"));
}

#[tokio::test]
async fn test_fetch_failure_skips_and_retries() {
    let authority = Arc::new(MockAuthority::new());
    let store = Arc::new(InMemoryCacheStore::new());
    authority.publish(probe_descriptor("alice", "v1"), probe_payloads("v1"));
    authority.publish(probe_descriptor("bob", "v1"), probe_payloads("v1"));
    authority.fail_payloads_for(CredentialClass::Probe, "bob", true);

    let mut worker = probe_worker(&authority, &store).await;
    let report = reconciled(worker.poll_once().await);

    assert_eq!(report.written, 1);
    assert_eq!(report.failed, 1);
    assert_cached(store.as_ref(), &PROBE_SCHEMA, "alice", "v1");
    assert_not_cached(store.as_ref(), &PROBE_SCHEMA, "bob");
    assert!(!worker.snapshot().contains("bob"));
    assert_eq!(worker.last_index_version(), None);

    // Same index version, but the failure is retried.
    authority.fail_payloads_for(CredentialClass::Probe, "bob", false);
    let report = reconciled(worker.poll_once().await);
    assert_eq!(report.written, 1);
    assert_eq!(report.carried, 1);
    assert_cached(store.as_ref(), &PROBE_SCHEMA, "bob", "v1");
    assert_eq!(worker.last_index_version(), Some(authority.version()));
}

#[tokio::test]
async fn test_incomplete_payloads_are_never_partially_written() {
    let authority = Arc::new(MockAuthority::new());
    let store = Arc::new(InMemoryCacheStore::new());
    authority.publish(
        probe_descriptor("alice", "v1"),
        vec![Payload::new("p12", vec![1, 2, 3])],
    );

    let mut worker = probe_worker(&authority, &store).await;
    let report = reconciled(worker.poll_once().await);

    assert_eq!(report.failed, 1);
    assert!(store.dump(&PROBE_SCHEMA).expect("dump").is_empty());
    assert_eq!(worker.metrics().snapshot().fetch_failures, 1);
}

#[tokio::test]
async fn test_failed_update_keeps_previous_entry() {
    let authority = Arc::new(MockAuthority::new());
    let store = Arc::new(InMemoryCacheStore::new());
    authority.publish(probe_descriptor("alice", "v1"), probe_payloads("v1"));

    let mut worker = probe_worker(&authority, &store).await;
    reconciled(worker.poll_once().await);

    authority.publish(probe_descriptor("alice", "v2"), probe_payloads("v2"));
    authority.fail_payloads_for(CredentialClass::Probe, "alice", true);
    let report = reconciled(worker.poll_once().await);

    assert_eq!(report.failed, 1);
    assert_cached(store.as_ref(), &PROBE_SCHEMA, "alice", "v1");
    assert_eq!(worker.snapshot().get("alice"), Some("v1"));

    authority.fail_payloads_for(CredentialClass::Probe, "alice", false);
    reconciled(worker.poll_once().await);
    assert_cached(store.as_ref(), &PROBE_SCHEMA, "alice", "v2");
}

#[tokio::test]
async fn test_store_write_failure_is_retried() {
    let authority = Arc::new(MockAuthority::new());
    let store = Arc::new(InMemoryCacheStore::new());
    authority.publish(probe_descriptor("alice", "v1"), probe_payloads("v1"));
    store.fail_writes_for("alice");

    let mut worker = probe_worker(&authority, &store).await;
    let report = reconciled(worker.poll_once().await);
    assert_eq!(report.failed, 1);
    assert_eq!(worker.metrics().snapshot().store_failures, 1);
    assert_not_cached(store.as_ref(), &PROBE_SCHEMA, "alice");

    store.clear_write_failures();
    reconciled(worker.poll_once().await);
    assert_cached(store.as_ref(), &PROBE_SCHEMA, "alice", "v1");
}

#[tokio::test]
async fn test_store_delete_failure_keeps_name_for_retry() {
    let authority = Arc::new(MockAuthority::new());
    let store = Arc::new(InMemoryCacheStore::new());
    authority.publish(probe_descriptor("alice", "v1"), probe_payloads("v1"));

    let mut worker = probe_worker(&authority, &store).await;
    reconciled(worker.poll_once().await);

    authority.remove(CredentialClass::Probe, "alice");
    store.fail_writes_for("alice");
    let report = reconciled(worker.poll_once().await);
    assert_eq!(report.failed, 1);
    assert!(worker.snapshot().contains("alice"));

    store.clear_write_failures();
    let report = reconciled(worker.poll_once().await);
    assert_eq!(report.deleted, 1);
    assert_not_cached(store.as_ref(), &PROBE_SCHEMA, "alice");
}

#[tokio::test]
async fn test_authority_outages_change_nothing() {
    let authority = Arc::new(MockAuthority::new());
    let store = Arc::new(InMemoryCacheStore::new());
    authority.publish(probe_descriptor("alice", "v1"), probe_payloads("v1"));

    let mut worker = probe_worker(&authority, &store).await;

    authority.set_fail_version(true);
    assert_eq!(worker.poll_once().await, PollOutcome::VersionUnavailable);
    authority.set_fail_version(false);

    authority.set_fail_index(true);
    assert_eq!(worker.poll_once().await, PollOutcome::IndexUnavailable);
    authority.set_fail_index(false);

    assert!(store.dump(&PROBE_SCHEMA).expect("dump").is_empty());
    assert_eq!(worker.metrics().snapshot().poll_failures, 2);
    assert!(!worker.metrics().has_reconciled());

    reconciled(worker.poll_once().await);
    assert_cached(store.as_ref(), &PROBE_SCHEMA, "alice", "v1");
}

#[tokio::test]
async fn test_init_failures_are_fatal() {
    let store = Arc::new(InMemoryCacheStore::new());

    let authority = Arc::new(MockAuthority::new());
    authority.set_fail_auth(true);
    let engine = SyncEngine::new(
        &PROBE_SCHEMA,
        Arc::clone(&authority),
        Arc::clone(&store),
        SyncConfig::default(),
    )
    .expect("valid schema");
    let (_tx, rx) = watch::channel(false);
    let err = engine.start(rx).await.expect_err("auth failure is fatal");
    assert!(matches!(err, SyncError::Authentication { .. }));

    let authority = Arc::new(MockAuthority::new());
    authority.set_fail_identity(true);
    let engine = SyncEngine::new(&PROBE_SCHEMA, authority, Arc::clone(&store), SyncConfig::default())
        .expect("valid schema");
    let err = engine.init().await.err().expect("identity failure is fatal");
    assert!(matches!(err, SyncError::Identity { .. }));

    store.set_fail_reads(true);
    let engine = SyncEngine::new(
        &PROBE_SCHEMA,
        Arc::new(MockAuthority::new()),
        Arc::clone(&store),
        SyncConfig::default(),
    )
    .expect("valid schema");
    let err = engine.init().await.err().expect("unreadable store is fatal");
    assert!(matches!(err, SyncError::Inventory { .. }));
}

#[tokio::test]
async fn test_restart_rebuilds_snapshot_from_lmdb() {
    let (store, _dir) = fixtures::temp_lmdb_store();
    let authority = Arc::new(MockAuthority::new());
    authority.publish(probe_descriptor("alice", "v1"), probe_payloads("v1"));
    authority.publish(probe_descriptor("bob", "v1"), probe_payloads("v1"));

    let mut first = probe_worker(&authority, &store).await;
    reconciled(first.poll_once().await);
    drop(first);

    // A new engine over the same store starts with the cached inventory and
    // fetches nothing for unchanged credentials.
    let mut second = probe_worker(&authority, &store).await;
    assert_eq!(second.snapshot().len(), 2);
    let report = reconciled(second.poll_once().await);
    assert_eq!(report.carried, 2);
    assert_eq!(authority.total_fetches(), 2);
}

#[tokio::test]
async fn test_classes_are_isolated() {
    let (store, _dir) = fixtures::temp_lmdb_store();
    let authority = Arc::new(MockAuthority::new());
    let (vpn, vpn_payloads) = fixtures::credential(CredentialClass::VpnService, "shared", "v7");
    authority.publish(probe_descriptor("shared", "v1"), probe_payloads("v1"));
    authority.publish(vpn, vpn_payloads);
    authority.fail_payloads_for(CredentialClass::Probe, "shared", true);

    let mut probe = worker_for(CredentialClass::Probe, &authority, &store).await;
    let mut vpn = worker_for(CredentialClass::VpnService, &authority, &store).await;

    reconciled(probe.poll_once().await);
    reconciled(vpn.poll_once().await);

    assert_not_cached(store.as_ref(), &PROBE_SCHEMA, "shared");
    assert_cached(store.as_ref(), &VPN_SERVICE_SCHEMA, "shared", "v7");
    assert_eq!(authority.class_fetches(CredentialClass::VpnService), 1);

    // Removing the vpn-service credential never touches the probe collection.
    authority.fail_payloads_for(CredentialClass::Probe, "shared", false);
    reconciled(probe.poll_once().await);
    authority.remove(CredentialClass::VpnService, "shared");
    reconciled(vpn.poll_once().await);

    assert_inventory(store.as_ref(), &VPN_SERVICE_SCHEMA, &[]);
    assert_inventory(store.as_ref(), &PROBE_SCHEMA, &[("shared", "v1")]);
}

#[tokio::test]
async fn test_run_converges_and_stops_on_shutdown() {
    let authority = Arc::new(MockAuthority::new());
    let store = Arc::new(InMemoryCacheStore::new());
    authority.publish(probe_descriptor("alice", "v1"), probe_payloads("v1"));

    let engine = SyncEngine::new(
        &PROBE_SCHEMA,
        Arc::clone(&authority),
        Arc::clone(&store),
        SyncConfig::default().with_poll_interval(Duration::from_millis(10)),
    )
    .expect("valid schema");
    let metrics = engine.metrics();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(engine.start(shutdown_rx));

    tokio::time::timeout(Duration::from_secs(5), async {
        while !metrics.has_reconciled() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("engine should reconcile");
    assert_cached(store.as_ref(), &PROBE_SCHEMA, "alice", "v1");

    authority.remove(CredentialClass::Probe, "alice");
    tokio::time::timeout(Duration::from_secs(5), async {
        while metrics.snapshot().deleted == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("engine should pick up the removal");
    assert_not_cached(store.as_ref(), &PROBE_SCHEMA, "alice");

    shutdown_tx.send(true).expect("engine is listening");
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("engine should stop")
        .expect("engine task should not panic");
    assert!(result.is_ok());
}
