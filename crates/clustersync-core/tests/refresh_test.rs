#![allow(clippy::unwrap_used)]

// Integration tests for the refresh path against a wiremock aggregator.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clustersync_core::{
    AggregatorSource, BusEvent, CoreError, EventBus, NodeStatus, RefreshOrchestrator,
    SessionCredentials, SnapshotCache, SyncConfig, Topic,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (
    MockServer,
    RefreshOrchestrator<AggregatorSource>,
    EventBus,
) {
    let server = MockServer::start().await;
    let url = Url::parse(&format!("{}/api/cluster/snapshot", server.uri())).unwrap();
    let config = SyncConfig::new(url, "https://pve-01:8006");

    let credentials = Arc::new(SessionCredentials::with_token(SecretString::from(
        "session-token".to_string(),
    )));
    let source = AggregatorSource::from_config(&config, credentials).unwrap();

    let bus = EventBus::new();
    let cache = Arc::new(SnapshotCache::new(config.cache_ttl));
    let orchestrator =
        RefreshOrchestrator::new(source, cache, bus.clone(), config.refresh_timeout);
    (server, orchestrator, bus)
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_empty_cache_loads_snapshot() {
    let (server, orchestrator, bus) = setup().await;
    let mut updates = bus.receiver(&[Topic::Updated]);

    Mock::given(method("POST"))
        .and(path("/api/cluster/snapshot"))
        .and(header("authorization", "Bearer session-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "nodes": [{ "id": "pve-01", "status": "online" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(orchestrator.ensure_loaded().await);

    let cache = orchestrator.cache();
    assert!(cache.is_valid());
    let entry = cache.read().unwrap();
    assert_eq!(entry.payload.nodes.len(), 1);
    assert_eq!(entry.payload.nodes[0].id, "pve-01");
    assert_eq!(entry.payload.nodes[0].status, NodeStatus::Online);
    assert!(matches!(updates.try_recv(), Some(BusEvent::Updated { .. })));

    // Still valid: no second request (the mock expects exactly one).
    assert!(orchestrator.ensure_loaded().await);
}

#[tokio::test]
async fn test_backend_failure_is_reported_verbatim() {
    let (server, orchestrator, bus) = setup().await;
    let mut failures = bus.receiver(&[Topic::RefreshFailed]);

    Mock::given(method("POST"))
        .and(path("/api/cluster/snapshot"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": false, "message": "auth failed" })),
        )
        .mount(&server)
        .await;

    assert!(!orchestrator.ensure_loaded().await);
    assert!(orchestrator.cache().read().is_none());

    match failures.try_recv() {
        Some(BusEvent::RefreshFailed { error, .. }) => {
            assert!(matches!(error, CoreError::Backend { .. }));
            assert_eq!(error.to_string(), "auth failed");
        }
        other => panic!("expected RefreshFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_callers_hit_server_once() {
    let (server, orchestrator, _bus) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/cluster/snapshot"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "vms": [{ "id": "qemu/100" }] }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (a, b, c) = tokio::join!(
        orchestrator.refresh(),
        orchestrator.refresh(),
        orchestrator.ensure_loaded()
    );
    assert_eq!(a.refresh_id, b.refresh_id);
    assert!(a.is_success() && b.is_success() && c);
    assert_eq!(orchestrator.cache().vms().len(), 1);
}

#[tokio::test]
async fn test_unreachable_aggregator_leaves_cache_untouched() {
    let (server, orchestrator, _bus) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "nodes": [{ "id": "pve-01" }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    assert!(orchestrator.ensure_loaded().await);
    assert!(!orchestrator.force_refresh().await);
    assert_eq!(orchestrator.cache().nodes()[0].id, "pve-01");

    let last = orchestrator.last_outcome().unwrap();
    assert!(matches!(
        last.error(),
        Some(CoreError::ConnectionFailed { .. })
    ));
}
