#![allow(clippy::unwrap_used)]
// Integration tests for `AggregatorClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clustersync_api::{AggregatorClient, Error, SnapshotRequest, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, AggregatorClient) {
    let server = MockServer::start().await;
    let url = Url::parse(&format!("{}/api/cluster/snapshot", server.uri())).unwrap();
    let client = AggregatorClient::with_client(reqwest::Client::new(), url);
    (server, client)
}

fn request() -> SnapshotRequest {
    SnapshotRequest {
        address: "https://pve-01:8006".into(),
        username: Some("root@pam".into()),
    }
}

// ── Snapshot tests ──────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_snapshot_success() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/cluster/snapshot"))
        .and(body_json(json!({
            "address": "https://pve-01:8006",
            "username": "root@pam"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "nodes": [{ "id": "pve-01", "status": "online", "maxcpu": 16 }],
            "vms": [{ "id": "qemu/100", "vmid": 100, "name": "web", "node": "pve-01", "status": "running" }],
            "containers": [{ "id": "lxc/200", "vmid": 200, "name": "dns", "status": "stopped" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client.fetch_snapshot(&request(), None).await.unwrap();

    assert!(resp.success);
    assert_eq!(resp.nodes.len(), 1);
    assert_eq!(resp.nodes[0].maxcpu, Some(16));
    assert_eq!(resp.vms[0].vmid, Some(100));
    assert_eq!(resp.containers[0].status.as_deref(), Some("stopped"));
    assert!(resp.network_interfaces.is_empty());
}

#[tokio::test]
async fn test_fetch_snapshot_sends_bearer_token() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/cluster/snapshot"))
        .and(header("authorization", "Bearer s3cret"))
        .and(body_json(json!({
            "address": "https://pve-01:8006",
            "username": "root@pam",
            "token": "s3cret"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let token = SecretString::from("s3cret".to_string());
    let resp = client.fetch_snapshot(&request(), Some(&token)).await.unwrap();
    assert!(resp.nodes.is_empty());
}

#[tokio::test]
async fn test_fetch_snapshot_backend_failure() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/cluster/snapshot"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": false, "message": "auth failed" })),
        )
        .mount(&server)
        .await;

    let result = client.fetch_snapshot(&request(), None).await;

    assert!(
        matches!(result, Err(Error::Backend { ref message }) if message == "auth failed"),
        "expected Backend error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_fetch_snapshot_server_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/cluster/snapshot"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = client.fetch_snapshot(&request(), None).await.unwrap_err();

    assert!(
        matches!(err, Error::Http { status: 503, ref message } if message == "upstream unavailable"),
        "expected Http error, got: {err:?}"
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_fetch_snapshot_unauthorized_is_auth_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/cluster/snapshot"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let err = client.fetch_snapshot(&request(), None).await.unwrap_err();
    assert!(err.is_auth_rejected());
}

#[tokio::test]
async fn test_fetch_snapshot_timeout_reports_configured_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cluster/snapshot"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true }))
                .set_delay(std::time::Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/api/cluster/snapshot", server.uri())).unwrap();
    let transport = TransportConfig {
        timeout: std::time::Duration::from_millis(200),
        ..TransportConfig::default()
    };
    let client = AggregatorClient::new(url, &transport).unwrap();

    let err = client.fetch_snapshot(&request(), None).await.unwrap_err();
    assert!(
        matches!(err, Error::Timeout { timeout_ms: 200 }),
        "expected Timeout, got: {err:?}"
    );
    assert_eq!(err.to_string(), "Request timed out after 200ms");
    assert!(err.is_transient());
}
