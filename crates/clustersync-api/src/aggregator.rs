// Aggregator HTTP client
//
// Wraps `reqwest::Client` with the aggregator's request shape and
// `{ success, message, ...collections }` envelope handling. A
// `success: false` answer surfaces as `Error::Backend` with the server's
// message untouched.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, millis};
use crate::transport::TransportConfig;

/// Longest body excerpt carried inside an `Error::Http`.
const ERROR_BODY_LIMIT: usize = 512;

// ── Request ──────────────────────────────────────────────────────────

/// Identifies the cluster the aggregator should snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotRequest {
    /// Cluster API address, e.g. `https://pve-01:8006`.
    pub address: String,
    /// Account the aggregator authenticates as against the cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Request body on the wire: the snapshot request plus the session token.
#[derive(Serialize)]
struct RequestBody<'a> {
    #[serde(flatten)]
    request: &'a SnapshotRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

// ── Wire types ───────────────────────────────────────────────────────

/// Raw node record as sent by the aggregator.
#[derive(Debug, Clone, Deserialize)]
pub struct RawNode {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub maxcpu: Option<u32>,
    #[serde(default)]
    pub mem: Option<u64>,
    #[serde(default)]
    pub maxmem: Option<u64>,
    #[serde(default)]
    pub uptime: Option<u64>,
    /// All remaining fields the aggregator sends.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Raw guest record; shared by virtual machines and containers.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGuest {
    pub id: String,
    #[serde(default)]
    pub vmid: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub mem: Option<u64>,
    #[serde(default)]
    pub maxmem: Option<u64>,
    #[serde(default)]
    pub uptime: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Raw storage pool record.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStoragePool {
    pub id: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default, rename = "type")]
    pub pool_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub used: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Raw network interface record.
#[derive(Debug, Clone, Deserialize)]
pub struct RawNetworkInterface {
    pub id: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub iface: Option<String>,
    #[serde(default, rename = "type")]
    pub iface_type: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The aggregator envelope.
///
/// Collections missing from the body deserialize as empty.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub vms: Vec<RawGuest>,
    #[serde(default)]
    pub containers: Vec<RawGuest>,
    #[serde(default)]
    pub storage_pools: Vec<RawStoragePool>,
    #[serde(default)]
    pub network_interfaces: Vec<RawNetworkInterface>,
}

// ── Client ───────────────────────────────────────────────────────────

/// HTTP client for the cluster aggregator endpoint.
pub struct AggregatorClient {
    http: reqwest::Client,
    url: Url,
    /// Deadline baked into `http`, when known.
    timeout: Option<Duration>,
}

impl AggregatorClient {
    /// Create a client for `url` using the shared transport settings.
    pub fn new(url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            url,
            timeout: Some(transport.timeout),
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, url: Url) -> Self {
        Self {
            http,
            url,
            timeout: None,
        }
    }

    /// The aggregator endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch a full cluster snapshot.
    ///
    /// `token`, when present, is sent as a bearer credential. A response
    /// with `success: false` is returned as [`Error::Backend`].
    pub async fn fetch_snapshot(
        &self,
        request: &SnapshotRequest,
        token: Option<&SecretString>,
    ) -> Result<AggregatorResponse, Error> {
        debug!(url = %self.url, address = %request.address, "POST aggregator snapshot");

        let body = RequestBody {
            request,
            token: token.map(|t| t.expose_secret()),
        };
        let mut builder = self.http.post(self.url.clone()).json(&body);
        if let Some(token) = token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let resp = builder.send().await.map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;
        trace!(status = status.as_u16(), bytes = body.len(), "aggregator response");

        parse_response(status.as_u16(), &body)
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        match self.timeout {
            Some(timeout) if e.is_timeout() => Error::Timeout {
                timeout_ms: millis(timeout),
            },
            _ => Error::Transport(e),
        }
    }
}

/// Turn a raw status + body into a snapshot or a typed error.
///
/// Non-2xx bodies that still carry a `success: false` envelope surface as
/// [`Error::Backend`] so the server's message reaches the caller verbatim.
fn parse_response(status: u16, body: &str) -> Result<AggregatorResponse, Error> {
    let parsed = serde_json::from_str::<AggregatorResponse>(body);

    match parsed {
        Ok(envelope) if !envelope.success => Err(Error::Backend {
            message: envelope
                .message
                .unwrap_or_else(|| "aggregator reported failure".into()),
        }),
        Ok(envelope) if (200..300).contains(&status) => Ok(envelope),
        Ok(_) => Err(http_error(status, body)),
        Err(_) if !(200..300).contains(&status) => Err(http_error(status, body)),
        Err(e) => Err(Error::Deserialization {
            message: e.to_string(),
            body: body.to_owned(),
        }),
    }
}

fn http_error(status: u16, body: &str) -> Error {
    let message = body.chars().take(ERROR_BODY_LIMIT).collect();
    Error::Http { status, message }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_success_with_missing_collections() {
        let body = r#"{"success":true,"nodes":[{"id":"pve-01","status":"online"}]}"#;
        let resp = parse_response(200, body).unwrap();
        assert_eq!(resp.nodes.len(), 1);
        assert_eq!(resp.nodes[0].id, "pve-01");
        assert_eq!(resp.nodes[0].status.as_deref(), Some("online"));
        assert!(resp.vms.is_empty());
        assert!(resp.storage_pools.is_empty());
    }

    #[test]
    fn parse_camel_case_collections() {
        let body = r#"{
            "success": true,
            "storagePools": [{"id": "local-lvm", "type": "lvmthin", "used": 10, "total": 100}],
            "networkInterfaces": [{"id": "pve-01/vmbr0", "iface": "vmbr0", "type": "bridge"}]
        }"#;
        let resp = parse_response(200, body).unwrap();
        assert_eq!(resp.storage_pools[0].pool_type.as_deref(), Some("lvmthin"));
        assert_eq!(resp.network_interfaces[0].iface_type.as_deref(), Some("bridge"));
    }

    #[test]
    fn parse_backend_failure_keeps_message() {
        let body = r#"{"success":false,"message":"auth failed"}"#;
        let err = parse_response(200, body).unwrap_err();
        assert!(matches!(err, Error::Backend { ref message } if message == "auth failed"));
    }

    #[test]
    fn parse_backend_failure_on_error_status() {
        let body = r#"{"success":false,"message":"invalid ticket"}"#;
        let err = parse_response(401, body).unwrap_err();
        assert!(matches!(err, Error::Backend { ref message } if message == "invalid ticket"));
    }

    #[test]
    fn parse_non_json_error_status() {
        let err = parse_response(502, "Bad Gateway").unwrap_err();
        assert!(matches!(err, Error::Http { status: 502, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn parse_garbage_success_status() {
        let err = parse_response(200, "<html>").unwrap_err();
        assert!(matches!(err, Error::Deserialization { ref body, .. } if body == "<html>"));
    }

    #[test]
    fn unknown_fields_land_in_extra() {
        let body = r#"{"success":true,"nodes":[{"id":"pve-02","level":"c","ssl_fingerprint":"AB:CD"}]}"#;
        let resp = parse_response(200, body).unwrap();
        assert_eq!(resp.nodes[0].extra["level"], "c");
    }
}
