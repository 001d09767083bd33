// ── Core error types ──
//
// Consumer-facing errors from clustersync-core. Consumers never see HTTP
// status codes or JSON parse failures directly. The
// `From<clustersync_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Not authenticated: no credential available")]
    NotAuthenticated,

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    /// The aggregator answered `success: false`; `message` is verbatim.
    #[error("{message}")]
    Backend { message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` when retrying with the same credential cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. } | Self::NotAuthenticated | Self::Config { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<clustersync_api::Error> for CoreError {
    fn from(err: clustersync_api::Error) -> Self {
        if err.is_auth_rejected() {
            return CoreError::AuthenticationFailed {
                message: err.to_string(),
            };
        }

        match err {
            clustersync_api::Error::Transport(ref e) => CoreError::ConnectionFailed {
                url: e
                    .url()
                    .map_or_else(|| "<unknown>".into(), ToString::to_string),
                reason: e.to_string(),
            },
            clustersync_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            clustersync_api::Error::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            clustersync_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            clustersync_api::Error::Http { status, message } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("HTTP {status}: {message}"),
            },
            clustersync_api::Error::Backend { message } => CoreError::Backend { message },
            clustersync_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            clustersync_api::Error::WebSocketRejected { status } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket handshake rejected (HTTP {status})"),
            },
            clustersync_api::Error::WebSocketClosed { code, reason } => {
                CoreError::ConnectionFailed {
                    url: String::new(),
                    reason: format!("WebSocket closed (code {code}): {reason}"),
                }
            }
            clustersync_api::Error::Deserialization { message, body: _ } => {
                CoreError::InvalidResponse { message }
            }
        }
    }
}
