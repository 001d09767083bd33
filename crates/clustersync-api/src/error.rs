use thiserror::Error;

/// Top-level error type for the `clustersync-api` crate.
///
/// Covers every failure mode of the two wire surfaces: the aggregator
/// snapshot endpoint and the live alert WebSocket. `clustersync-core` maps
/// these into consumer-facing outcomes.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request exceeded the client's configured deadline.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Aggregator ──────────────────────────────────────────────────
    /// Non-success HTTP status from the aggregator endpoint.
    #[error("Aggregator returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The aggregator answered `success: false`.
    #[error("Aggregator reported failure: {message}")]
    Backend { message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The server refused the WebSocket handshake with an HTTP status.
    #[error("WebSocket handshake rejected (HTTP {status})")]
    WebSocketRejected { status: u16 },

    /// WebSocket closed by the server.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

/// Close codes the live channel uses to signal a rejected credential.
const AUTH_CLOSE_CODES: [u16; 2] = [4401, 4403];

/// Whole milliseconds in `d`, saturating.
pub fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Error {
    /// Returns `true` if the server rejected the credential outright.
    ///
    /// Covers a 401/403 on the handshake and the application close codes
    /// 4401/4403. Retrying with the same credential cannot succeed.
    pub fn is_auth_rejected(&self) -> bool {
        match self {
            Self::WebSocketRejected { status } | Self::Http { status, .. } => {
                matches!(status, 401 | 403)
            }
            Self::WebSocketClosed { code, .. } => AUTH_CLOSE_CODES.contains(code),
            Self::Transport(e) => e.status().is_some_and(|s| {
                s == reqwest::StatusCode::UNAUTHORIZED || s == reqwest::StatusCode::FORBIDDEN
            }),
            _ => false,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::WebSocketConnect(_) => true,
            Self::WebSocketClosed { .. } | Self::WebSocketRejected { .. } => {
                !self.is_auth_rejected()
            }
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_401_is_auth_rejected() {
        let err = Error::WebSocketRejected { status: 401 };
        assert!(err.is_auth_rejected());
        assert!(!err.is_transient());
    }

    #[test]
    fn auth_close_code_is_auth_rejected() {
        let err = Error::WebSocketClosed {
            code: 4403,
            reason: "token revoked".into(),
        };
        assert!(err.is_auth_rejected());
    }

    #[test]
    fn normal_close_is_transient() {
        let err = Error::WebSocketClosed {
            code: 1006,
            reason: String::new(),
        };
        assert!(!err.is_auth_rejected());
        assert!(err.is_transient());
    }

    #[test]
    fn backend_failure_is_not_transient() {
        let err = Error::Backend {
            message: "auth failed".into(),
        };
        assert!(!err.is_transient());
        assert!(!err.is_auth_rejected());
    }
}
