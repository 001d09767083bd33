// ── Runtime synchronization configuration ──
//
// These types describe *where* cluster state comes from and how the sync
// layer paces itself. They never touch disk: the CLI (or any other host)
// builds a `SyncConfig` and hands it in.

use std::time::Duration;

use url::Url;

/// Default lifetime of a cached snapshot.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// Default deadline for one aggregator call.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);
/// Default interval for hosts that poll `ensure_loaded()`.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Default window without any inbound frame before the channel is dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed cluster hosts).
    DangerAcceptInvalid,
}

/// Exponential backoff configuration for live channel reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub base_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Consecutive failed attempts tolerated before giving up. Default: 5.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Configuration for synchronizing with a single cluster.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Aggregator snapshot endpoint.
    pub aggregator_url: Url,
    /// Live alert channel address. `None` disables the live channel.
    pub live_url: Option<Url>,
    /// Cluster API address the aggregator should snapshot.
    pub cluster_address: String,
    /// Account name forwarded to the aggregator.
    pub username: Option<String>,
    /// TLS verification strategy for HTTP calls.
    pub tls: TlsVerification,
    /// Transport-level HTTP timeout.
    pub timeout: Duration,
    /// How long a snapshot stays valid.
    pub cache_ttl: Duration,
    /// Deadline for one refresh; all waiters fail together when it passes.
    pub refresh_timeout: Duration,
    /// Interval used by [`spawn_poller`](crate::RefreshOrchestrator::spawn_poller).
    pub poll_interval: Duration,
    /// Live channel backoff policy.
    pub reconnect: ReconnectConfig,
    /// Drop the live channel after this long without a frame. `None` = never.
    pub idle_timeout: Option<Duration>,
}

impl SyncConfig {
    /// Config with default pacing for the given aggregator and cluster.
    pub fn new(aggregator_url: Url, cluster_address: impl Into<String>) -> Self {
        Self {
            aggregator_url,
            live_url: None,
            cluster_address: cluster_address.into(),
            username: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            cache_ttl: DEFAULT_CACHE_TTL,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect: ReconnectConfig::default(),
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn new_config_uses_default_pacing() {
        let url = Url::parse("https://dash.example/api/cluster/snapshot").unwrap();
        let config = SyncConfig::new(url, "https://pve-01:8006");
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.refresh_timeout, Duration::from_secs(15));
        assert!(config.live_url.is_none());
    }
}
