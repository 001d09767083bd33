// ── Single-flight refresh orchestration ──
//
// At most one aggregator fetch is in flight per orchestrator. Callers that
// arrive while it runs join it and receive the same outcome. The fetch runs
// on its own task, so it completes (and updates the cache) even when every
// waiter has gone away.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use clustersync_api::error::millis;
use clustersync_api::{AggregatorClient, SnapshotRequest, TlsMode, TransportConfig};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::bus::{BusEvent, EventBus};
use crate::cache::{CacheEntry, SnapshotCache};
use crate::config::{SyncConfig, TlsVerification};
use crate::credentials::CredentialSource;
use crate::error::CoreError;
use crate::model::Snapshot;

// ── Snapshot sources ─────────────────────────────────────────────────

/// Something that can produce a full cluster snapshot.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<Snapshot, CoreError>> + Send;
}

/// Production source: POSTs to the aggregator with the session credential.
pub struct AggregatorSource {
    client: AggregatorClient,
    request: SnapshotRequest,
    credentials: Arc<dyn CredentialSource>,
}

impl AggregatorSource {
    pub fn new(
        client: AggregatorClient,
        request: SnapshotRequest,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            client,
            request,
            credentials,
        }
    }

    /// Build the HTTP client and request from a [`SyncConfig`].
    pub fn from_config(
        config: &SyncConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: tls_mode(&config.tls),
            timeout: config.timeout,
        };
        let client = AggregatorClient::new(config.aggregator_url.clone(), &transport)?;
        let request = SnapshotRequest {
            address: config.cluster_address.clone(),
            username: config.username.clone(),
        };
        Ok(Self::new(client, request, credentials))
    }
}

fn tls_mode(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

impl SnapshotSource for AggregatorSource {
    async fn fetch(&self) -> Result<Snapshot, CoreError> {
        let token = self.credentials.token();
        let response = self
            .client
            .fetch_snapshot(&self.request, token.as_ref())
            .await?;
        Ok(Snapshot::from(response))
    }
}

impl std::fmt::Debug for AggregatorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatorSource")
            .field("url", &self.client.url().as_str())
            .field("address", &self.request.address)
            .finish_non_exhaustive()
    }
}

// ── Outcome ──────────────────────────────────────────────────────────

/// Result of one refresh, shared by every caller that joined it.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub refresh_id: Uuid,
    pub result: Result<Arc<CacheEntry>, CoreError>,
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&CoreError> {
        self.result.as_ref().err()
    }
}

struct PendingRefresh {
    id: Uuid,
    outcome: Shared<BoxFuture<'static, RefreshOutcome>>,
}

// ── RefreshOrchestrator ──────────────────────────────────────────────

struct Inner<S> {
    source: S,
    cache: Arc<SnapshotCache>,
    bus: EventBus,
    timeout: Duration,
    /// Never held across an await.
    pending: Mutex<Option<PendingRefresh>>,
    last_outcome: ArcSwapOption<RefreshOutcome>,
}

/// Coalesces refresh requests into at most one in-flight fetch.
///
/// Cheaply cloneable; clones share the in-flight slot.
pub struct RefreshOrchestrator<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for RefreshOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SnapshotSource> RefreshOrchestrator<S> {
    /// `timeout` bounds each fetch; when it passes, every waiter fails together.
    pub fn new(source: S, cache: Arc<SnapshotCache>, bus: EventBus, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                cache,
                bus,
                timeout,
                pending: Mutex::new(None),
                last_outcome: ArcSwapOption::empty(),
            }),
        }
    }

    /// `true` once the cache holds valid data; `false` if the refresh failed.
    ///
    /// Makes no network call while the cache is still valid.
    pub async fn ensure_loaded(&self) -> bool {
        if self.inner.cache.is_valid() {
            trace!("snapshot cache valid, skipping refresh");
            return true;
        }
        self.refresh().await.is_success()
    }

    /// Fetch regardless of cache validity. Still joins an in-flight refresh.
    pub async fn force_refresh(&self) -> bool {
        self.refresh().await.is_success()
    }

    /// Start a refresh, or join the one already running, and wait for it.
    pub async fn refresh(&self) -> RefreshOutcome {
        let outcome = {
            let mut slot = self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(pending) => {
                    debug!(refresh_id = %pending.id, "joining in-flight refresh");
                    pending.outcome.clone()
                }
                None => {
                    let pending = self.start();
                    let outcome = pending.outcome.clone();
                    *slot = Some(pending);
                    outcome
                }
            }
        };
        outcome.await
    }

    /// Spawn the fetch task. Caller must hold the `pending` lock.
    fn start(&self) -> PendingRefresh {
        let id = Uuid::new_v4();
        let inner = Arc::clone(&self.inner);
        let task: JoinHandle<RefreshOutcome> = tokio::spawn(async move { inner.run(id).await });

        let outcome = async move {
            task.await.unwrap_or_else(|e| RefreshOutcome {
                refresh_id: id,
                result: Err(CoreError::Internal(format!("refresh task failed: {e}"))),
            })
        }
        .boxed()
        .shared();

        PendingRefresh { id, outcome }
    }

    /// `true` while a fetch is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Outcome of the most recently completed refresh.
    pub fn last_outcome(&self) -> Option<Arc<RefreshOutcome>> {
        self.inner.last_outcome.load_full()
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.inner.cache
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Periodically call [`ensure_loaded`](Self::ensure_loaded) until `cancel` fires.
    ///
    /// The first check happens one `period` after spawning.
    pub fn spawn_poller(&self, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if !orchestrator.ensure_loaded().await {
                            warn!("periodic refresh failed");
                        }
                    }
                }
            }
            debug!("refresh poller stopped");
        })
    }
}

impl<S: SnapshotSource> Inner<S> {
    async fn run(&self, id: Uuid) -> RefreshOutcome {
        debug!(refresh_id = %id, "refresh started");

        let fetched = AssertUnwindSafe(tokio::time::timeout(self.timeout, self.source.fetch()))
            .catch_unwind()
            .await;

        let result = match fetched {
            Ok(Ok(Ok(snapshot))) => Ok(self.cache.write(snapshot)),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_elapsed)) => Err(CoreError::Timeout {
                timeout_ms: millis(self.timeout),
            }),
            Err(_panic) => Err(CoreError::Internal("snapshot source panicked".into())),
        };

        let outcome = RefreshOutcome {
            refresh_id: id,
            result,
        };

        {
            let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|p| p.id == id) {
                *slot = None;
            }
        }
        self.last_outcome.store(Some(Arc::new(outcome.clone())));

        match &outcome.result {
            Ok(entry) => {
                info!(refresh_id = %id, nodes = entry.payload.nodes.len(), "refresh complete");
                self.bus.publish(BusEvent::Updated {
                    refresh_id: id,
                    fetched_at: entry.fetched_at,
                });
            }
            Err(e) => {
                warn!(refresh_id = %id, error = %e, "refresh failed");
                self.bus.publish(BusEvent::RefreshFailed {
                    refresh_id: id,
                    error: e.clone(),
                });
            }
        }

        outcome
    }
}

impl<S> std::fmt::Debug for RefreshOrchestrator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshOrchestrator")
            .field("timeout", &self.inner.timeout)
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
