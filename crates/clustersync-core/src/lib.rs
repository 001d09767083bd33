//! Client-side state synchronization for cluster dashboards.
//!
//! This crate keeps a local mirror of a virtualization cluster (nodes,
//! guests, storage, network) fresh and pushes live alerts to decoupled
//! consumers:
//!
//! - **[`SnapshotCache`]**: One authoritative snapshot with a TTL. Readers
//!   never block; entries are swapped wholesale via `arc-swap`.
//!
//! - **[`RefreshOrchestrator`]**: Single-flight refresh against the
//!   aggregator. Concurrent [`ensure_loaded()`](RefreshOrchestrator::ensure_loaded)
//!   calls share one fetch and one outcome; results are announced on the bus.
//!
//! - **[`LiveEventClient`]**: Authenticated, self-reconnecting WebSocket
//!   channel driven by an explicit state machine with exponential backoff.
//!
//! - **[`EventBus`]**: Synchronous publish/subscribe over a closed set of
//!   [`Topic`]s with per-handler panic isolation.
//!
//! Nothing here is global: the credential source, cache, and bus are built
//! by the host and handed to each component.

pub mod bus;
pub mod cache;
pub mod config;
pub mod convert;
pub mod credentials;
pub mod error;
pub mod live;
pub mod model;
pub mod refresh;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{BusEvent, BusReceiver, EventBus, Subscription, Topic};
pub use cache::{CacheEntry, Clock, ManualClock, SnapshotCache, SystemClock};
pub use config::{ReconnectConfig, SyncConfig, TlsVerification};
pub use credentials::{CredentialSource, SessionCredentials};
pub use error::CoreError;
pub use live::{
    ConnectionState, EventEnvelope, LiveEventClient, LiveHandlers, LiveOptions, LiveTransport,
    MessageKind, WebSocketTransport,
};
pub use refresh::{AggregatorSource, RefreshOrchestrator, RefreshOutcome, SnapshotSource};

pub use model::{
    Alert, AlertAck, AlertSeverity, Guest, GuestKind, GuestStatus, NetworkInterface, Node,
    NodeStatus, Snapshot, StoragePool,
};
