//! In-process publish/subscribe hub.
//!
//! [`EventBus`] decouples the producers of state changes (the refresh
//! orchestrator, the live channel) from the consumers that react to them.
//! Topics are a closed set ([`Topic`]), so every handler is statically tied
//! to a known event shape instead of a free-form string.
//!
//! ## Rules
//! - **Synchronous fan-out**: [`publish`](EventBus::publish) calls every
//!   handler of the event's topic before returning, in subscription order.
//! - **Isolation**: a panicking handler is logged and skipped; siblings still
//!   run and the publisher never sees the panic.
//! - **Snapshot dispatch**: the subscriber list is copied before dispatch, so
//!   handlers may subscribe or unsubscribe while a publish is in progress.
//! - **No persistence**: publishing with no subscribers is a no-op.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use strum::{Display, EnumIter};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{Alert, AlertAck};

// ── Topics and events ────────────────────────────────────────────────

/// Every topic the bus carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Topic {
    /// A refresh completed and the snapshot cache holds new data.
    Updated,
    /// A refresh failed; the cache was left as it was.
    RefreshFailed,
    /// The live channel is open.
    Connected,
    /// The live channel dropped.
    Disconnected,
    /// The live channel ran out of reconnect attempts.
    ReconnectExhausted,
    /// The live channel's credential was refused.
    AuthRejected,
    /// An alert arrived on the live channel.
    Alert,
    /// An alert was acknowledged.
    AlertAcknowledged,
}

/// An event carried through the bus.
#[derive(Debug, Clone)]
pub enum BusEvent {
    Updated {
        refresh_id: Uuid,
        fetched_at: DateTime<Utc>,
    },
    RefreshFailed {
        refresh_id: Uuid,
        error: CoreError,
    },
    Connected,
    Disconnected {
        reason: String,
    },
    ReconnectExhausted {
        attempts: u32,
        last_error: String,
    },
    AuthRejected {
        reason: String,
    },
    Alert(Arc<Alert>),
    AlertAcknowledged(AlertAck),
}

impl BusEvent {
    pub fn topic(&self) -> Topic {
        match self {
            Self::Updated { .. } => Topic::Updated,
            Self::RefreshFailed { .. } => Topic::RefreshFailed,
            Self::Connected => Topic::Connected,
            Self::Disconnected { .. } => Topic::Disconnected,
            Self::ReconnectExhausted { .. } => Topic::ReconnectExhausted,
            Self::AuthRejected { .. } => Topic::AuthRejected,
            Self::Alert(_) => Topic::Alert,
            Self::AlertAcknowledged(_) => Topic::AlertAcknowledged,
        }
    }
}

// ── EventBus ─────────────────────────────────────────────────────────

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

struct Registered {
    id: u64,
    handler: Handler,
}

struct BusInner {
    subscribers: DashMap<Topic, Vec<Registered>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, topic: Topic, id: u64) {
        if let Some(mut list) = self.subscribers.get_mut(&topic) {
            list.retain(|s| s.id != id);
        }
    }
}

/// Process-wide publish/subscribe hub.
///
/// Cheaply cloneable; all clones share one subscriber table.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register `handler` for `topic`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped or [`unsubscribe`](Subscription::unsubscribe)d.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .entry(topic)
            .or_default()
            .push(Registered {
                id,
                handler: Arc::new(handler),
            });

        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Deliver `event` to every current subscriber of its topic.
    pub fn publish(&self, event: BusEvent) {
        let topic = event.topic();

        // Copy the handler list so no map lock is held during dispatch.
        let handlers: Vec<Handler> = match self.inner.subscribers.get(&topic) {
            Some(list) => list.iter().map(|s| Arc::clone(&s.handler)).collect(),
            None => return,
        };

        tracing::trace!(%topic, subscribers = handlers.len(), "publishing");

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::error!(%topic, "bus handler panicked; continuing with remaining handlers");
            }
        }
    }

    /// Bridge one or more topics into an async receiver.
    ///
    /// Useful for task-based consumers that `select!` over several sources.
    /// Events published while the receiver is alive are queued unbounded.
    pub fn receiver(&self, topics: &[Topic]) -> BusReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = topics
            .iter()
            .map(|&topic| {
                let tx = tx.clone();
                self.subscribe(topic, move |event| {
                    // Receiver gone means the subscriptions are about to drop too.
                    let _ = tx.send(event.clone());
                })
            })
            .collect();

        BusReceiver { rx, subscriptions }
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner.subscribers.get(&topic).map_or(0, |list| list.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.inner.subscribers.len())
            .finish_non_exhaustive()
    }
}

// ── Subscription ─────────────────────────────────────────────────────

/// Handle to one registered handler.
///
/// Unsubscribes on drop. [`unsubscribe`](Self::unsubscribe) is idempotent
/// and only ever removes this handler.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    topic: Topic,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.topic, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ── BusReceiver ──────────────────────────────────────────────────────

/// Async view over one or more bus topics. Unsubscribes on drop.
#[derive(Debug)]
pub struct BusReceiver {
    rx: mpsc::UnboundedReceiver<BusEvent>,
    subscriptions: Vec<Subscription>,
}

impl BusReceiver {
    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        self.rx.recv().await
    }

    /// Take an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        self.rx.try_recv().ok()
    }

    pub fn topics(&self) -> impl Iterator<Item = Topic> + '_ {
        self.subscriptions.iter().map(Subscription::topic)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
