// ── Snapshot cache ──
//
// One authoritative copy of the most recent cluster snapshot plus its
// expiry. Entries are replaced wholesale through an atomic pointer swap,
// so readers never block and never observe a half-written snapshot.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, TimeDelta, Utc};

use crate::model::{Guest, NetworkInterface, Node, Snapshot, StoragePool};

// ── Clock ────────────────────────────────────────────────────────────

/// Time source for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Intended for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// ── CacheEntry ───────────────────────────────────────────────────────

/// A snapshot and the window during which it is considered fresh.
///
/// `expires_at` is always `fetched_at + ttl` of the cache that wrote it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Arc<Snapshot>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// ── SnapshotCache ────────────────────────────────────────────────────

/// Most recent cluster snapshot with time-based invalidation.
///
/// Never errors. Written only by the refresh orchestrator and [`clear`](Self::clear).
pub struct SnapshotCache {
    entry: ArcSwapOption<CacheEntry>,
    ttl: Duration,
    ttl_delta: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl SnapshotCache {
    /// Empty cache on the wall clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entry: ArcSwapOption::empty(),
            ttl,
            ttl_delta: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock,
        }
    }

    /// Current entry, fresh or not.
    pub fn read(&self) -> Option<Arc<CacheEntry>> {
        self.entry.load_full()
    }

    /// Replace the entry with `payload`, stamped now.
    pub fn write(&self, payload: Snapshot) -> Arc<CacheEntry> {
        let fetched_at = self.clock.now();
        let expires_at = fetched_at
            .checked_add_signed(self.ttl_delta)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let entry = Arc::new(CacheEntry {
            payload: Arc::new(payload),
            fetched_at,
            expires_at,
        });
        self.entry.store(Some(Arc::clone(&entry)));

        tracing::debug!(
            nodes = entry.payload.nodes.len(),
            vms = entry.payload.vms.len(),
            containers = entry.payload.containers.len(),
            %expires_at,
            "snapshot cached"
        );
        entry
    }

    /// `true` when an entry exists and has not yet expired.
    pub fn is_valid(&self) -> bool {
        let now = self.clock.now();
        self.entry
            .load()
            .as_ref()
            .is_some_and(|entry| entry.is_valid_at(now))
    }

    /// Drop the entry (logout, explicit reset).
    pub fn clear(&self) {
        if self.entry.swap(None).is_some() {
            tracing::debug!("snapshot cache cleared");
        }
    }

    /// How long ago the current entry was fetched.
    pub fn age(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.entry
            .load()
            .as_ref()
            .and_then(|entry| (now - entry.fetched_at).to_std().ok())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // ── Typed accessors ──────────────────────────────────────────────

    /// Current snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.entry
            .load()
            .as_ref()
            .map(|entry| Arc::clone(&entry.payload))
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.project(|s| &s.nodes)
    }

    pub fn vms(&self) -> Vec<Guest> {
        self.project(|s| &s.vms)
    }

    pub fn containers(&self) -> Vec<Guest> {
        self.project(|s| &s.containers)
    }

    pub fn storage_pools(&self) -> Vec<StoragePool> {
        self.project(|s| &s.storage_pools)
    }

    pub fn network_interfaces(&self) -> Vec<NetworkInterface> {
        self.project(|s| &s.network_interfaces)
    }

    fn project<T: Clone>(&self, field: impl Fn(&Snapshot) -> &Vec<T>) -> Vec<T> {
        self.entry
            .load()
            .as_ref()
            .map(|entry| field(&entry.payload).clone())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("ttl", &self.ttl)
            .field("entry", &self.entry.load().as_ref().map(|e| e.fetched_at))
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
