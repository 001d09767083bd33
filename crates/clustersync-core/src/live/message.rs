// ── Live channel frames ──
//
// Inbound frames are JSON objects `{ "type": <kind>, "data": <payload> }`.
// Each one becomes an `EventEnvelope`, is handed to the handler registered
// for its kind, and is then discarded.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::model::{Alert, AlertAck};

/// Frame kinds the live channel understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    Alert,
    Ack,
    Ping,
    Connected,
}

/// One decoded inbound frame.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// Why a frame was dropped.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown frame type '{0}'")]
    UnknownKind(String),

    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: MessageKind,
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl EventEnvelope {
    /// Parse one text frame received at `received_at`.
    pub fn parse(text: &str, received_at: DateTime<Utc>) -> Result<Self, FrameError> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let kind = raw
            .kind
            .parse()
            .map_err(|_| FrameError::UnknownKind(raw.kind.clone()))?;
        Ok(Self {
            kind,
            payload: raw.data,
            received_at,
        })
    }

    /// Decode an `alert` payload, stamped with the receive time.
    pub fn alert(&self) -> Result<Alert, FrameError> {
        let mut alert: Alert = self.decode()?;
        alert.received_at = self.received_at;
        Ok(alert)
    }

    /// Decode an `ack` payload.
    pub fn ack(&self) -> Result<AlertAck, FrameError> {
        self.decode()
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T, FrameError> {
        T::deserialize(&self.payload).map_err(|source| FrameError::Payload {
            kind: self.kind,
            source,
        })
    }
}

// ── Handler registry ─────────────────────────────────────────────────

type FrameHandler = Arc<dyn Fn(&EventEnvelope) + Send + Sync>;

/// Per-kind frame handlers supplied with `open()`.
///
/// Kinds without a handler are still published on the bus when they carry
/// bus-visible data (`alert`, `ack`).
#[derive(Clone, Default)]
pub struct LiveHandlers {
    handlers: HashMap<MessageKind, FrameHandler>,
}

impl LiveHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any earlier one.
    #[must_use]
    pub fn on<F>(mut self, kind: MessageKind, handler: F) -> Self
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    pub fn has(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Run the handler for `envelope.kind`, if any. A panic is logged and swallowed.
    pub fn dispatch(&self, envelope: &EventEnvelope) {
        let Some(handler) = self.handlers.get(&envelope.kind) else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| handler(envelope))).is_err() {
            tracing::error!(kind = %envelope.kind, "live frame handler panicked");
        }
    }
}

impl std::fmt::Debug for LiveHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
