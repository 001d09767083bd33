// ── Live alert channel ──
//
// `machine` holds the pure state machine, `message` the frame format and
// handler registry, `client` the supervised connection that drives both.

pub mod client;
pub mod machine;
pub mod message;

pub use client::{LiveEventClient, LiveOptions, LiveTransport, WebSocketTransport};
pub use machine::{ConnectionState, ReconnectPolicy};
pub use message::{EventEnvelope, FrameError, LiveHandlers, MessageKind};
