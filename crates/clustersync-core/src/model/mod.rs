// ── Domain model ──
//
// Canonical types for cluster resources and live alerts. Converted from
// `clustersync_api` wire types in `convert`.

pub mod alert;
pub mod resource;

pub use alert::{Alert, AlertAck, AlertSeverity};
pub use resource::{
    Guest, GuestKind, GuestStatus, NetworkInterface, Node, NodeStatus, Snapshot, StoragePool,
};
