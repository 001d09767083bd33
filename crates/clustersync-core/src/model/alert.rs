// ── Live alert domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Alert severity as sent on the live channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// A cluster alert pushed over the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    /// Resource that raised the alert, e.g. `"node/pve-01"`.
    pub source: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    /// Local receive time, stamped when the frame was decoded.
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

/// Acknowledgement of a previously pushed alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertAck {
    pub alert_id: String,
}
