// ── Cluster resource domain types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Node operational status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[non_exhaustive]
pub enum NodeStatus {
    Online,
    Offline,
    Unknown,
}

impl NodeStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Guest (VM or container) run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[non_exhaustive]
pub enum GuestStatus {
    Running,
    Stopped,
    Paused,
    Suspended,
    Unknown,
}

/// Which kind of guest a [`Guest`] record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GuestKind {
    Vm,
    Container,
}

/// A hypervisor node in the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub status: NodeStatus,
    /// CPU utilization as a fraction in `0.0..=1.0`.
    pub cpu_usage: Option<f64>,
    pub cpu_count: Option<u32>,
    pub mem_used_bytes: Option<u64>,
    pub mem_total_bytes: Option<u64>,
    pub uptime_secs: Option<u64>,
}

/// A virtual machine or container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    pub id: String,
    pub kind: GuestKind,
    pub vmid: Option<u64>,
    pub name: String,
    /// Node currently hosting the guest.
    pub node: Option<String>,
    pub status: GuestStatus,
    pub cpu_usage: Option<f64>,
    pub mem_used_bytes: Option<u64>,
    pub mem_total_bytes: Option<u64>,
    pub uptime_secs: Option<u64>,
}

impl Guest {
    pub fn is_running(&self) -> bool {
        matches!(self.status, GuestStatus::Running)
    }
}

/// A storage pool as seen from one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoragePool {
    pub id: String,
    pub node: Option<String>,
    pub pool_type: Option<String>,
    pub active: bool,
    pub used_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
}

impl StoragePool {
    /// Fraction of the pool in use, when both sizes are known.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn usage_ratio(&self) -> Option<f64> {
        match (self.used_bytes, self.total_bytes) {
            (Some(used), Some(total)) if total > 0 => Some(used as f64 / total as f64),
            _ => None,
        }
    }
}

/// A network interface on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub id: String,
    pub node: Option<String>,
    pub name: String,
    pub iface_type: Option<String>,
    pub active: bool,
    pub address: Option<String>,
}

/// Immutable point-in-time copy of the whole cluster.
///
/// One authoritative aggregate: there are no per-resource side caches that
/// could drift from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    pub vms: Vec<Guest>,
    pub containers: Vec<Guest>,
    pub storage_pools: Vec<StoragePool>,
    pub network_interfaces: Vec<NetworkInterface>,
}

impl Snapshot {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All guests (VMs then containers) hosted on `node`.
    pub fn guests_on<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a Guest> + 'a {
        self.vms
            .iter()
            .chain(self.containers.iter())
            .filter(move |g| g.node.as_deref() == Some(node))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.vms.is_empty()
            && self.containers.is_empty()
            && self.storage_pools.is_empty()
            && self.network_interfaces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guest(id: &str, kind: GuestKind, node: &str) -> Guest {
        Guest {
            id: id.into(),
            kind,
            vmid: None,
            name: id.into(),
            node: Some(node.into()),
            status: GuestStatus::Running,
            cpu_usage: None,
            mem_used_bytes: None,
            mem_total_bytes: None,
            uptime_secs: None,
        }
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Online".parse::<NodeStatus>().ok(), Some(NodeStatus::Online));
        assert_eq!("RUNNING".parse::<GuestStatus>().ok(), Some(GuestStatus::Running));
        assert!("rebooting".parse::<NodeStatus>().is_err());
    }

    #[test]
    fn guests_on_spans_vms_and_containers() {
        let snap = Snapshot {
            vms: vec![guest("qemu/100", GuestKind::Vm, "pve-01")],
            containers: vec![
                guest("lxc/200", GuestKind::Container, "pve-01"),
                guest("lxc/201", GuestKind::Container, "pve-02"),
            ],
            ..Snapshot::default()
        };
        let ids: Vec<_> = snap.guests_on("pve-01").map(|g| g.id.as_str()).collect();
        assert_eq!(ids, ["qemu/100", "lxc/200"]);
    }

    #[test]
    fn usage_ratio_requires_nonzero_total() {
        let mut pool = StoragePool {
            id: "local".into(),
            node: None,
            pool_type: None,
            active: true,
            used_bytes: Some(25),
            total_bytes: Some(100),
        };
        assert_eq!(pool.usage_ratio(), Some(0.25));
        pool.total_bytes = Some(0);
        assert_eq!(pool.usage_ratio(), None);
    }
}
