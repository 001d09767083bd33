// ── API-to-domain type conversions ──
//
// Bridges raw `clustersync_api` aggregator records into canonical
// `clustersync_core::model` types. Each `From` impl parses status strings
// into strong types and fills sensible defaults for missing optional data.

use clustersync_api::AggregatorResponse;
use clustersync_api::aggregator::{RawGuest, RawNetworkInterface, RawNode, RawStoragePool};

use crate::model::{
    Guest, GuestKind, GuestStatus, NetworkInterface, Node, NodeStatus, Snapshot, StoragePool,
};

// ── Helpers ────────────────────────────────────────────────────────

/// Parse an optional status string, falling back to the `Unknown` variant.
fn parse_or<T: std::str::FromStr>(raw: Option<&str>, fallback: T) -> T {
    raw.and_then(|s| s.parse().ok()).unwrap_or(fallback)
}

/// Storage and interface records report liveness in several shapes.
fn is_active_status(raw: Option<&str>) -> bool {
    matches!(raw, Some("active" | "available" | "online" | "up"))
}

// ── Resources ──────────────────────────────────────────────────────

impl From<RawNode> for Node {
    fn from(raw: RawNode) -> Self {
        Self {
            name: raw.name.unwrap_or_else(|| raw.id.clone()),
            status: parse_or(raw.status.as_deref(), NodeStatus::Unknown),
            cpu_usage: raw.cpu,
            cpu_count: raw.maxcpu,
            mem_used_bytes: raw.mem,
            mem_total_bytes: raw.maxmem,
            uptime_secs: raw.uptime,
            id: raw.id,
        }
    }
}

fn guest_from_raw(raw: RawGuest, kind: GuestKind) -> Guest {
    Guest {
        name: raw.name.unwrap_or_else(|| raw.id.clone()),
        kind,
        vmid: raw.vmid,
        node: raw.node,
        status: parse_or(raw.status.as_deref(), GuestStatus::Unknown),
        cpu_usage: raw.cpu,
        mem_used_bytes: raw.mem,
        mem_total_bytes: raw.maxmem,
        uptime_secs: raw.uptime,
        id: raw.id,
    }
}

impl From<RawStoragePool> for StoragePool {
    fn from(raw: RawStoragePool) -> Self {
        // Pools without a status field are assumed usable.
        let active = raw.status.is_none() || is_active_status(raw.status.as_deref());
        Self {
            id: raw.id,
            node: raw.node,
            pool_type: raw.pool_type,
            active,
            used_bytes: raw.used,
            total_bytes: raw.total,
        }
    }
}

impl From<RawNetworkInterface> for NetworkInterface {
    fn from(raw: RawNetworkInterface) -> Self {
        Self {
            name: raw.iface.unwrap_or_else(|| raw.id.clone()),
            id: raw.id,
            node: raw.node,
            iface_type: raw.iface_type,
            active: raw.active.unwrap_or(false),
            address: raw.address,
        }
    }
}

// ── Snapshot ───────────────────────────────────────────────────────

impl From<AggregatorResponse> for Snapshot {
    fn from(resp: AggregatorResponse) -> Self {
        Self {
            nodes: resp.nodes.into_iter().map(Node::from).collect(),
            vms: resp
                .vms
                .into_iter()
                .map(|g| guest_from_raw(g, GuestKind::Vm))
                .collect(),
            containers: resp
                .containers
                .into_iter()
                .map(|g| guest_from_raw(g, GuestKind::Container))
                .collect(),
            storage_pools: resp
                .storage_pools
                .into_iter()
                .map(StoragePool::from)
                .collect(),
            network_interfaces: resp
                .network_interfaces
                .into_iter()
                .map(NetworkInterface::from)
                .collect(),
        }
    }
}
