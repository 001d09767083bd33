//! `snapshot` command: load once through the refresh orchestrator and print.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use clustersync_core::{
    AggregatorSource, CoreError, EventBus, Guest, GuestStatus, NetworkInterface, Node, NodeStatus,
    RefreshOrchestrator, SessionCredentials, Snapshot, SnapshotCache, StoragePool,
};

use crate::cli::{GlobalOpts, ResourceKind, SnapshotArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output::{self, Tone, fmt_percent, fmt_uptime, fmt_usage, paint};

// ── Row types ────────────────────────────────────────────────────────

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
}

#[derive(Tabled)]
struct GuestRow {
    #[tabled(rename = "VMID")]
    vmid: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

#[derive(Tabled)]
struct StorageRow {
    #[tabled(rename = "Pool")]
    id: String,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Type")]
    pool_type: String,
    #[tabled(rename = "Active")]
    active: String,
    #[tabled(rename = "Used")]
    used: String,
}

#[derive(Tabled)]
struct InterfaceRow {
    #[tabled(rename = "Interface")]
    name: String,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Type")]
    iface_type: String,
    #[tabled(rename = "Active")]
    active: String,
    #[tabled(rename = "Address")]
    address: String,
}

#[derive(Clone, Tabled, Serialize)]
struct SummaryRow {
    #[tabled(rename = "Resource")]
    resource: &'static str,
    #[tabled(rename = "Total")]
    total: usize,
    #[tabled(rename = "Up")]
    up: usize,
}

fn dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_owned()
}

fn yes_no(active: bool, color: bool) -> String {
    if active {
        paint("yes", Tone::Good, color)
    } else {
        paint("no", Tone::Bad, color)
    }
}

fn node_row(node: &Node, color: bool) -> NodeRow {
    let tone = match node.status {
        NodeStatus::Online => Tone::Good,
        NodeStatus::Offline => Tone::Bad,
        _ => Tone::Muted,
    };
    NodeRow {
        name: node.name.clone(),
        status: paint(&node.status.to_string(), tone, color),
        cpu: fmt_percent(node.cpu_usage),
        memory: fmt_usage(node.mem_used_bytes, node.mem_total_bytes),
        uptime: fmt_uptime(node.uptime_secs),
    }
}

fn guest_row(guest: &Guest, color: bool) -> GuestRow {
    let tone = match guest.status {
        GuestStatus::Running => Tone::Good,
        GuestStatus::Paused | GuestStatus::Suspended => Tone::Warn,
        GuestStatus::Stopped => Tone::Muted,
        _ => Tone::Bad,
    };
    GuestRow {
        vmid: guest.vmid.map_or_else(|| "-".into(), |id| id.to_string()),
        name: guest.name.clone(),
        node: dash(guest.node.as_deref()),
        status: paint(&guest.status.to_string(), tone, color),
        cpu: fmt_percent(guest.cpu_usage),
        memory: fmt_usage(guest.mem_used_bytes, guest.mem_total_bytes),
    }
}

fn storage_row(pool: &StoragePool, color: bool) -> StorageRow {
    let used = match pool.usage_ratio() {
        Some(ratio) => format!(
            "{} ({})",
            fmt_usage(pool.used_bytes, pool.total_bytes),
            fmt_percent(Some(ratio))
        ),
        None => fmt_usage(pool.used_bytes, pool.total_bytes),
    };
    StorageRow {
        id: pool.id.clone(),
        node: dash(pool.node.as_deref()),
        pool_type: dash(pool.pool_type.as_deref()),
        active: yes_no(pool.active, color),
        used,
    }
}

fn interface_row(iface: &NetworkInterface, color: bool) -> InterfaceRow {
    InterfaceRow {
        name: iface.name.clone(),
        node: dash(iface.node.as_deref()),
        iface_type: dash(iface.iface_type.as_deref()),
        active: yes_no(iface.active, color),
        address: dash(iface.address.as_deref()),
    }
}

fn summary(snapshot: &Snapshot) -> Vec<SummaryRow> {
    vec![
        SummaryRow {
            resource: "nodes",
            total: snapshot.nodes.len(),
            up: snapshot.nodes.iter().filter(|n| n.status.is_online()).count(),
        },
        SummaryRow {
            resource: "vms",
            total: snapshot.vms.len(),
            up: snapshot.vms.iter().filter(|g| g.is_running()).count(),
        },
        SummaryRow {
            resource: "containers",
            total: snapshot.containers.len(),
            up: snapshot.containers.iter().filter(|g| g.is_running()).count(),
        },
        SummaryRow {
            resource: "storage",
            total: snapshot.storage_pools.len(),
            up: snapshot.storage_pools.iter().filter(|p| p.active).count(),
        },
        SummaryRow {
            resource: "network",
            total: snapshot.network_interfaces.len(),
            up: snapshot.network_interfaces.iter().filter(|i| i.active).count(),
        },
    ]
}

// ── Handler ──────────────────────────────────────────────────────────

/// Build an orchestrator for `resolved` on a fresh cache and bus.
pub fn orchestrator(
    resolved: &Resolved,
    credentials: Arc<SessionCredentials>,
    bus: EventBus,
) -> Result<RefreshOrchestrator<AggregatorSource>, CliError> {
    let source = AggregatorSource::from_config(&resolved.sync, credentials)?;
    let cache = Arc::new(SnapshotCache::new(resolved.sync.cache_ttl));
    Ok(RefreshOrchestrator::new(
        source,
        cache,
        bus,
        resolved.sync.refresh_timeout,
    ))
}

pub async fn handle(
    args: SnapshotArgs,
    resolved: &Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let credentials = Arc::new(SessionCredentials::with_token(resolved.token.clone()));
    let orchestrator = orchestrator(resolved, credentials, EventBus::new())?;

    if !orchestrator.ensure_loaded().await {
        let err = orchestrator
            .last_outcome()
            .and_then(|outcome| outcome.error().cloned())
            .unwrap_or_else(|| CoreError::Internal("refresh failed without an outcome".into()));
        return Err(match CliError::from(err) {
            CliError::AuthFailed { message, .. } => CliError::AuthFailed {
                profile: resolved.profile.clone(),
                message,
            },
            other => other,
        });
    }

    let cache = orchestrator.cache();
    let Some(snapshot) = cache.snapshot() else {
        return Err(CliError::Internal("cache empty after successful refresh".into()));
    };

    let color = output::should_color(&global.color);
    let on_node = |node: Option<&str>| match &args.node {
        Some(filter) => node == Some(filter.as_str()),
        None => true,
    };

    let out = match args.resource {
        None => {
            let rows = summary(&snapshot);
            output::render_list(&global.output, &rows, SummaryRow::clone, |r| {
                format!("{} {}/{}", r.resource, r.up, r.total)
            })?
        }
        Some(ResourceKind::Nodes) => {
            let nodes: Vec<_> = snapshot
                .nodes
                .iter()
                .filter(|n| on_node(Some(n.id.as_str())) || on_node(Some(n.name.as_str())))
                .cloned()
                .collect();
            output::render_list(&global.output, &nodes, |n| node_row(n, color), |n| n.id.clone())?
        }
        Some(kind @ (ResourceKind::Vms | ResourceKind::Containers)) => {
            let source = if kind == ResourceKind::Vms {
                &snapshot.vms
            } else {
                &snapshot.containers
            };
            let guests: Vec<_> = source
                .iter()
                .filter(|g| on_node(g.node.as_deref()))
                .cloned()
                .collect();
            output::render_list(&global.output, &guests, |g| guest_row(g, color), |g| g.id.clone())?
        }
        Some(ResourceKind::Storage) => {
            let pools: Vec<_> = snapshot
                .storage_pools
                .iter()
                .filter(|p| on_node(p.node.as_deref()))
                .cloned()
                .collect();
            output::render_list(&global.output, &pools, |p| storage_row(p, color), |p| p.id.clone())?
        }
        Some(ResourceKind::Network) => {
            let ifaces: Vec<_> = snapshot
                .network_interfaces
                .iter()
                .filter(|i| on_node(i.node.as_deref()))
                .cloned()
                .collect();
            output::render_list(
                &global.output,
                &ifaces,
                |i| interface_row(i, color),
                |i| i.id.clone(),
            )?
        }
    };

    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustersync_core::GuestKind;

    fn guest(status: GuestStatus) -> Guest {
        Guest {
            id: "qemu/100".into(),
            kind: GuestKind::Vm,
            vmid: Some(100),
            name: "web".into(),
            node: Some("pve-01".into()),
            status,
            cpu_usage: Some(0.5),
            mem_used_bytes: None,
            mem_total_bytes: None,
            uptime_secs: None,
        }
    }

    #[test]
    fn summary_counts_running_guests() {
        let snapshot = Snapshot {
            vms: vec![guest(GuestStatus::Running), guest(GuestStatus::Stopped)],
            ..Snapshot::default()
        };
        let rows = summary(&snapshot);
        let vms = rows.iter().find(|r| r.resource == "vms").map(|r| (r.total, r.up));
        assert_eq!(vms, Some((2, 1)));
    }

    #[test]
    fn guest_row_formats_without_color() {
        let row = guest_row(&guest(GuestStatus::Running), false);
        assert_eq!(row.vmid, "100");
        assert_eq!(row.status, "running");
        assert_eq!(row.cpu, "50.0%");
        assert_eq!(row.memory, "-");
    }
}
