//! Node draining on scale-down
//!
//! Before a StatefulSet loses replicas, the nodes those replicas run must be
//! removed from the database's membership, otherwise the leader keeps waiting
//! for them. The selection rules are pure functions; `NodeDrainer` wires them
//! to a directory session and the platform.

use crate::directory::{AdminEndpoint, DirectoryConnector, FrontendNode, FrontendRole};
use crate::error::{OperatorError, Result};
use crate::platform::ResourceClient;
use crate::topology::{AddressingMode, ResolvedTopology, TopologyResolver, resolve_by_hostname};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Not shrinking, the directory was not contacted
    NotNeeded,
    /// Shrinking, but no live node had to go
    NothingToRemove,
    /// That many nodes were removed in one call
    Removed(usize),
}

/// Desired metadata replicas never drop below the election quorum.
/// Returns the clamped value and whether a correction happened.
pub fn clamp_to_quorum(desired: i32, quorum: i32) -> (i32, bool) {
    if desired < quorum {
        (quorum, true)
    } else {
        (desired, false)
    }
}

/// Shrink detection. A missing previous StatefulSet is a creation, never a shrink.
pub fn is_shrinking(desired: i32, previous: Option<i32>, force: bool) -> bool {
    match previous {
        Some(previous) if desired < previous => true,
        _ => force,
    }
}

/// Observers to remove so that `desired - quorum` remain
pub fn metadata_need_removed(live_observers: usize, desired: i32, quorum: i32) -> i64 {
    live_observers as i64 - i64::from(desired) + i64::from(quorum)
}

/// Orphans first, then the highest ordinals, at most `need` nodes
pub fn select_metadata_drop<N>(topology: ResolvedTopology<N>, need: usize) -> Vec<N> {
    let ResolvedTopology {
        mut placed,
        orphans,
    } = topology;
    placed.sort_by(|a, b| b.0.cmp(&a.0));
    orphans
        .into_iter()
        .chain(placed.into_iter().map(|(_, node)| node))
        .take(need)
        .collect()
}

/// Every node whose ordinal is at or above the desired replica count
pub fn select_compute_drop<N>(topology: ResolvedTopology<N>, desired: i32) -> Vec<N> {
    let keep = desired.max(0) as u32;
    topology
        .placed
        .into_iter()
        .filter(|(ordinal, _)| *ordinal >= keep)
        .map(|(_, node)| node)
        .collect()
}

/// Drain request for the metadata tier
#[derive(Debug, Clone)]
pub struct MetadataDrain {
    /// Already clamped to the quorum
    pub desired: i32,
    pub previous: Option<i32>,
    pub quorum: i32,
    /// Drain even without a detected shrink
    pub force: bool,
    pub prefix: String,
    pub mode: AddressingMode,
    pub namespace: String,
    pub selector: BTreeMap<String, String>,
}

/// Drain request for one compute group
#[derive(Debug, Clone)]
pub struct ComputeDrain {
    /// Name the group is registered under in the database
    pub group_name: String,
    pub desired: i32,
    pub previous: Option<i32>,
    /// Drain even without a detected shrink: retry after `ScaleDownFailed`,
    /// or tear-down of a removed group
    pub force: bool,
    pub prefix: String,
}

pub struct NodeDrainer {
    connector: Arc<dyn DirectoryConnector>,
    resolver: TopologyResolver,
    timeout: Duration,
}

impl NodeDrainer {
    pub fn new(
        connector: Arc<dyn DirectoryConnector>,
        resources: Arc<dyn ResourceClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            connector,
            resolver: TopologyResolver::new(resources),
            timeout,
        }
    }

    async fn bounded<F>(&self, what: String, attempt: F) -> Result<DrainOutcome>
    where
        F: std::future::Future<Output = Result<DrainOutcome>>,
    {
        tokio::time::timeout(self.timeout, attempt)
            .await
            .map_err(|_| OperatorError::Timeout(self.timeout, what))?
    }

    pub async fn drain_metadata(
        &self,
        endpoint: &AdminEndpoint,
        plan: &MetadataDrain,
    ) -> Result<DrainOutcome> {
        if !is_shrinking(plan.desired, plan.previous, plan.force) {
            return Ok(DrainOutcome::NotNeeded);
        }

        self.bounded(format!("draining metadata tier {}", plan.prefix), async {
            let mut client = self.connector.connect(endpoint).await?;
            let observers: Vec<FrontendNode> = client
                .list_metadata_nodes()
                .await?
                .into_iter()
                .filter(|node| node.role == FrontendRole::Observer && !node.is_leader)
                .collect();

            let need = metadata_need_removed(observers.len(), plan.desired, plan.quorum);
            if need <= 0 {
                info!(
                    observers = observers.len(),
                    desired = plan.desired,
                    quorum = plan.quorum,
                    "Observer count already within target, nothing to drain"
                );
                return Ok(DrainOutcome::NothingToRemove);
            }

            let topology = self
                .resolver
                .resolve(observers, plan.mode, &plan.prefix, &plan.namespace, &plan.selector)
                .await?;
            let drop = select_metadata_drop(topology, need as usize);
            if drop.is_empty() {
                return Ok(DrainOutcome::NothingToRemove);
            }

            let hosts: Vec<&str> = drop.iter().map(|n| n.host.as_str()).collect();
            info!(need, hosts = ?hosts, "Removing observers");
            client.remove_metadata_nodes(&drop).await?;
            Ok(DrainOutcome::Removed(drop.len()))
        })
        .await
    }

    pub async fn drain_compute_group(
        &self,
        endpoint: &AdminEndpoint,
        plan: &ComputeDrain,
    ) -> Result<DrainOutcome> {
        if !is_shrinking(plan.desired, plan.previous, plan.force) {
            return Ok(DrainOutcome::NotNeeded);
        }

        self.bounded(format!("draining compute group {}", plan.group_name), async {
            let mut client = self.connector.connect(endpoint).await?;
            let nodes = client.list_compute_nodes(&plan.group_name).await?;
            debug!(compute_group = %plan.group_name, live = nodes.len(), "Listed backends");

            let topology = resolve_by_hostname(nodes, &plan.prefix)?;
            let drop = select_compute_drop(topology, plan.desired);
            if drop.is_empty() {
                return Ok(DrainOutcome::NothingToRemove);
            }

            let hosts: Vec<&str> = drop.iter().map(|n| n.host.as_str()).collect();
            info!(compute_group = %plan.group_name, keep = plan.desired, hosts = ?hosts, "Dropping backends");
            client.remove_compute_nodes(&drop).await?;
            Ok(DrainOutcome::Removed(drop.len()))
        })
        .await
    }
}
