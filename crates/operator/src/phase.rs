//! Per-group phase bookkeeping on top of `doris_shared::Phase`
//!
//! Each cycle rebuilds the compute group status list from the desired groups, carrying
//! sticky phases over from the persisted status. Transitions after that are
//! driven by drain results and observed pod availability.

use crate::crd::{ComputeGroup, ComputeGroupStatus, MetadataTierStatus};
use crate::drain::DrainOutcome;
use crate::labels::{compute_group_service_name, compute_group_statefulset_name};
use doris_shared::Phase;
use std::collections::HashSet;

/// Status list for the current spec, and the previous entries of groups no
/// longer specified
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReinitializedStatuses {
    pub current: Vec<ComputeGroupStatus>,
    pub stale: Vec<ComputeGroupStatus>,
}

pub fn reinitialize_compute_group(
    cluster: &str,
    group: &ComputeGroup,
    previous: Option<&ComputeGroupStatus>,
) -> ComputeGroupStatus {
    ComputeGroupStatus {
        unique_id: group.unique_id.clone(),
        phase: Phase::reinitialize(previous.map(|p| p.phase)),
        statefulset_name: compute_group_statefulset_name(cluster, &group.unique_id),
        service_name: compute_group_service_name(cluster, &group.unique_id),
        replicas: group.desired_replicas(),
        available_replicas: previous.map(|p| p.available_replicas).unwrap_or_default(),
        suspend_replicas: previous.map(|p| p.suspend_replicas).unwrap_or_default(),
    }
}

/// One entry per specified group, in spec order
pub fn reinitialize_compute_groups(
    cluster: &str,
    groups: &[ComputeGroup],
    previous: &[ComputeGroupStatus],
) -> ReinitializedStatuses {
    let current = groups
        .iter()
        .map(|group| {
            let prev = previous.iter().find(|s| s.unique_id == group.unique_id);
            reinitialize_compute_group(cluster, group, prev)
        })
        .collect();

    let specified: HashSet<&str> = groups.iter().map(|g| g.unique_id.as_str()).collect();
    let stale = previous
        .iter()
        .filter(|s| !specified.contains(s.unique_id.as_str()))
        .cloned()
        .collect();

    ReinitializedStatuses { current, stale }
}

pub fn reinitialize_metadata_tier(
    statefulset_name: String,
    replicas: i32,
    previous: &MetadataTierStatus,
) -> MetadataTierStatus {
    MetadataTierStatus {
        phase: Phase::reinitialize(Some(previous.phase)),
        statefulset_name,
        replicas,
        available_replicas: previous.available_replicas,
    }
}

/// Phase after a drain attempt that returned successfully
pub fn after_drain(phase: Phase, outcome: DrainOutcome) -> Phase {
    match outcome {
        DrainOutcome::NotNeeded => phase,
        DrainOutcome::NothingToRemove | DrainOutcome::Removed(_) => Phase::Scaling,
    }
}

/// Phase after a failed drain attempt
pub fn after_drain_failure() -> Phase {
    Phase::ScaleDownFailed
}

/// Record observed availability; full availability wins over any phase
pub fn observe_available(phase: Phase, replicas: i32, available: i32) -> Phase {
    if available == replicas {
        Phase::Ready
    } else {
        phase
    }
}
