//! Observed health of compute groups and the metadata tier

use crate::crd::{ClusterHealth, ComputeGroupStatus, MetadataTierStatus};
use crate::error::{OperatorError, Result};
use crate::labels::{compute_group_selector, metadata_selector};
use crate::phase::observe_available;
use crate::platform::{PodInfo, PodPhase, ResourceClient};
use doris_shared::Phase;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PodCounts {
    pub available: i32,
    pub creating: i32,
    pub failed: i32,
}

pub fn classify(pods: &[PodInfo]) -> PodCounts {
    let mut counts = PodCounts::default();
    for pod in pods {
        if pod.ready {
            counts.available += 1;
        } else if matches!(pod.phase, PodPhase::Running | PodPhase::Pending) {
            counts.creating += 1;
        } else {
            counts.failed += 1;
        }
    }
    counts
}

/// Cluster-wide counters, from scratch
pub fn cluster_health(statuses: &[ComputeGroupStatus]) -> ClusterHealth {
    ClusterHealth {
        cg_count: statuses.len() as i32,
        cg_full_available_count: statuses.iter().filter(|s| s.phase == Phase::Ready).count() as i32,
        cg_available_count: statuses.iter().filter(|s| s.available_replicas > 0).count() as i32,
    }
}

type GroupResult = (usize, String, Result<PodCounts>);

pub struct StatusAggregator {
    resources: Arc<dyn ResourceClient>,
}

impl StatusAggregator {
    pub fn new(resources: Arc<dyn ResourceClient>) -> Self {
        Self { resources }
    }

    /// Poll every group's pods concurrently, then apply the results by index.
    /// A failing group keeps its previous availability and is reported in the
    /// aggregate error; the health counters are recomputed either way.
    pub async fn refresh_compute_groups(
        &self,
        namespace: &str,
        cluster: &str,
        statuses: &mut [ComputeGroupStatus],
    ) -> (ClusterHealth, Option<OperatorError>) {
        let (tx, mut rx) = mpsc::channel::<GroupResult>(statuses.len().max(1));

        let handles: Vec<_> = statuses
            .iter()
            .enumerate()
            .map(|(index, status)| {
                let resources = self.resources.clone();
                let tx = tx.clone();
                let namespace = namespace.to_string();
                let unique_id = status.unique_id.clone();
                let selector = compute_group_selector(cluster, &unique_id);
                tokio::spawn(async move {
                    let counts = resources
                        .list_pods(&namespace, &selector)
                        .await
                        .map(|pods| classify(&pods));
                    // capacity equals the task count, never blocks
                    let _ = tx.send((index, unique_id, counts)).await;
                })
            })
            .collect();
        drop(tx);

        let mut failures = Vec::new();
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                failures.push(OperatorError::Task(e.to_string()));
            }
        }

        while let Some((index, unique_id, counts)) = rx.recv().await {
            match counts {
                Ok(counts) => {
                    let status = &mut statuses[index];
                    status.available_replicas = counts.available;
                    status.phase = observe_available(status.phase, status.replicas, counts.available);
                    debug!(
                        compute_group = %unique_id,
                        available = counts.available,
                        creating = counts.creating,
                        failed = counts.failed,
                        phase = %status.phase,
                        "Refreshed compute group status"
                    );
                }
                Err(e) => {
                    warn!(compute_group = %unique_id, error = %e, "Failed to refresh compute group status");
                    failures.push(e.in_group(&unique_id));
                }
            }
        }

        (cluster_health(statuses), OperatorError::merge(failures))
    }

    pub async fn refresh_metadata_tier(
        &self,
        namespace: &str,
        cluster: &str,
        status: &mut MetadataTierStatus,
    ) -> Result<()> {
        let pods = self
            .resources
            .list_pods(namespace, &metadata_selector(cluster))
            .await?;
        let counts = classify(&pods);
        status.available_replicas = counts.available;
        status.phase = observe_available(status.phase, status.replicas, counts.available);
        Ok(())
    }
}
