//! Reclamation of PersistentVolumeClaims left behind by scale-down
//!
//! StatefulSets never delete the claims of removed replicas. After a group
//! shrinks, every claim outside the retained set is deleted; a suspended or
//! zero-replica group keeps all of its claims.

use crate::error::{OperatorError, Result};
use crate::events::{ClusterEvent, EventReason, EventSink};
use crate::labels::{LOG_VOLUME, cache_volume_name, pvc_name};
use crate::platform::ResourceClient;
use doris_shared::Phase;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Claim names the group's current replicas own
pub fn retained_pvc_names(statefulset: &str, replicas: i32, storage_paths: usize) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for ordinal in 0..replicas.max(0) as u32 {
        names.insert(pvc_name(LOG_VOLUME, statefulset, ordinal));
        for index in 0..storage_paths {
            names.insert(pvc_name(&cache_volume_name(index), statefulset, ordinal));
        }
    }
    names
}

/// Suspension or zero replicas means every claim is kept
pub fn retains_everything(phase: Phase, replicas: i32) -> bool {
    phase.retains_storage() || replicas == 0
}

/// Claims to delete out of `existing`
pub fn plan_deletions(
    phase: Phase,
    statefulset: &str,
    replicas: i32,
    storage_paths: usize,
    existing: &[String],
) -> Vec<String> {
    if retains_everything(phase, replicas) {
        return Vec::new();
    }
    let retained = retained_pvc_names(statefulset, replicas, storage_paths);
    existing
        .iter()
        .filter(|name| !retained.contains(*name))
        .cloned()
        .collect()
}

/// Storage view of one compute group
#[derive(Debug, Clone)]
pub struct GroupStorage<'a> {
    pub namespace: &'a str,
    pub selector: &'a BTreeMap<String, String>,
    pub statefulset: &'a str,
    pub phase: Phase,
    pub replicas: i32,
    pub storage_paths: usize,
}

pub struct StorageReclaimer {
    resources: Arc<dyn ResourceClient>,
}

impl StorageReclaimer {
    pub fn new(resources: Arc<dyn ResourceClient>) -> Self {
        Self { resources }
    }

    /// Delete the claims no current replica owns. Returns how many were deleted.
    pub async fn reclaim_group(&self, group: &GroupStorage<'_>, events: &dyn EventSink) -> Result<usize> {
        if retains_everything(group.phase, group.replicas) {
            return Ok(0);
        }
        let existing = self.list(group.namespace, group.selector, events).await?;
        let doomed = plan_deletions(
            group.phase,
            group.statefulset,
            group.replicas,
            group.storage_paths,
            &existing,
        );
        self.delete_all(group.namespace, doomed, events).await
    }

    /// Delete every claim of a group that is no longer specified
    pub async fn reclaim_removed_group(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
        events: &dyn EventSink,
    ) -> Result<usize> {
        let existing = self.list(namespace, selector, events).await?;
        self.delete_all(namespace, existing, events).await
    }

    async fn list(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
        events: &dyn EventSink,
    ) -> Result<Vec<String>> {
        match self.resources.list_pvcs(namespace, selector).await {
            Ok(names) => Ok(names),
            Err(e) => {
                events
                    .publish(ClusterEvent::warning(EventReason::PvcListFailed, e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    async fn delete_all(
        &self,
        namespace: &str,
        names: Vec<String>,
        events: &dyn EventSink,
    ) -> Result<usize> {
        let mut failures = Vec::new();
        let mut deleted = 0;
        for name in names {
            match self.resources.delete_pvc(namespace, &name).await {
                Ok(()) => {
                    info!(namespace = %namespace, pvc = %name, "Reclaimed volume claim");
                    deleted += 1;
                }
                Err(e) => {
                    warn!(namespace = %namespace, pvc = %name, error = %e, "Failed to delete volume claim");
                    events
                        .publish(ClusterEvent::warning(
                            EventReason::PvcDeleteFailed,
                            format!("delete pvc {}: {}", name, e),
                        ))
                        .await;
                    failures.push(e);
                }
            }
        }
        match OperatorError::merge(failures) {
            Some(err) => Err(err),
            None => Ok(deleted),
        }
    }
}
