//! Reconciliation engine for one DorisCluster
//!
//! One cycle runs, in order:
//! 1. Validation of compute group ids (aborts before any mutation)
//! 2. Metadata tier: quorum clamp, drain before shrinking, apply resources
//! 3. Compute groups, sequentially: apply resources, then drain on shrink
//! 4. Tear-down of groups no longer specified
//! 5. Volume claim reclamation
//! 6. Concurrent status aggregation
//!
//! The engine never fails half-way through a cycle: independent failures are
//! collected in the `CycleReport` and the status computed so far is still
//! returned, so the phase machine is persisted even when something broke.

use crate::cluster_config::{ConfFile, ConfigResolver, TierConfig};
use crate::credentials::CredentialsProvider;
use crate::crd::{ComputeGroup, ComputeGroupStatus, DorisCluster, DorisClusterStatus, MetadataTierStatus};
use crate::directory::{AdminEndpoint, DirectoryConnector};
use crate::drain::{ComputeDrain, DrainOutcome, MetadataDrain, NodeDrainer, clamp_to_quorum};
use crate::error::{OperatorError, Result};
use crate::events::{ClusterEvent, EventReason, EventSink};
use crate::labels::{
    compute_group_name, compute_group_selector, metadata_selector, metadata_service_name,
    metadata_statefulset_name,
};
use crate::manifest::{
    ManifestContext, compute_group_service, compute_group_statefulset, metadata_service,
    metadata_statefulset,
};
use crate::phase::{
    ReinitializedStatuses, after_drain, after_drain_failure, reinitialize_compute_groups,
    reinitialize_metadata_tier,
};
use crate::platform::ResourceClient;
use crate::status::StatusAggregator;
use crate::storage::{GroupStorage, StorageReclaimer};
use chrono::Utc;
use doris_shared::Phase;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

mod validation;

pub use validation::{UNIQUE_ID_PATTERN, ValidationFailure, is_valid_unique_id, validate_compute_groups};

/// Configuration for ReconcileEngine
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Upper bound for one administrative drain attempt, connect included
    pub admin_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            admin_timeout: Duration::from_secs(30),
        }
    }
}

/// Collaborators of the engine
#[derive(Clone)]
pub struct ReconcileDeps {
    pub resources: Arc<dyn ResourceClient>,
    pub connector: Arc<dyn DirectoryConnector>,
    pub credentials: Arc<dyn CredentialsProvider>,
    pub configs: Arc<dyn ConfigResolver>,
}

/// Result of a reconciliation cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Database nodes removed
    pub nodes_drained: usize,

    /// Volume claims deleted
    pub pvcs_reclaimed: usize,

    /// Removed groups fully torn down
    pub groups_cleared: usize,

    pub execution_time_ms: u64,

    /// Independent failures of this cycle
    pub errors: Vec<OperatorError>,
}

impl CycleReport {
    pub fn add_error(&mut self, error: OperatorError) {
        self.errors.push(error);
    }

    pub fn record_drain(&mut self, outcome: DrainOutcome) {
        if let DrainOutcome::Removed(count) = outcome {
            self.nodes_drained += count;
        }
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconcile cycle: {} nodes drained, {} claims reclaimed, {} groups cleared, {} errors, {}ms",
            self.nodes_drained,
            self.pvcs_reclaimed,
            self.groups_cleared,
            self.errors.len(),
            self.execution_time_ms
        )
    }

    /// All failures merged into one error
    pub fn into_error(self) -> Option<OperatorError> {
        OperatorError::merge(self.errors)
    }
}

#[derive(Debug)]
pub struct CycleOutcome {
    pub status: DorisClusterStatus,
    pub report: CycleReport,
}

/// What a successful compute group pass leaves behind for reclamation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSync {
    pub storage_paths: usize,
    pub outcome: DrainOutcome,
}

pub struct ReconcileEngine {
    resources: Arc<dyn ResourceClient>,
    credentials: Arc<dyn CredentialsProvider>,
    configs: Arc<dyn ConfigResolver>,
    drainer: NodeDrainer,
    reclaimer: StorageReclaimer,
    aggregator: StatusAggregator,
}

impl ReconcileEngine {
    pub fn new(deps: ReconcileDeps, config: ReconcilerConfig) -> Self {
        Self {
            drainer: NodeDrainer::new(
                deps.connector.clone(),
                deps.resources.clone(),
                config.admin_timeout,
            ),
            reclaimer: StorageReclaimer::new(deps.resources.clone()),
            aggregator: StatusAggregator::new(deps.resources.clone()),
            resources: deps.resources,
            credentials: deps.credentials,
            configs: deps.configs,
        }
    }

    /// Run one cycle. `Err` only when the cycle could not start: invalid
    /// spec, missing object metadata, or unreadable credentials/configuration.
    pub async fn reconcile(
        &self,
        cluster: &DorisCluster,
        events: &dyn EventSink,
    ) -> Result<CycleOutcome> {
        let started = Instant::now();

        let ctx = ManifestContext::from_cluster(cluster)?;
        if let Err(failure) = validate_compute_groups(&ctx.cluster, &cluster.spec.compute_groups) {
            warn!(target: "doris::reconciler", reason = %failure.reason, "{}", failure.message);
            events
                .publish(ClusterEvent::warning(failure.reason, failure.message.clone()))
                .await;
            return Err(OperatorError::Validation(failure.message));
        }

        let previous = cluster.status.clone().unwrap_or_default();
        let credentials = match self
            .credentials
            .credentials(&ctx.namespace, cluster.spec.auth_secret.as_deref())
            .await
        {
            Ok(credentials) => credentials,
            Err(e) => {
                self.report_platform_failure("read admin credentials", &e, events).await;
                return Err(e);
            }
        };
        let fe_config = match self
            .configs
            .resolve(&ctx.namespace, &cluster.spec.meta_service.config_maps, ConfFile::Frontend)
            .await
        {
            Ok(config) => config,
            Err(e) => {
                self.report_platform_failure("resolve fe.conf", &e, events).await;
                return Err(e);
            }
        };
        let endpoint = AdminEndpoint {
            host: format!("{}.{}", metadata_service_name(&ctx.cluster), ctx.namespace),
            port: fe_config.query_port(),
            credentials,
        };

        info!(
            target: "doris::reconciler",
            namespace = %ctx.namespace,
            cluster = %ctx.cluster,
            groups = cluster.spec.compute_groups.len(),
            "Starting reconcile cycle"
        );

        let mut report = CycleReport::default();
        let mut status = DorisClusterStatus {
            observed_generation: cluster.metadata.generation.unwrap_or_default(),
            ..Default::default()
        };

        status.metadata_tier = self
            .sync_metadata_tier(&ctx, cluster, &previous.metadata_tier, &fe_config, &endpoint, events, &mut report)
            .await;

        let ReinitializedStatuses { mut current, stale } = reinitialize_compute_groups(
            &ctx.cluster,
            &cluster.spec.compute_groups,
            &previous.compute_group_statuses,
        );

        let mut storage_paths: HashMap<String, usize> = HashMap::new();
        if cluster.spec.compute_groups.is_empty() {
            events
                .publish(ClusterEvent::warning(
                    EventReason::ComputeGroupsEmpty,
                    "no compute group is specified, the cluster cannot serve queries",
                ))
                .await;
        } else if self.metadata_available(&ctx, events, &mut report).await {
            for (group, group_status) in cluster.spec.compute_groups.iter().zip(current.iter_mut()) {
                match self
                    .reconcile_compute_group(&ctx, group, group_status, &endpoint, events)
                    .await
                {
                    Ok(sync) => {
                        report.record_drain(sync.outcome);
                        storage_paths.insert(group.unique_id.clone(), sync.storage_paths);
                    }
                    Err(e) => report.add_error(e),
                }
            }
        }

        let retained = self
            .clear_stale_groups(&ctx, stale, &endpoint, events, &mut report)
            .await;

        // only groups whose pass completed know their storage layout
        for group_status in &current {
            let Some(paths) = storage_paths.get(&group_status.unique_id) else {
                continue;
            };
            let selector = compute_group_selector(&ctx.cluster, &group_status.unique_id);
            let storage = GroupStorage {
                namespace: &ctx.namespace,
                selector: &selector,
                statefulset: &group_status.statefulset_name,
                phase: group_status.phase,
                replicas: group_status.replicas,
                storage_paths: *paths,
            };
            match self.reclaimer.reclaim_group(&storage, events).await {
                Ok(count) => report.pvcs_reclaimed += count,
                Err(e) => report.add_error(e),
            }
        }

        status.compute_group_statuses = current;
        status.compute_group_statuses.extend(retained);

        if let Err(e) = self
            .aggregator
            .refresh_metadata_tier(&ctx.namespace, &ctx.cluster, &mut status.metadata_tier)
            .await
        {
            self.report_platform_failure("refresh metadata tier status", &e, events).await;
            report.add_error(e);
        }
        let (health, failure) = self
            .aggregator
            .refresh_compute_groups(&ctx.namespace, &ctx.cluster, &mut status.compute_group_statuses)
            .await;
        status.cluster_health = health;
        if let Some(e) = failure {
            self.report_platform_failure("refresh compute group status", &e, events).await;
            report.add_error(e);
        }

        for failed in status.compute_group_statuses.iter().filter(|s| s.phase.is_failure()) {
            warn!(
                target: "doris::reconciler",
                compute_group = %failed.unique_id,
                phase = %failed.phase,
                "Compute group needs attention"
            );
        }

        status.last_reconcile_time = Some(Utc::now().to_rfc3339());
        report.execution_time_ms = started.elapsed().as_millis() as u64;

        if report.has_errors() {
            warn!(target: "doris::reconciler", cluster = %ctx.cluster, "{}", report.summary());
        } else {
            info!(target: "doris::reconciler", cluster = %ctx.cluster, "{}", report.summary());
        }

        Ok(CycleOutcome { status, report })
    }

    #[allow(clippy::too_many_arguments)]
    async fn sync_metadata_tier(
        &self,
        ctx: &ManifestContext,
        cluster: &DorisCluster,
        previous: &MetadataTierStatus,
        fe_config: &TierConfig,
        endpoint: &AdminEndpoint,
        events: &dyn EventSink,
        report: &mut CycleReport,
    ) -> MetadataTierStatus {
        let tier = &cluster.spec.meta_service;
        let quorum = tier.election_number();
        let (desired, corrected) = clamp_to_quorum(tier.desired_replicas(), quorum);
        if corrected {
            let message = format!(
                "metadata replicas {} is below the election number {}, using {}",
                tier.desired_replicas(),
                quorum,
                desired
            );
            warn!(target: "doris::reconciler", cluster = %ctx.cluster, "{}", message);
            events
                .publish(ClusterEvent::warning(EventReason::MetadataReplicasCorrected, message))
                .await;
        }

        let statefulset_name = metadata_statefulset_name(&ctx.cluster);
        let mut status = reinitialize_metadata_tier(statefulset_name.clone(), desired, previous);

        let existing = match self
            .resources
            .statefulset_replicas(&ctx.namespace, &statefulset_name)
            .await
        {
            Ok(existing) => existing,
            Err(e) => {
                self.report_platform_failure("read metadata tier replicas", &e, events).await;
                report.add_error(e);
                return status;
            }
        };

        // observers must leave the directory before their pods go away
        let plan = MetadataDrain {
            desired,
            previous: existing,
            quorum,
            force: status.phase == Phase::ScaleDownFailed,
            prefix: statefulset_name,
            mode: fe_config.addressing_mode(),
            namespace: ctx.namespace.clone(),
            selector: metadata_selector(&ctx.cluster),
        };
        match self.drainer.drain_metadata(endpoint, &plan).await {
            Ok(outcome) => {
                status.phase = after_drain(status.phase, outcome);
                report.record_drain(outcome);
            }
            Err(e) => {
                status.phase = after_drain_failure();
                error!(target: "doris::reconciler", cluster = %ctx.cluster, error = %e, "Metadata tier drain failed");
                events
                    .publish(ClusterEvent::warning(
                        EventReason::SqlExecFailed,
                        format!("drop observers: {}", e),
                    ))
                    .await;
                report.add_error(e);
                return status;
            }
        }

        let query_port = fe_config.query_port();
        let applied = async {
            self.resources
                .apply_service(&metadata_service(ctx, query_port))
                .await?;
            self.resources
                .apply_statefulset(&metadata_statefulset(ctx, tier, desired, query_port))
                .await
        }
        .await;
        if let Err(e) = applied {
            self.report_apply_failure("metadata tier", &e, events).await;
            report.add_error(e);
        }
        status
    }

    async fn metadata_available(
        &self,
        ctx: &ManifestContext,
        events: &dyn EventSink,
        report: &mut CycleReport,
    ) -> bool {
        let service = metadata_service_name(&ctx.cluster);
        match self
            .resources
            .service_has_endpoints(&ctx.namespace, &service)
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                info!(target: "doris::reconciler", cluster = %ctx.cluster, "Metadata tier not available yet, compute groups wait");
                events
                    .publish(ClusterEvent::normal(
                        EventReason::WaitMetadataAvailable,
                        format!("waiting for service {} to have ready endpoints", service),
                    ))
                    .await;
                false
            }
            Err(e) => {
                self.report_platform_failure(&format!("check endpoints of {}", service), &e, events)
                    .await;
                report.add_error(e);
                false
            }
        }
    }

    /// Apply one group's resources and drain it when it shrinks. The status
    /// entry's phase is updated in place; a drain error leaves it in
    /// `ScaleDownFailed` and is returned.
    pub async fn reconcile_compute_group(
        &self,
        ctx: &ManifestContext,
        group: &ComputeGroup,
        status: &mut ComputeGroupStatus,
        endpoint: &AdminEndpoint,
        events: &dyn EventSink,
    ) -> Result<GroupSync> {
        let be_config = match self
            .configs
            .resolve(&ctx.namespace, &group.config_maps, ConfFile::Backend)
            .await
        {
            Ok(config) => config,
            Err(e) => {
                let what = format!("compute group {}: resolve be.conf", group.unique_id);
                self.report_platform_failure(&what, &e, events).await;
                return Err(e);
            }
        };
        let paths = be_config.storage_paths();

        if let Err(e) = self
            .resources
            .apply_service(&compute_group_service(ctx, group))
            .await
        {
            self.report_apply_failure(&group.unique_id, &e, events).await;
            return Err(e);
        }

        let previous = match self
            .resources
            .statefulset_replicas(&ctx.namespace, &status.statefulset_name)
            .await
        {
            Ok(previous) => previous,
            Err(e) => {
                let what = format!("compute group {}: read replicas", group.unique_id);
                self.report_platform_failure(&what, &e, events).await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .resources
            .apply_statefulset(&compute_group_statefulset(ctx, group, &paths))
            .await
        {
            self.report_apply_failure(&group.unique_id, &e, events).await;
            return Err(e);
        }

        let plan = ComputeDrain {
            group_name: compute_group_name(&group.unique_id),
            desired: group.desired_replicas(),
            previous,
            force: status.phase == Phase::ScaleDownFailed,
            prefix: status.statefulset_name.clone(),
        };
        match self.drainer.drain_compute_group(endpoint, &plan).await {
            Ok(outcome) => {
                status.phase = after_drain(status.phase, outcome);
                debug!(
                    target: "doris::reconciler",
                    compute_group = %group.unique_id,
                    outcome = ?outcome,
                    phase = %status.phase,
                    "Compute group synced"
                );
                Ok(GroupSync {
                    storage_paths: paths.len(),
                    outcome,
                })
            }
            Err(e) => {
                status.phase = after_drain_failure();
                error!(
                    target: "doris::reconciler",
                    compute_group = %group.unique_id,
                    error = %e,
                    "Compute group drain failed"
                );
                events
                    .publish(ClusterEvent::warning(
                        EventReason::SqlExecFailed,
                        format!("compute group {}: {}", group.unique_id, e),
                    ))
                    .await;
                Err(e)
            }
        }
    }

    /// Tear down groups no longer specified. Returns the entries that must be
    /// kept because some step failed; they are retried next cycle.
    async fn clear_stale_groups(
        &self,
        ctx: &ManifestContext,
        stale: Vec<ComputeGroupStatus>,
        endpoint: &AdminEndpoint,
        events: &dyn EventSink,
        report: &mut CycleReport,
    ) -> Vec<ComputeGroupStatus> {
        let mut retained = Vec::new();

        for mut entry in stale {
            info!(target: "doris::reconciler", compute_group = %entry.unique_id, "Clearing removed compute group");

            let statefulset_deleted = match self
                .resources
                .delete_statefulset(&ctx.namespace, &entry.statefulset_name)
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    events
                        .publish(ClusterEvent::warning(
                            EventReason::StatefulsetDeleteFailed,
                            format!("delete statefulset {}: {}", entry.statefulset_name, e),
                        ))
                        .await;
                    report.add_error(e);
                    false
                }
            };
            let service_deleted = match self
                .resources
                .delete_service(&ctx.namespace, &entry.service_name)
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    events
                        .publish(ClusterEvent::warning(
                            EventReason::ServiceDeleteFailed,
                            format!("delete service {}: {}", entry.service_name, e),
                        ))
                        .await;
                    report.add_error(e);
                    false
                }
            };
            if !(statefulset_deleted && service_deleted) {
                retained.push(entry);
                continue;
            }

            let plan = ComputeDrain {
                group_name: compute_group_name(&entry.unique_id),
                desired: 0,
                previous: None,
                force: true,
                prefix: entry.statefulset_name.clone(),
            };
            match self.drainer.drain_compute_group(endpoint, &plan).await {
                Ok(outcome) => report.record_drain(outcome),
                Err(e) => {
                    entry.phase = after_drain_failure();
                    events
                        .publish(ClusterEvent::warning(
                            EventReason::SqlExecFailed,
                            format!("compute group {}: {}", entry.unique_id, e),
                        ))
                        .await;
                    report.add_error(e);
                    retained.push(entry);
                    continue;
                }
            }

            let selector = compute_group_selector(&ctx.cluster, &entry.unique_id);
            match self
                .reclaimer
                .reclaim_removed_group(&ctx.namespace, &selector, events)
                .await
            {
                Ok(count) => {
                    report.pvcs_reclaimed += count;
                    report.groups_cleared += 1;
                    info!(target: "doris::reconciler", compute_group = %entry.unique_id, claims = count, "Removed compute group cleared");
                }
                Err(e) => {
                    report.add_error(e);
                    retained.push(entry);
                }
            }
        }

        retained
    }

    async fn report_apply_failure(&self, what: &str, err: &OperatorError, events: &dyn EventSink) {
        error!(target: "doris::reconciler", resource = %what, error = %err, "Failed to apply resources");
        events
            .publish(ClusterEvent::warning(
                EventReason::ApplyResourceFailed,
                format!("{}: {}", what, err),
            ))
            .await;
    }

    /// Platform reads and configuration lookups that failed
    async fn report_platform_failure(&self, what: &str, err: &OperatorError, events: &dyn EventSink) {
        error!(target: "doris::reconciler", operation = %what, error = %err, "Platform request failed");
        events
            .publish(ClusterEvent::warning(
                EventReason::PlatformUnavailable,
                format!("{}: {}", what, err),
            ))
            .await;
    }
}
