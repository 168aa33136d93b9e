//! DorisCluster controller - watches clusters and the StatefulSets they own

use crate::cluster_config::ConfigMapConfigResolver;
use crate::credentials::SecretCredentialsProvider;
use crate::crd::{DorisCluster, DorisClusterStatus};
use crate::directory::SqlDirectoryConnector;
use crate::error::{OperatorError, Result};
use crate::events::KubeEventSink;
use crate::platform::KubeResourceClient;
use crate::reconcile::{ReconcileDeps, ReconcileEngine, ReconcilerConfig};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::{Api, Patch, PatchParams};
use kube::client::Client;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::events::Reporter;
use kube::runtime::watcher;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONTROLLER_NAME: &str = "doris-operator";

/// Timing knobs of the controller loop
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Requeue after a clean cycle
    pub requeue_interval: Duration,
    /// Requeue after a failed cycle
    pub error_requeue_interval: Duration,
    /// Quiet period that coalesces bursts of watch events into one cycle
    pub debounce: Duration,
    pub reconciler: ReconcilerConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            requeue_interval: Duration::from_secs(30),
            error_requeue_interval: Duration::from_secs(15),
            debounce: Duration::from_secs(5),
            reconciler: ReconcilerConfig::default(),
        }
    }
}

/// Shared state for the operator
pub struct OperatorState {
    pub k8s_client: Client,
    pub namespace: Option<String>,
    engine: ReconcileEngine,
    reporter: Reporter,
    config: ControllerConfig,
    ready: AtomicBool,
}

impl OperatorState {
    pub fn new(k8s_client: Client, namespace: Option<String>, config: ControllerConfig) -> Self {
        let deps = ReconcileDeps {
            resources: Arc::new(KubeResourceClient::new(k8s_client.clone())),
            connector: Arc::new(SqlDirectoryConnector::new(config.reconciler.admin_timeout)),
            credentials: Arc::new(SecretCredentialsProvider::new(k8s_client.clone())),
            configs: Arc::new(ConfigMapConfigResolver::new(k8s_client.clone())),
        };
        Self {
            engine: ReconcileEngine::new(deps, config.reconciler.clone()),
            reporter: Reporter {
                controller: CONTROLLER_NAME.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
            k8s_client,
            namespace,
            config,
            ready: AtomicBool::new(false),
        }
    }

    /// The controller has started watching
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.k8s_client.clone(), ns),
            None => Api::all(self.k8s_client.clone()),
        }
    }
}

/// Run the DorisCluster controller until shutdown is signalled
pub async fn run_controller(state: Arc<OperatorState>) {
    let clusters: Api<DorisCluster> = state.api();
    let statefulsets: Api<StatefulSet> = state.api();

    info!(namespace = ?state.namespace, "DorisCluster controller starting...");
    state.ready.store(true, Ordering::Relaxed);

    Controller::new(clusters, watcher::Config::default().any_semantic())
        .owns(statefulsets, watcher::Config::default())
        .with_config(controller::Config::default().debounce(state.config.debounce))
        .shutdown_on_signal()
        .run(reconcile, error_policy, state.clone())
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(cluster = %object.name, "Reconciled"),
                Err(e) => warn!(error = %e, "Reconcile failed"),
            }
        })
        .await;

    state.ready.store(false, Ordering::Relaxed);
    info!("DorisCluster controller stopped");
}

async fn reconcile(cluster: Arc<DorisCluster>, state: Arc<OperatorState>) -> Result<Action> {
    let namespace = cluster
        .namespace()
        .ok_or(OperatorError::MissingMetadata("cluster namespace"))?;
    let name = cluster.name_any();

    let events = KubeEventSink::new(
        state.k8s_client.clone(),
        state.reporter.clone(),
        cluster.object_ref(&()),
    );
    let outcome = state.engine.reconcile(&cluster, &events).await?;

    // persist the phase machine even when parts of the cycle failed; a patch
    // that only moves the timestamp would wake this controller again
    if status_changed(cluster.status.as_ref(), &outcome.status) {
        let api: Api<DorisCluster> = Api::namespaced(state.k8s_client.clone(), &namespace);
        let patch = serde_json::json!({ "status": outcome.status });
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
    } else {
        debug!(cluster = %name, "Status unchanged, skipping patch");
    }

    match outcome.report.into_error() {
        Some(e) => Err(e),
        None => Ok(Action::requeue(state.config.requeue_interval)),
    }
}

/// Whether `next` differs from the stored status in anything but the
/// reconcile timestamp
fn status_changed(stored: Option<&DorisClusterStatus>, next: &DorisClusterStatus) -> bool {
    let Some(stored) = stored else {
        return true;
    };
    let without_time = |status: &DorisClusterStatus| DorisClusterStatus {
        last_reconcile_time: None,
        ..status.clone()
    };
    without_time(stored) != without_time(next)
}

fn error_policy(cluster: Arc<DorisCluster>, error: &OperatorError, state: Arc<OperatorState>) -> Action {
    warn!(
        cluster = %cluster.name_any(),
        namespace = ?cluster.namespace(),
        error = %error,
        "Reconcile cycle failed, requeueing"
    );
    Action::requeue(state.config.error_requeue_interval)
}
