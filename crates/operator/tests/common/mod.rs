//! In-memory collaborators for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use doris_operator::cluster_config::{ConfFile, ConfigResolver, TierConfig};
use doris_operator::credentials::{AdminCredentials, CredentialsProvider};
use doris_operator::crd::{
    ComputeGroup, ComputeGroupStatus, ConfigMapRef, DorisCluster, DorisClusterSpec,
    DorisClusterStatus, MetadataTierSpec,
};
use doris_operator::directory::{
    AdminEndpoint, BackendNode, DirectoryClient, DirectoryConnector, FrontendNode, FrontendRole,
};
use doris_operator::error::{OperatorError, Result};
use doris_operator::events::{ClusterEvent, EventSink, EventType};
use doris_operator::labels::{
    compute_group_selector, compute_group_statefulset_name, metadata_selector, pod_name, pvc_name,
    selector_string,
};
use doris_operator::platform::{PodInfo, PodPhase, ResourceClient};
use doris_operator::{ReconcileDeps, ReconcileEngine, ReconcilerConfig};
use doris_shared::Phase;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "db";
pub const CLUSTER: &str = "prod";

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct PlatformState {
    pub statefulsets: HashMap<String, i32>,
    pub services: HashSet<String>,
    /// keyed by selector string
    pub pods: HashMap<String, Vec<PodInfo>>,
    /// keyed by selector string
    pub pvcs: HashMap<String, Vec<String>>,
    pub endpoints_ready: bool,
    pub fail_deletes: HashSet<String>,
    /// selector strings whose pod list is refused
    pub fail_pod_lists: HashSet<String>,
    pub applied: Vec<String>,
    pub deleted: Vec<String>,
}

#[derive(Default)]
pub struct FakeResourceClient {
    pub state: Mutex<PlatformState>,
}

impl FakeResourceClient {
    pub fn new() -> Self {
        let client = Self::default();
        client.state.lock().unwrap().endpoints_ready = true;
        client
    }

    pub fn with_statefulset(self, name: &str, replicas: i32) -> Self {
        self.state
            .lock()
            .unwrap()
            .statefulsets
            .insert(name.to_string(), replicas);
        self
    }

    pub fn with_service(self, name: &str) -> Self {
        self.state.lock().unwrap().services.insert(name.to_string());
        self
    }

    pub fn with_pods(self, selector: &BTreeMap<String, String>, pods: Vec<PodInfo>) -> Self {
        self.state
            .lock()
            .unwrap()
            .pods
            .insert(selector_string(selector), pods);
        self
    }

    pub fn with_pvcs(self, selector: &BTreeMap<String, String>, names: Vec<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .pvcs
            .insert(selector_string(selector), names);
        self
    }

    pub fn failing_delete(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_deletes
            .insert(name.to_string());
        self
    }

    pub fn failing_pods(self, selector: &BTreeMap<String, String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_pod_lists
            .insert(selector_string(selector));
        self
    }

    pub fn without_endpoints(self) -> Self {
        self.state.lock().unwrap().endpoints_ready = false;
        self
    }

    pub fn replicas(&self, name: &str) -> Option<i32> {
        self.state.lock().unwrap().statefulsets.get(name).copied()
    }

    pub fn applied(&self) -> Vec<String> {
        self.state.lock().unwrap().applied.clone()
    }

    pub fn remaining_pvcs(&self, selector: &BTreeMap<String, String>) -> Vec<String> {
        let mut names = self
            .state
            .lock()
            .unwrap()
            .pvcs
            .get(&selector_string(selector))
            .cloned()
            .unwrap_or_default();
        names.sort();
        names
    }
}

fn refused(what: &str, name: &str) -> OperatorError {
    OperatorError::Connectivity(format!("{} {} refused by fake platform", what, name))
}

#[async_trait]
impl ResourceClient for FakeResourceClient {
    async fn statefulset_replicas(&self, _namespace: &str, name: &str) -> Result<Option<i32>> {
        Ok(self.replicas(name))
    }

    async fn apply_statefulset(&self, statefulset: &StatefulSet) -> Result<()> {
        let name = statefulset.metadata.name.clone().unwrap_or_default();
        let replicas = statefulset
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        let mut state = self.state.lock().unwrap();
        state.applied.push(format!("statefulset/{}", name));
        state.statefulsets.insert(name, replicas);
        Ok(())
    }

    async fn apply_service(&self, service: &Service) -> Result<()> {
        let name = service.metadata.name.clone().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        state.applied.push(format!("service/{}", name));
        state.services.insert(name);
        Ok(())
    }

    async fn delete_statefulset(&self, _namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_deletes.contains(name) {
            return Err(refused("statefulset", name));
        }
        state.statefulsets.remove(name);
        state.deleted.push(format!("statefulset/{}", name));
        Ok(())
    }

    async fn delete_service(&self, _namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_deletes.contains(name) {
            return Err(refused("service", name));
        }
        state.services.remove(name);
        state.deleted.push(format!("service/{}", name));
        Ok(())
    }

    async fn list_pods(
        &self,
        _namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<PodInfo>> {
        let state = self.state.lock().unwrap();
        let key = selector_string(selector);
        if state.fail_pod_lists.contains(&key) {
            return Err(refused("pod list", &key));
        }
        Ok(state
            .pods
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_pvcs(
        &self,
        _namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pvcs
            .get(&selector_string(selector))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_pvc(&self, _namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_deletes.contains(name) {
            return Err(refused("pvc", name));
        }
        for names in state.pvcs.values_mut() {
            names.retain(|n| n != name);
        }
        state.deleted.push(format!("pvc/{}", name));
        Ok(())
    }

    async fn service_has_endpoints(&self, _namespace: &str, _name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().endpoints_ready)
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct DirectoryState {
    pub frontends: Vec<FrontendNode>,
    pub backends: Vec<BackendNode>,
    pub connect_fails: bool,
    pub connects: usize,
    /// hosts passed to each removal call
    pub removal_calls: Vec<Vec<String>>,
}

#[derive(Clone, Default)]
pub struct FakeDirectory {
    pub state: Arc<Mutex<DirectoryState>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frontends(self, nodes: Vec<FrontendNode>) -> Self {
        self.state.lock().unwrap().frontends = nodes;
        self
    }

    pub fn with_backends(self, nodes: Vec<BackendNode>) -> Self {
        self.state.lock().unwrap().backends.extend(nodes);
        self
    }

    pub fn unreachable(self) -> Self {
        self.state.lock().unwrap().connect_fails = true;
        self
    }

    pub fn removal_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().removal_calls.clone()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn backend_hosts(&self, group: &str) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .backends
            .iter()
            .filter(|b| b.compute_group.as_deref() == Some(group))
            .map(|b| b.host.clone())
            .collect();
        hosts.sort();
        hosts
    }
}

struct FakeDirectoryClient {
    state: Arc<Mutex<DirectoryState>>,
}

#[async_trait]
impl DirectoryClient for FakeDirectoryClient {
    async fn list_metadata_nodes(&mut self) -> Result<Vec<FrontendNode>> {
        Ok(self.state.lock().unwrap().frontends.clone())
    }

    async fn list_compute_nodes(&mut self, compute_group: &str) -> Result<Vec<BackendNode>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .backends
            .iter()
            .filter(|b| b.compute_group.as_deref() == Some(compute_group))
            .cloned()
            .collect())
    }

    async fn remove_metadata_nodes(&mut self, nodes: &[FrontendNode]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let mut hosts: Vec<String> = nodes.iter().map(|n| n.host.clone()).collect();
        hosts.sort();
        state.frontends.retain(|f| !hosts.contains(&f.host));
        state.removal_calls.push(hosts);
        Ok(())
    }

    async fn remove_compute_nodes(&mut self, nodes: &[BackendNode]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let mut hosts: Vec<String> = nodes.iter().map(|n| n.host.clone()).collect();
        hosts.sort();
        state.backends.retain(|b| !hosts.contains(&b.host));
        state.removal_calls.push(hosts);
        Ok(())
    }
}

#[async_trait]
impl DirectoryConnector for FakeDirectory {
    async fn connect(&self, endpoint: &AdminEndpoint) -> Result<Box<dyn DirectoryClient>> {
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        if state.connect_fails {
            return Err(OperatorError::Connectivity(format!(
                "no leader reachable through {}:{}",
                endpoint.host, endpoint.port
            )));
        }
        Ok(Box::new(FakeDirectoryClient {
            state: self.state.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Events, credentials, configuration
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingEventSink {
    pub events: Mutex<Vec<ClusterEvent>>,
}

impl RecordingEventSink {
    pub fn warnings(&self) -> Vec<ClusterEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == EventType::Warning)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<ClusterEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: ClusterEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct StaticCredentials;

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn credentials(
        &self,
        _namespace: &str,
        _secret_name: Option<&str>,
    ) -> Result<AdminCredentials> {
        Ok(AdminCredentials::default())
    }
}

pub struct StaticConfigs {
    pub frontend: String,
    pub backend: String,
}

impl Default for StaticConfigs {
    fn default() -> Self {
        Self {
            frontend: "enable_fqdn_mode = true\nquery_port = 9030".to_string(),
            backend: r#"file_cache_path = [{"path":"/opt/apache-doris/be/file_cache"}]"#.to_string(),
        }
    }
}

#[async_trait]
impl ConfigResolver for StaticConfigs {
    async fn resolve(
        &self,
        _namespace: &str,
        _config_maps: &[ConfigMapRef],
        file: ConfFile,
    ) -> Result<TierConfig> {
        Ok(match file {
            ConfFile::Frontend => TierConfig::parse(&self.frontend),
            ConfFile::Backend => TierConfig::parse(&self.backend),
        })
    }
}

/// Resolves fe.conf and refuses every be.conf lookup
pub struct BackendConfigUnavailable;

#[async_trait]
impl ConfigResolver for BackendConfigUnavailable {
    async fn resolve(
        &self,
        namespace: &str,
        config_maps: &[ConfigMapRef],
        file: ConfFile,
    ) -> Result<TierConfig> {
        match file {
            ConfFile::Frontend => {
                StaticConfigs::default()
                    .resolve(namespace, config_maps, file)
                    .await
            }
            ConfFile::Backend => Err(OperatorError::Connectivity(
                "configmap read refused by fake platform".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn engine(resources: Arc<FakeResourceClient>, directory: FakeDirectory) -> ReconcileEngine {
    engine_with_configs(resources, directory, Arc::new(StaticConfigs::default()))
}

pub fn engine_with_configs(
    resources: Arc<FakeResourceClient>,
    directory: FakeDirectory,
    configs: Arc<dyn ConfigResolver>,
) -> ReconcileEngine {
    ReconcileEngine::new(
        ReconcileDeps {
            resources,
            connector: Arc::new(directory),
            credentials: Arc::new(StaticCredentials),
            configs,
        },
        ReconcilerConfig {
            admin_timeout: Duration::from_secs(5),
        },
    )
}

pub fn group(unique_id: &str, replicas: i32) -> ComputeGroup {
    ComputeGroup {
        unique_id: unique_id.to_string(),
        replicas: Some(replicas),
        image: "apache/doris:be-3.0".to_string(),
        config_maps: vec![],
    }
}

pub fn cluster(metadata_replicas: i32, groups: Vec<ComputeGroup>) -> DorisCluster {
    let mut cluster = DorisCluster::new(
        CLUSTER,
        DorisClusterSpec {
            auth_secret: None,
            meta_service: MetadataTierSpec {
                replicas: Some(metadata_replicas),
                election_number: Some(3),
                image: "apache/doris:fe-3.0".to_string(),
                config_maps: vec![],
            },
            compute_groups: groups,
        },
    );
    cluster.metadata.namespace = Some(NAMESPACE.to_string());
    cluster.metadata.uid = Some("0d5c1a7e-uid".to_string());
    cluster.metadata.generation = Some(2);
    cluster
}

pub fn with_status(mut cluster: DorisCluster, statuses: Vec<ComputeGroupStatus>) -> DorisCluster {
    cluster.status = Some(DorisClusterStatus {
        compute_group_statuses: statuses,
        ..Default::default()
    });
    cluster
}

pub fn group_status(unique_id: &str, phase: Phase, replicas: i32) -> ComputeGroupStatus {
    let sts = compute_group_statefulset_name(CLUSTER, unique_id);
    ComputeGroupStatus {
        unique_id: unique_id.to_string(),
        phase,
        statefulset_name: sts.clone(),
        service_name: sts,
        replicas,
        available_replicas: replicas,
        suspend_replicas: 0,
    }
}

pub fn backend_host(unique_id: &str, ordinal: u32) -> String {
    let sts = compute_group_statefulset_name(CLUSTER, unique_id);
    format!("{}-{}.{}.{}.svc.cluster.local", sts, ordinal, sts, NAMESPACE)
}

pub fn backends(unique_id: &str, ordinals: std::ops::Range<u32>) -> Vec<BackendNode> {
    ordinals
        .map(|ordinal| BackendNode {
            backend_id: format!("1000{}", ordinal),
            host: backend_host(unique_id, ordinal),
            heartbeat_port: 9050,
            compute_group: Some(unique_id.to_string()),
        })
        .collect()
}

pub fn frontend_host(ordinal: u32) -> String {
    format!("{}-fe-{}.{}-fe.{}.svc.cluster.local", CLUSTER, ordinal, CLUSTER, NAMESPACE)
}

/// Followers at ordinals `0..followers` (leader at 0), observers after them
pub fn frontends(followers: u32, observers: u32) -> Vec<FrontendNode> {
    (0..followers + observers)
        .map(|ordinal| FrontendNode {
            host: frontend_host(ordinal),
            edit_log_port: 9010,
            role: if ordinal < followers {
                FrontendRole::Follower
            } else {
                FrontendRole::Observer
            },
            is_leader: ordinal == 0,
        })
        .collect()
}

pub fn ready_pods(prefix: &str, count: u32) -> Vec<PodInfo> {
    (0..count)
        .map(|ordinal| PodInfo {
            name: pod_name(prefix, ordinal),
            ip: Some(format!("10.1.0.{}", ordinal + 10)),
            phase: PodPhase::Running,
            ready: true,
        })
        .collect()
}

pub fn group_pvcs(unique_id: &str, replicas: u32) -> Vec<String> {
    let sts = compute_group_statefulset_name(CLUSTER, unique_id);
    (0..replicas)
        .flat_map(|ordinal| [pvc_name("log", &sts, ordinal), pvc_name("cache0", &sts, ordinal)])
        .collect()
}

pub fn cg_selector(unique_id: &str) -> BTreeMap<String, String> {
    compute_group_selector(CLUSTER, unique_id)
}

pub fn fe_selector() -> BTreeMap<String, String> {
    metadata_selector(CLUSTER)
}
