//! Orchestration platform access
//!
//! The reconciliation core only needs idempotent apply, label-selector
//! list and delete-by-name semantics. `KubeResourceClient` provides them on
//! top of kube-rs; tests substitute in-memory fakes.

use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use std::collections::BTreeMap;

mod kube_client;

pub use kube_client::KubeResourceClient;

/// Pod lifecycle phase as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

/// The slice of a Pod the core looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    pub ip: Option<String>,
    pub phase: PodPhase,
    /// `Ready` condition is `True`
    pub ready: bool,
}

#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Replica count of an existing StatefulSet, `None` when it does not exist
    async fn statefulset_replicas(&self, namespace: &str, name: &str) -> Result<Option<i32>>;

    /// Create or update a StatefulSet
    async fn apply_statefulset(&self, statefulset: &StatefulSet) -> Result<()>;

    /// Create or update a Service
    async fn apply_service(&self, service: &Service) -> Result<()>;

    /// Delete a StatefulSet; an absent object is not an error
    async fn delete_statefulset(&self, namespace: &str, name: &str) -> Result<()>;

    /// Delete a Service; an absent object is not an error
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()>;

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<PodInfo>>;

    /// Names of PersistentVolumeClaims matching the selector
    async fn list_pvcs(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>>;

    /// Delete a PersistentVolumeClaim; an absent claim is not an error
    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<()>;

    /// True when the Service has at least one ready endpoint address
    async fn service_has_endpoints(&self, namespace: &str, name: &str) -> Result<bool>;
}
