//! kube-rs implementation of `ResourceClient`

use super::{PodInfo, PodPhase, ResourceClient};
use crate::error::{OperatorError, Result};
use crate::labels::{MANAGER, selector_string};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Endpoints, PersistentVolumeClaim, Pod, Service};
use kube::{
    Client,
    api::{Api, DeleteParams, ListParams, Patch, PatchParams},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, info};

#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Server-side apply owned by the operator's field manager
    async fn apply<K>(&self, namespace: &str, name: &str, object: &K) -> Result<()>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::apply(MANAGER).force();
        api.patch(name, &params, &Patch::Apply(object)).await?;
        Ok(())
    }

    async fn delete_ignoring_absent<K>(&self, namespace: &str, name: &str) -> Result<()>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(namespace = %namespace, name = %name, kind = %K::kind(&Default::default()), "Deleted resource");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(namespace = %namespace, name = %name, "Resource already deleted");
                Ok(())
            }
            Err(e) => Err(OperatorError::Kube(e)),
        }
    }

    fn pod_info(pod: &Pod) -> Option<PodInfo> {
        let name = pod.metadata.name.clone()?;
        let status = pod.status.as_ref();
        let ready = status
            .and_then(|s| s.conditions.as_ref())
            .map(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Ready" && c.status == "True")
            })
            .unwrap_or(false);

        Some(PodInfo {
            name,
            ip: status.and_then(|s| s.pod_ip.clone()),
            phase: PodPhase::parse(status.and_then(|s| s.phase.as_deref())),
            ready,
        })
    }
}

fn object_name<'a>(name: &'a Option<String>, what: &'static str) -> Result<&'a str> {
    name.as_deref().ok_or(OperatorError::MissingMetadata(what))
}

fn object_namespace<'a>(namespace: &'a Option<String>, what: &'static str) -> Result<&'a str> {
    namespace.as_deref().ok_or(OperatorError::MissingMetadata(what))
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn statefulset_replicas(&self, namespace: &str, name: &str) -> Result<Option<i32>> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let existing = api.get_opt(name).await?;
        Ok(existing.map(|st| st.spec.and_then(|s| s.replicas).unwrap_or(1)))
    }

    async fn apply_statefulset(&self, statefulset: &StatefulSet) -> Result<()> {
        let name = object_name(&statefulset.metadata.name, "statefulset name")?;
        let namespace = object_namespace(&statefulset.metadata.namespace, "statefulset namespace")?;
        self.apply(namespace, name, statefulset).await
    }

    async fn apply_service(&self, service: &Service) -> Result<()> {
        let name = object_name(&service.metadata.name, "service name")?;
        let namespace = object_namespace(&service.metadata.namespace, "service namespace")?;
        self.apply(namespace, name, service).await
    }

    async fn delete_statefulset(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete_ignoring_absent::<StatefulSet>(namespace, name).await
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete_ignoring_absent::<Service>(namespace, name).await
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<PodInfo>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&ListParams::default().labels(&selector_string(selector)))
            .await?;
        Ok(pods.items.iter().filter_map(Self::pod_info).collect())
    }

    async fn list_pvcs(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let claims = api
            .list(&ListParams::default().labels(&selector_string(selector)))
            .await?;
        Ok(claims
            .items
            .into_iter()
            .filter_map(|claim| claim.metadata.name)
            .collect())
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete_ignoring_absent::<PersistentVolumeClaim>(namespace, name)
            .await
    }

    async fn service_has_endpoints(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        let endpoints = api.get_opt(name).await?;
        Ok(endpoints
            .and_then(|ep| ep.subsets)
            .map(|subsets| {
                subsets
                    .iter()
                    .any(|s| s.addresses.as_ref().is_some_and(|a| !a.is_empty()))
            })
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(name: &str, phase: &str, ready: bool) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                pod_ip: Some("10.0.0.7".to_string()),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_pod_info_reads_ready_condition() {
        let info = KubeResourceClient::pod_info(&pod("prod-cg1-0", "Running", true)).unwrap();
        assert_eq!(info.name, "prod-cg1-0");
        assert_eq!(info.ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(info.phase, PodPhase::Running);
        assert!(info.ready);

        let info = KubeResourceClient::pod_info(&pod("prod-cg1-1", "Running", false)).unwrap();
        assert!(!info.ready);
    }

    #[test]
    fn test_pod_without_name_is_skipped() {
        let mut unnamed = pod("x", "Running", true);
        unnamed.metadata.name = None;
        assert!(KubeResourceClient::pod_info(&unnamed).is_none());
    }
}
