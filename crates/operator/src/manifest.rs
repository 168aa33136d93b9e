//! Minimal StatefulSet / Service manifests for the metadata tier and compute groups
//!
//! Claim template names must agree with `storage::retained_pvc_names`, both go
//! through `labels`.

use crate::crd::{ComputeGroup, DorisCluster, MetadataTierSpec};
use crate::error::{OperatorError, Result};
use crate::labels::{
    LOG_VOLUME, META_VOLUME, cache_volume_name, compute_group_selector,
    compute_group_service_name, compute_group_statefulset_name, metadata_selector,
    metadata_service_name, metadata_statefulset_name, with_managed_by,
};
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, Service, ServicePort, ServiceSpec, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

pub const FE_EDIT_LOG_PORT: i32 = 9010;
pub const BE_HEARTBEAT_PORT: i32 = 9050;
const DEFAULT_VOLUME_SIZE: &str = "50Gi";
const LOG_MOUNT_PATH: &str = "/opt/apache-doris/log";
const META_MOUNT_PATH: &str = "/opt/apache-doris/fe/doris-meta";

/// Context shared by every object generated for one cluster
pub struct ManifestContext {
    pub namespace: String,
    pub cluster: String,
    owner: OwnerReference,
}

impl ManifestContext {
    pub fn from_cluster(cluster: &DorisCluster) -> Result<Self> {
        let namespace = cluster
            .namespace()
            .ok_or(OperatorError::MissingMetadata("cluster namespace"))?;
        let owner = cluster
            .controller_owner_ref(&())
            .ok_or(OperatorError::MissingMetadata("cluster uid"))?;
        Ok(Self {
            namespace,
            cluster: cluster.name_any(),
            owner,
        })
    }

    fn meta(&self, name: String, labels: BTreeMap<String, String>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: Some(self.namespace.clone()),
            labels: Some(labels),
            owner_references: Some(vec![self.owner.clone()]),
            ..Default::default()
        }
    }
}

fn claim_template(name: String) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(DEFAULT_VOLUME_SIZE.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

fn statefulset(
    ctx: &ManifestContext,
    name: String,
    service_name: String,
    selector: BTreeMap<String, String>,
    replicas: i32,
    container: Container,
    claims: Vec<PersistentVolumeClaim>,
) -> StatefulSet {
    let labels = with_managed_by(selector.clone());
    StatefulSet {
        metadata: ctx.meta(name, labels.clone()),
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            service_name: Some(service_name),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            // claims carry the pod labels so reclamation can list them by selector
            volume_claim_templates: Some(
                claims
                    .into_iter()
                    .map(|mut claim| {
                        claim.metadata.labels = Some(labels.clone());
                        claim
                    })
                    .collect(),
            ),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn headless_service(
    ctx: &ManifestContext,
    name: String,
    selector: BTreeMap<String, String>,
    ports: Vec<(&str, i32)>,
    publish_not_ready: bool,
) -> Service {
    Service {
        metadata: ctx.meta(name, with_managed_by(selector.clone())),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(publish_not_ready),
            selector: Some(selector),
            ports: Some(
                ports
                    .into_iter()
                    .map(|(name, port)| ServicePort {
                        name: Some(name.to_string()),
                        port,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}

/// StatefulSet of one compute group with one cache claim per storage path
pub fn compute_group_statefulset(
    ctx: &ManifestContext,
    group: &ComputeGroup,
    storage_paths: &[String],
) -> StatefulSet {
    let mut mounts = vec![mount(LOG_VOLUME, LOG_MOUNT_PATH)];
    let mut claims = vec![claim_template(LOG_VOLUME.to_string())];
    for (index, path) in storage_paths.iter().enumerate() {
        let volume = cache_volume_name(index);
        mounts.push(mount(&volume, path));
        claims.push(claim_template(volume));
    }

    let container = Container {
        name: "compute".to_string(),
        image: Some(group.image.clone()),
        ports: Some(vec![ContainerPort {
            name: Some("heartbeat".to_string()),
            container_port: BE_HEARTBEAT_PORT,
            ..Default::default()
        }]),
        volume_mounts: Some(mounts),
        ..Default::default()
    };

    statefulset(
        ctx,
        compute_group_statefulset_name(&ctx.cluster, &group.unique_id),
        compute_group_service_name(&ctx.cluster, &group.unique_id),
        compute_group_selector(&ctx.cluster, &group.unique_id),
        group.desired_replicas(),
        container,
        claims,
    )
}

pub fn compute_group_service(ctx: &ManifestContext, group: &ComputeGroup) -> Service {
    headless_service(
        ctx,
        compute_group_service_name(&ctx.cluster, &group.unique_id),
        compute_group_selector(&ctx.cluster, &group.unique_id),
        vec![("heartbeat", BE_HEARTBEAT_PORT)],
        true,
    )
}

/// Metadata tier StatefulSet for `replicas` frontends (already quorum-clamped)
pub fn metadata_statefulset(
    ctx: &ManifestContext,
    tier: &MetadataTierSpec,
    replicas: i32,
    query_port: u16,
) -> StatefulSet {
    let container = Container {
        name: "metadata".to_string(),
        image: Some(tier.image.clone()),
        ports: Some(vec![
            ContainerPort {
                name: Some("query".to_string()),
                container_port: i32::from(query_port),
                ..Default::default()
            },
            ContainerPort {
                name: Some("edit-log".to_string()),
                container_port: FE_EDIT_LOG_PORT,
                ..Default::default()
            },
        ]),
        volume_mounts: Some(vec![
            mount(META_VOLUME, META_MOUNT_PATH),
            mount(LOG_VOLUME, LOG_MOUNT_PATH),
        ]),
        ..Default::default()
    };

    statefulset(
        ctx,
        metadata_statefulset_name(&ctx.cluster),
        metadata_service_name(&ctx.cluster),
        metadata_selector(&ctx.cluster),
        replicas,
        container,
        vec![
            claim_template(META_VOLUME.to_string()),
            claim_template(LOG_VOLUME.to_string()),
        ],
    )
}

pub fn metadata_service(ctx: &ManifestContext, query_port: u16) -> Service {
    headless_service(
        ctx,
        metadata_service_name(&ctx.cluster),
        metadata_selector(&ctx.cluster),
        vec![("query", i32::from(query_port)), ("edit-log", FE_EDIT_LOG_PORT)],
        // endpoints double as the availability signal for compute groups
        false,
    )
}
