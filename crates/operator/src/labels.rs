//! Labels and naming conventions shared by manifests, topology resolution,
//! storage reclamation and status aggregation.
//!
//! Every consumer derives selectors from the same functions, so the pods a
//! drain resolves against are exactly the pods whose volumes get reclaimed.

use std::collections::BTreeMap;

pub const CLUSTER_LABEL: &str = "doris.io/cluster";
pub const COMPONENT_LABEL: &str = "doris.io/component";
pub const COMPUTE_GROUP_LABEL: &str = "doris.io/compute-group";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGER: &str = "doris-operator";

/// Volume claim template holding node logs
pub const LOG_VOLUME: &str = "log";
/// Prefix of the per-path cache volume claim templates (`cache0`, `cache1`, ...)
pub const CACHE_VOLUME_PREFIX: &str = "cache";
/// Volume claim template holding frontend metadata
pub const META_VOLUME: &str = "meta";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Metadata,
    Compute,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Metadata => "fe",
            Component::Compute => "be",
        }
    }
}

/// Selector for every pod/PVC of one compute group
pub fn compute_group_selector(cluster: &str, unique_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CLUSTER_LABEL.to_string(), cluster.to_string()),
        (
            COMPONENT_LABEL.to_string(),
            Component::Compute.as_str().to_string(),
        ),
        (COMPUTE_GROUP_LABEL.to_string(), unique_id.to_string()),
    ])
}

/// Selector for every pod/PVC of the metadata tier
pub fn metadata_selector(cluster: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CLUSTER_LABEL.to_string(), cluster.to_string()),
        (
            COMPONENT_LABEL.to_string(),
            Component::Metadata.as_str().to_string(),
        ),
    ])
}

/// Selector labels plus the ownership marker applied to generated objects
pub fn with_managed_by(mut labels: BTreeMap<String, String>) -> BTreeMap<String, String> {
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGER.to_string());
    labels
}

/// `k1=v1,k2=v2` form accepted by the list API
pub fn selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Compute group name as registered inside the database, which rejects dashes
pub fn compute_group_name(unique_id: &str) -> String {
    unique_id.replace('-', "_")
}

/// Resource names reject underscores and upper case
pub fn compute_group_statefulset_name(cluster: &str, unique_id: &str) -> String {
    format!("{}-{}", cluster, unique_id.replace('_', "-").to_lowercase())
}

/// Headless service name; equal to the StatefulSet name so pod FQDNs are
/// `<sts>-<ordinal>.<sts>.<namespace>...`
pub fn compute_group_service_name(cluster: &str, unique_id: &str) -> String {
    compute_group_statefulset_name(cluster, unique_id)
}

pub fn metadata_statefulset_name(cluster: &str) -> String {
    format!("{}-{}", cluster, Component::Metadata.as_str())
}

pub fn metadata_service_name(cluster: &str) -> String {
    metadata_statefulset_name(cluster)
}

/// Pod name of replica `ordinal` of a StatefulSet
pub fn pod_name(statefulset: &str, ordinal: u32) -> String {
    format!("{}-{}", statefulset, ordinal)
}

/// Name the platform gives the claim of `volume` for replica `ordinal`
pub fn pvc_name(volume: &str, statefulset: &str, ordinal: u32) -> String {
    format!("{}-{}-{}", volume, statefulset, ordinal)
}

pub fn cache_volume_name(index: usize) -> String {
    format!("{}{}", CACHE_VOLUME_PREFIX, index)
}
