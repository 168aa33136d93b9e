//! DorisCluster CRD - desired topology of a disaggregated cluster

use super::*;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const DEFAULT_METADATA_REPLICAS: i32 = 3;
const DEFAULT_ELECTION_NUMBER: i32 = 3;
const DEFAULT_COMPUTE_REPLICAS: i32 = 1;

/// DorisCluster CRD
#[derive(CustomResource, Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[kube(
    group = "doris.io",
    version = "v1",
    kind = "DorisCluster",
    plural = "dorisclusters",
    namespaced,
    status = "DorisClusterStatus",
    shortname = "dc",
    printcolumn = r#"{"name":"FE", "type":"string", "jsonPath":".status.metadataTier.phase"}"#,
    printcolumn = r#"{"name":"Groups", "type":"integer", "jsonPath":".status.clusterHealth.cgCount"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.clusterHealth.cgFullAvailableCount"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DorisClusterSpec {
    /// Secret with `username` / `password` for administrative SQL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret: Option<String>,

    /// Metadata tier (frontends)
    pub meta_service: MetadataTierSpec,

    /// Independently scalable compute groups (backends)
    #[serde(default)]
    pub compute_groups: Vec<ComputeGroup>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataTierSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Members taking part in leader election; the tier never shrinks below it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election_number: Option<i32>,

    pub image: String,

    #[serde(default)]
    pub config_maps: Vec<ConfigMapRef>,
}

impl MetadataTierSpec {
    pub fn desired_replicas(&self) -> i32 {
        self.replicas.unwrap_or(DEFAULT_METADATA_REPLICAS)
    }

    pub fn election_number(&self) -> i32 {
        self.election_number.unwrap_or(DEFAULT_ELECTION_NUMBER)
    }
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComputeGroup {
    /// Stable identifier, unique within the cluster
    pub unique_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    pub image: String,

    #[serde(default)]
    pub config_maps: Vec<ConfigMapRef>,
}

impl ComputeGroup {
    pub fn desired_replicas(&self) -> i32 {
        self.replicas.unwrap_or(DEFAULT_COMPUTE_REPLICAS).max(0)
    }
}
