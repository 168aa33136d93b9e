//! Observed state persisted in the DorisCluster status subresource

use doris_shared::Phase;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// DorisClusterStatus defines the observed state of DorisCluster
#[derive(Debug, Clone, Default, Deserialize, JsonSchema, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DorisClusterStatus {
    #[serde(default)]
    pub metadata_tier: MetadataTierStatus,

    /// One entry per specified compute group, plus entries for removed groups
    /// whose resources are not yet confirmed deleted
    #[serde(default)]
    pub compute_group_statuses: Vec<ComputeGroupStatus>,

    #[serde(default)]
    pub cluster_health: ClusterHealth,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<String>,

    #[serde(default)]
    pub observed_generation: i64,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComputeGroupStatus {
    pub unique_id: String,
    #[serde(default)]
    pub phase: Phase,
    pub statefulset_name: String,
    pub service_name: String,
    /// Last applied desired replica count
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub available_replicas: i32,
    #[serde(default)]
    pub suspend_replicas: i32,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataTierStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub statefulset_name: String,
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub available_replicas: i32,
}

/// Cluster-wide counters, recomputed from scratch every cycle
#[derive(Debug, Clone, Default, Deserialize, JsonSchema, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterHealth {
    #[serde(default)]
    pub cg_count: i32,
    #[serde(default)]
    pub cg_full_available_count: i32,
    #[serde(default)]
    pub cg_available_count: i32,
}
