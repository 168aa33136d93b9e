//! CRD Definitions for the Doris operator
//!
//! A `DorisCluster` declares one metadata tier (frontends) and any number of
//! compute groups (backends). The status subresource carries the per-group
//! phase machine so scaling progress survives operator restarts.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod cluster;
mod status;

pub use cluster::{ComputeGroup, DorisCluster, DorisClusterSpec, MetadataTierSpec};
pub use status::{ClusterHealth, ComputeGroupStatus, DorisClusterStatus, MetadataTierStatus};

/// Reference to a ConfigMap holding `fe.conf` / `be.conf`
#[derive(Debug, Clone, Default, Deserialize, JsonSchema, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
}
