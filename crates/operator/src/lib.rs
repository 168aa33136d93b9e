//! Doris Operator - Kubernetes operator for disaggregated Doris clusters
//!
//! The operator keeps a cluster's StatefulSets, Services and volume claims in
//! line with its `DorisCluster` resource, and keeps the database's own node
//! membership in line with the same resource. Scale-down is the delicate
//! part: nodes are drained from the database before (metadata tier) or right
//! after (compute groups) their pods go away, and a per-group phase machine
//! in the status subresource tracks progress across restarts.

pub mod cluster_config;
pub mod credentials;
pub mod crd;
pub mod directory;
pub mod drain;
pub mod error;
pub mod events;
pub mod labels;
pub mod manifest;
pub mod phase;
pub mod platform;
pub mod reconcile;
pub mod status;
pub mod storage;
pub mod topology;
pub mod watcher;

pub use error::{OperatorError, Result};
pub use reconcile::{CycleOutcome, CycleReport, ReconcileDeps, ReconcileEngine, ReconcilerConfig};
pub use watcher::{ControllerConfig, OperatorState, run_controller};
