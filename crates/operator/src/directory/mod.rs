//! Administrative node directory of the database
//!
//! A `DirectoryConnector` opens a session against the current leader; the
//! resulting `DirectoryClient` lists and removes metadata (frontend) and
//! compute (backend) nodes. Leadership discovery is the connector's job, so
//! callers never need to know which frontend they talk to.

use crate::credentials::AdminCredentials;
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

mod sql;

pub use sql::SqlDirectoryConnector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontendRole {
    /// Takes part in leader election
    Follower,
    /// Replicates metadata, never elected
    Observer,
}

impl FromStr for FrontendRole {
    type Err = OperatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FOLLOWER" => Ok(FrontendRole::Follower),
            "OBSERVER" => Ok(FrontendRole::Observer),
            other => Err(OperatorError::Directory(format!(
                "unknown frontend role '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for FrontendRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrontendRole::Follower => write!(f, "FOLLOWER"),
            FrontendRole::Observer => write!(f, "OBSERVER"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendNode {
    pub host: String,
    pub edit_log_port: u16,
    pub role: FrontendRole,
    pub is_leader: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendNode {
    pub backend_id: String,
    pub host: String,
    pub heartbeat_port: u16,
    pub compute_group: Option<String>,
}

/// Live node record whose host identifies the pod it runs in
pub trait NodeHost {
    fn host(&self) -> &str;
}

impl NodeHost for FrontendNode {
    fn host(&self) -> &str {
        &self.host
    }
}

impl NodeHost for BackendNode {
    fn host(&self) -> &str {
        &self.host
    }
}

/// Where to open the administrative session. Any frontend will do; the
/// connector follows leadership from there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminEndpoint {
    pub host: String,
    pub port: u16,
    pub credentials: AdminCredentials,
}

#[async_trait]
pub trait DirectoryClient: Send {
    async fn list_metadata_nodes(&mut self) -> Result<Vec<FrontendNode>>;

    /// Backends registered under `compute_group`
    async fn list_compute_nodes(&mut self, compute_group: &str) -> Result<Vec<BackendNode>>;

    /// Remove the given observers. Nodes the leader no longer knows count as removed.
    async fn remove_metadata_nodes(&mut self, nodes: &[FrontendNode]) -> Result<()>;

    /// Drop the given backends without decommissioning. Nodes the leader no
    /// longer knows count as removed.
    async fn remove_compute_nodes(&mut self, nodes: &[BackendNode]) -> Result<()>;
}

#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Open a session against the leader; `Connectivity` if none is reachable
    async fn connect(&self, endpoint: &AdminEndpoint) -> Result<Box<dyn DirectoryClient>>;
}
