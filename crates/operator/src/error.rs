//! Error taxonomy for the reconciliation core.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OperatorError {
    /// Spec rejected before any resource is touched
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No administrative leader reachable, or the platform API is unreachable
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// A live node could not be mapped back to a pod ordinal
    #[error("Unresolvable topology: {0}")]
    UnresolvableTopology(String),

    /// An administrative command was rejected by the database
    #[error("Directory command failed: {0}")]
    Directory(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Timed out after {0:?} while {1}")]
    Timeout(Duration, String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Missing object metadata: {0}")]
    MissingMetadata(&'static str),

    /// Failure scoped to one compute group
    #[error("compute group {unique_id}: {source}")]
    Group {
        unique_id: String,
        #[source]
        source: Box<OperatorError>,
    },

    #[error("Background task failed: {0}")]
    Task(String),

    /// Independent units of work that failed in the same pass
    #[error("{} operations failed: {}", .0.len(), .0.join("; "))]
    Aggregate(Vec<String>),
}

impl OperatorError {
    /// Merge independent failures into one error. `None` when nothing failed.
    pub fn merge(errors: Vec<OperatorError>) -> Option<OperatorError> {
        match errors.len() {
            0 => None,
            1 => errors.into_iter().next(),
            _ => Some(OperatorError::Aggregate(
                errors.into_iter().map(|e| e.to_string()).collect(),
            )),
        }
    }

    pub fn in_group(self, unique_id: &str) -> OperatorError {
        OperatorError::Group {
            unique_id: unique_id.to_string(),
            source: Box::new(self),
        }
    }

    pub fn is_connectivity(&self) -> bool {
        match self {
            OperatorError::Connectivity(_) | OperatorError::Timeout(..) => true,
            OperatorError::Group { source, .. } => source.is_connectivity(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;
