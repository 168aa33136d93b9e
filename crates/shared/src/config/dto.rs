//! Configuration Data Transfer Objects (DTOs)
//!
//! Immutable configuration handed to the controller at startup.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration DTO for the operator process
///
/// Loaded once at startup and shared with the controller context.
///
/// # Example
///
/// ```ignore
/// use doris_shared::config::OperatorConfigDto;
///
/// let config = OperatorConfigDto::from_env()?;
/// println!("Drains are bounded by {:?}", config.admin_timeout());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfigDto {
    /// Namespace to watch; `None` watches every namespace
    pub namespace: Option<String>,

    /// Bind address of the health endpoint
    pub health_bind: SocketAddr,

    /// Requeue interval after a successful cycle (seconds)
    pub requeue_secs: u64,

    /// Requeue interval after a failed cycle (seconds)
    pub error_requeue_secs: u64,

    /// Quiet period before a burst of watch events is reconciled (seconds)
    pub debounce_secs: u64,

    /// Upper bound for one administrative connection + drain attempt (seconds)
    pub admin_timeout_secs: u64,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl OperatorConfigDto {
    pub fn requeue_interval(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }

    pub fn error_requeue_interval(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn admin_timeout(&self) -> Duration {
        Duration::from_secs(self.admin_timeout_secs)
    }
}

impl Default for OperatorConfigDto {
    fn default() -> Self {
        Self {
            namespace: None,
            health_bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            requeue_secs: 30,
            error_requeue_secs: 15,
            debounce_secs: 5,
            admin_timeout_secs: 30,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `RUST_LOG`-style filter directive
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
