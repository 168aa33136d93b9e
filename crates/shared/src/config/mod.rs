//! Configuration module for the Doris operator
//!
//! Centralized configuration loading, validation, and the immutable DTO that
//! is handed to the controller at startup.
//!
//! # Architecture
//!
//! 1. **Single Source of Truth**: configuration is loaded once at startup
//! 2. **Fail Fast**: invalid values are reported immediately
//! 3. **Precedence**: environment variables > `.env` file > defaults
//!
//! # Usage
//!
//! ```ignore
//! use doris_shared::config::ConfigLoader;
//! use std::path::PathBuf;
//!
//! let loader = ConfigLoader::new(Some(PathBuf::from(".env")));
//! let config = loader.load_operator_config()?;
//! println!("Health endpoint binds to: {}", config.health_bind);
//! ```
//!
//! # Environment Variables
//!
//! All variables are optional:
//!
//! - `DORIS_OPERATOR_NAMESPACE`: restrict the watch to one namespace (default: all)
//! - `DORIS_OPERATOR_HEALTH_BIND`: health endpoint address (default: "0.0.0.0:8080")
//! - `DORIS_OPERATOR_REQUEUE_SECS`: steady-state requeue interval (default: 30)
//! - `DORIS_OPERATOR_ERROR_REQUEUE_SECS`: requeue interval after a failed cycle (default: 15)
//! - `DORIS_OPERATOR_DEBOUNCE_SECS`: quiet period before watch events are reconciled (default: 5)
//! - `DORIS_OPERATOR_ADMIN_TIMEOUT_SECS`: bound for one administrative SQL drain (default: 30)
//! - `RUST_LOG`: log filter (default: "info")

pub mod dto;
pub mod error;
pub mod loader;
pub mod validator;

pub use dto::{LoggingConfig, OperatorConfigDto};
pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;
pub use validator::{validate_bind_address, validate_namespace, validate_operator_config};
