//! Configuration loader
//!
//! Provides the ConfigLoader which loads configuration from an optional
//! .env file and environment variables.

use std::path::Path;

use super::dto::{LoggingConfig, OperatorConfigDto};
use super::error::{ConfigError, Result};
use super::validator::validate_operator_config;

/// Configuration loader
///
/// Values come from, in order of precedence:
/// 1. Environment variables
/// 2. .env file (optional; never overrides a variable already set)
/// 3. Built-in defaults
///
/// # Example
///
/// ```ignore
/// use doris_shared::config::ConfigLoader;
/// use std::path::PathBuf;
///
/// let loader = ConfigLoader::new(Some(PathBuf::from(".env")));
/// let config = loader.load_operator_config()?;
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Optional path to .env file
    env_file_path: Option<std::path::PathBuf>,
}

impl ConfigLoader {
    /// Create a new ConfigLoader
    ///
    /// # Arguments
    ///
    /// * `env_file_path` - Optional path to .env file. If provided, the file
    ///                     is loaded before reading environment variables.
    pub fn new(env_file_path: Option<std::path::PathBuf>) -> Self {
        Self { env_file_path }
    }

    /// Load operator configuration
    ///
    /// # Returns
    ///
    /// `Ok(OperatorConfigDto)` if configuration is valid
    /// `Err(ConfigError)` if the env file cannot be read or a value is invalid
    pub fn load_operator_config(&self) -> Result<OperatorConfigDto> {
        // 1. Load .env file if provided
        if let Some(path) = &self.env_file_path {
            self.load_env_file(path)?;
        }

        // 2. Build config from environment
        let config = OperatorConfigDto::from_env()?;

        // 3. Validate configuration
        validate_operator_config(&config)?;

        Ok(config)
    }

    fn load_env_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(ConfigError::EnvFileLoad {
                path: path.to_path_buf(),
                source: dotenv::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path.display()),
                )),
            });
        }

        dotenv::from_path(path).map_err(|e| ConfigError::EnvFileLoad {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }
}

impl Default for ConfigLoader {
    /// Create a ConfigLoader without .env file support
    fn default() -> Self {
        Self::new(None)
    }
}

// ============================================================================
// Implementation: OperatorConfigDto::from_env
// ============================================================================

impl OperatorConfigDto {
    /// Build operator configuration from environment variables
    ///
    /// Every variable is optional; unset variables fall back to
    /// `OperatorConfigDto::default()`. A variable that is set but cannot be
    /// parsed is an error rather than a silent fallback.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let namespace = std::env::var("DORIS_OPERATOR_NAMESPACE")
            .ok()
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty());

        let health_bind = match std::env::var("DORIS_OPERATOR_HEALTH_BIND") {
            Ok(raw) => raw.parse().map_err(|_| {
                ConfigError::InvalidSocketAddr(format!(
                    "DORIS_OPERATOR_HEALTH_BIND must be host:port, got: {}",
                    raw
                ))
            })?,
            Err(_) => defaults.health_bind,
        };

        Ok(Self {
            namespace,
            health_bind,
            requeue_secs: parse_optional_var("DORIS_OPERATOR_REQUEUE_SECS", defaults.requeue_secs)?,
            error_requeue_secs: parse_optional_var(
                "DORIS_OPERATOR_ERROR_REQUEUE_SECS",
                defaults.error_requeue_secs,
            )?,
            debounce_secs: parse_optional_var("DORIS_OPERATOR_DEBOUNCE_SECS", defaults.debounce_secs)?,
            admin_timeout_secs: parse_optional_var(
                "DORIS_OPERATOR_ADMIN_TIMEOUT_SECS",
                defaults.admin_timeout_secs,
            )?,
            logging: LoggingConfig {
                filter: std::env::var("RUST_LOG").unwrap_or(defaults.logging.filter),
            },
        })
    }
}

fn parse_optional_var<T>(var: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

// ============================================================================
// Tests
// ============================================================================
