//! Configuration validation

use super::dto::OperatorConfigDto;
use super::error::{ConfigError, Result};
use std::net::SocketAddr;

/// Longest administrative timeout accepted; a drain blocked longer than this
/// holds up every other group of the cluster.
const MAX_ADMIN_TIMEOUT_SECS: u64 = 600;

/// Validate the health endpoint bind address
pub fn validate_bind_address(addr: &SocketAddr) -> Result<()> {
    if addr.port() == 0 {
        return Err(ConfigError::InvalidSocketAddr(format!(
            "Port cannot be 0 in bind address: {}",
            addr
        )));
    }
    Ok(())
}

/// Validate a namespace name (RFC 1123 DNS label)
pub fn validate_namespace(namespace: &str) -> Result<()> {
    let valid_chars = namespace
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if namespace.is_empty()
        || namespace.len() > 63
        || !valid_chars
        || namespace.starts_with('-')
        || namespace.ends_with('-')
    {
        return Err(ConfigError::InvalidValue {
            var: "DORIS_OPERATOR_NAMESPACE".to_string(),
            value: namespace.to_string(),
        });
    }
    Ok(())
}

/// Validate the complete operator configuration
pub fn validate_operator_config(config: &OperatorConfigDto) -> Result<()> {
    validate_bind_address(&config.health_bind)?;

    if let Some(namespace) = &config.namespace {
        validate_namespace(namespace)?;
    }

    if config.requeue_secs == 0 {
        return Err(ConfigError::Validation(
            "requeue interval must be > 0".to_string(),
        ));
    }

    if config.error_requeue_secs == 0 {
        return Err(ConfigError::Validation(
            "error requeue interval must be > 0".to_string(),
        ));
    }

    if config.admin_timeout_secs == 0 || config.admin_timeout_secs > MAX_ADMIN_TIMEOUT_SECS {
        return Err(ConfigError::Validation(format!(
            "admin timeout must be within 1..={} seconds, got {}",
            MAX_ADMIN_TIMEOUT_SECS, config.admin_timeout_secs
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_operator_config(&OperatorConfigDto::default()).is_ok());
    }

    #[test]
    fn test_bind_address_port_zero_rejected() {
        let addr: SocketAddr = "0.0.0.0:0".parse().unwrap();
        assert!(validate_bind_address(&addr).is_err());
    }

    #[rstest]
    #[case("doris", true)]
    #[case("doris-prod-1", true)]
    #[case("", false)]
    #[case("Doris", false)]
    #[case("-doris", false)]
    #[case("doris_prod", false)]
    fn test_validate_namespace(#[case] namespace: &str, #[case] valid: bool) {
        assert_eq!(validate_namespace(namespace).is_ok(), valid);
    }

    #[test]
    fn test_admin_timeout_bounds() {
        let mut config = OperatorConfigDto::default();
        config.admin_timeout_secs = 0;
        assert!(validate_operator_config(&config).is_err());

        config.admin_timeout_secs = MAX_ADMIN_TIMEOUT_SECS + 1;
        assert!(validate_operator_config(&config).is_err());

        config.admin_timeout_secs = MAX_ADMIN_TIMEOUT_SECS;
        assert!(validate_operator_config(&config).is_ok());
    }

    #[test]
    fn test_zero_requeue_rejected() {
        let mut config = OperatorConfigDto::default();
        config.requeue_secs = 0;
        assert!(matches!(
            validate_operator_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }
}
