//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::VerifierConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading and node registration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<VerifierConfig, ConfigError> {
    let config: VerifierConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<VerifierConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CLUSTER: &str = r#"
        [[nodes]]
        id = "primary"
        role = "primary"
        host = "10.0.0.1"

        [[nodes]]
        id = "replica-1"
        role = "replica"
        host = "10.0.0.2"
        port = 3307

        [pool]
        min_connections = 2
        max_connections = 8

        [capacity]
        batch_sizes = [5, 10]
    "#;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CLUSTER.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[1].port, 3307);
        assert_eq!(config.pool.max_connections, 8);
        assert_eq!(config.capacity.batch_sizes, vec![5, 10]);
        // untouched sections keep their defaults
        assert_eq!(config.failover.outage_secs, 5);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/verifier.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_empty_config_fails_validation() {
        let err = parse_config("").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(err.to_string(), "Validation failed: no nodes configured");
    }

    #[test]
    fn test_bad_role_is_parse_error() {
        let err = parse_config(
            r#"
            [[nodes]]
            id = "x"
            role = "leader"
            host = "h"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
