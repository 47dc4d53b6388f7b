//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics. Every problem is
//! collected so a bad file is reported in one pass.

use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::{NodeConfig, NodeRole, VerifierConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no nodes configured")]
    NoNodes,

    #[error("first node must be the primary, found {0}")]
    PrimaryNotFirst(String),

    #[error("node {0} is a second primary")]
    ExtraPrimary(String),

    #[error("duplicate node id {0}")]
    DuplicateNodeId(String),

    #[error("node {node}: {field} must not be empty")]
    EmptyField { node: String, field: &'static str },

    #[error("pool min_connections {min} exceeds max_connections {max}")]
    PoolBounds { min: usize, max: usize },

    #[error("pool max_connections must be at least 1")]
    EmptyPool,

    #[error("{0} must not be empty")]
    EmptySchedule(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a node list: non-empty, primary first, exactly one primary, unique ids.
pub fn validate_nodes(nodes: &[NodeConfig]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let Some(first) = nodes.first() else {
        return Err(vec![ValidationError::NoNodes]);
    };
    if first.role != NodeRole::Primary {
        errors.push(ValidationError::PrimaryNotFirst(first.id.clone()));
    }

    let mut seen = HashSet::new();
    for (index, node) in nodes.iter().enumerate() {
        if !seen.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateNodeId(node.id.clone()));
        }
        if index > 0 && node.role == NodeRole::Primary {
            errors.push(ValidationError::ExtraPrimary(node.id.clone()));
        }
        for (field, value) in [
            ("id", &node.id),
            ("host", &node.host),
            ("user", &node.user),
            ("schema", &node.schema),
        ] {
            if value.trim().is_empty() {
                errors.push(ValidationError::EmptyField {
                    node: node.id.clone(),
                    field,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the whole configuration.
pub fn validate_config(config: &VerifierConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = match validate_nodes(&config.nodes) {
        Ok(()) => Vec::new(),
        Err(errors) => errors,
    };

    if config.pool.max_connections == 0 {
        errors.push(ValidationError::EmptyPool);
    } else if config.pool.min_connections > config.pool.max_connections {
        errors.push(ValidationError::PoolBounds {
            min: config.pool.min_connections,
            max: config.pool.max_connections,
        });
    }

    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::Zero("health_check.interval_secs"));
    }
    if config.health_check.timeout_ms == 0 {
        errors.push(ValidationError::Zero("health_check.timeout_ms"));
    }
    if config.consistency.delays_ms.is_empty() {
        errors.push(ValidationError::EmptySchedule("consistency.delays_ms"));
    }
    if config.consistency.lag_poll_interval_ms == 0 {
        errors.push(ValidationError::Zero("consistency.lag_poll_interval_ms"));
    }
    if config.capacity.batch_sizes.is_empty() {
        errors.push(ValidationError::EmptySchedule("capacity.batch_sizes"));
    }
    if config.failover.query_interval_ms == 0 {
        errors.push(ValidationError::Zero("failover.query_interval_ms"));
    }
    if config.sustained.interval_ms == 0 {
        errors.push(ValidationError::Zero("sustained.interval_ms"));
    }
    for scenario in &config.performance.scenarios {
        if scenario.target_qps == 0 {
            errors.push(ValidationError::Zero("performance.scenarios.target_qps"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
