//! Node registry.

use std::sync::Arc;

use crate::config::validation::validate_nodes;
use crate::config::{ConfigError, NodeConfig};

/// Immutable, primary-first list of nodes.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    nodes: Arc<[NodeConfig]>,
}

impl NodeRegistry {
    /// Register the cluster nodes.
    ///
    /// Fails with [`ConfigError::Validation`] when the list is empty, the
    /// primary is not first, or ids collide.
    pub fn register(configs: Vec<NodeConfig>) -> Result<Self, ConfigError> {
        validate_nodes(&configs).map_err(ConfigError::Validation)?;
        tracing::info!(
            primary = %configs[0].id,
            replicas = configs.len() - 1,
            "Node registry initialized"
        );
        Ok(Self {
            nodes: configs.into(),
        })
    }

    /// The primary node (always index 0).
    pub fn primary(&self) -> &NodeConfig {
        &self.nodes[0]
    }

    /// Replicas in registration order.
    pub fn replicas(&self) -> &[NodeConfig] {
        &self.nodes[1..]
    }

    pub fn all(&self) -> &[NodeConfig] {
        &self.nodes
    }

    pub fn get(&self, id: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeRole;

    #[test]
    fn test_register_splits_primary_and_replicas() {
        let registry = NodeRegistry::register(vec![
            NodeConfig::new("p", NodeRole::Primary, "h", 3306),
            NodeConfig::new("r1", NodeRole::Replica, "h", 3307),
            NodeConfig::new("r2", NodeRole::Replica, "h", 3308),
        ])
        .unwrap();

        assert_eq!(registry.primary().id, "p");
        let ids: Vec<_> = registry.replicas().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["r1", "r2"]);
        assert_eq!(registry.get("r2").map(|n| n.port), Some(3308));
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_register_empty_is_config_error() {
        let err = NodeRegistry::register(Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_primary_only_has_no_replicas() {
        let registry =
            NodeRegistry::register(vec![NodeConfig::new("p", NodeRole::Primary, "h", 3306)])
                .unwrap();
        assert!(registry.replicas().is_empty());
        assert_eq!(registry.len(), 1);
    }
}
