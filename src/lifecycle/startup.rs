//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration and register the nodes
//! - Build one pool per node and the router over them
//! - Warm the pools up concurrently
//! - Start the background health prober

use futures_util::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::cluster::NodeRegistry;
use crate::config::validation::validate_config;
use crate::config::{ConfigError, VerifierConfig};
use crate::driver::Connector;
use crate::health::{HealthProber, HealthStore, NodeState};
use crate::lifecycle::Shutdown;
use crate::load_balancer::PoolError;
use crate::routing::Router;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("primary {node_id} is unreachable: {source}")]
    PrimaryUnreachable {
        node_id: String,
        #[source]
        source: PoolError,
    },
}

/// A started cluster: the router plus the background prober task.
pub struct Cluster {
    config: VerifierConfig,
    registry: NodeRegistry,
    router: Arc<Router>,
    shutdown: Shutdown,
    prober_task: Option<JoinHandle<()>>,
}

impl Cluster {
    pub async fn start(
        config: VerifierConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, StartupError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let registry = NodeRegistry::register(config.nodes.clone())?;

        let health = Arc::new(HealthStore::new(&registry));
        let router = Arc::new(Router::new(
            registry.clone(),
            connector.clone(),
            health.clone(),
            &config.pool,
        ));

        let warm_ups = join_all(registry.all().iter().map(|node| {
            let router = router.clone();
            async move {
                match router.pool(&node.id) {
                    Some(pool) => pool.warm_up().await,
                    None => Ok(0),
                }
            }
        }))
        .await;

        for (node, result) in registry.all().iter().zip(warm_ups) {
            if let Err(source) = result {
                if node.is_primary() {
                    router.close();
                    return Err(StartupError::PrimaryUnreachable {
                        node_id: node.id.clone(),
                        source,
                    });
                }
                tracing::warn!(node = %node.id, error = %source, "Pool warm-up failed, node starts unhealthy");
                health.update(NodeState::unhealthy(&node.id, None));
            }
        }

        let shutdown = Shutdown::new();
        let prober_task = if config.health_check.enabled {
            let prober = Arc::new(HealthProber::new(
                registry.clone(),
                connector,
                health,
                config.health_check.clone(),
            ));
            Some(tokio::spawn(prober.run(shutdown.subscribe())))
        } else {
            tracing::info!("Health checks disabled");
            None
        };

        tracing::info!(
            nodes = registry.len(),
            min_connections = config.pool.min_connections,
            max_connections = config.pool.max_connections,
            "Cluster started"
        );

        Ok(Self {
            config,
            registry,
            router,
            shutdown,
            prober_task,
        })
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Stop the prober and close every pool.
    pub async fn shutdown(mut self) {
        tracing::info!(
            listeners = self.shutdown.receiver_count(),
            "Stopping background tasks"
        );
        self.shutdown.trigger();
        if let Some(task) = self.prober_task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Health prober task failed");
            }
        }
        self.router.close();
        tracing::info!("Cluster shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validation::ValidationError;
    use crate::driver::SimulatedCluster;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_start_warms_pools() {
        let config = VerifierConfig::local_pair();
        let sim = SimulatedCluster::new(&config.nodes, &config.simulation);
        let cluster = Cluster::start(config, Arc::new(sim.clone())).await.unwrap();

        assert_eq!(sim.open_connections("primary"), 5);
        assert_eq!(sim.open_connections("replica-1"), 5);
        assert_eq!(cluster.router().connection_stats()[0].pool.idle_connections, 5);

        cluster.shutdown().await;
        assert_eq!(sim.open_connections("primary"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_replica_starts_unhealthy() {
        let mut config = VerifierConfig::local_pair();
        config.health_check.enabled = false;
        let sim = SimulatedCluster::new(&config.nodes, &config.simulation);
        sim.set_down("replica-1", true);

        let cluster = Cluster::start(config, Arc::new(sim)).await.unwrap();
        assert!(!cluster.router().health().load().is_healthy("replica-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_primary_is_fatal() {
        let config = VerifierConfig::local_pair();
        let sim = SimulatedCluster::new(&config.nodes, &config.simulation);
        sim.set_down("primary", true);

        assert!(matches!(
            Cluster::start(config, Arc::new(sim)).await,
            Err(StartupError::PrimaryUnreachable { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_is_rejected() {
        let mut config = VerifierConfig::local_pair();
        config.pool.min_connections = 50;
        let sim = SimulatedCluster::new(&config.nodes, &config.simulation);

        assert!(matches!(
            Cluster::start(config, Arc::new(sim)).await,
            Err(StartupError::Config(ConfigError::Validation(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_probe_interval_is_rejected() {
        let mut config = VerifierConfig::local_pair();
        config.health_check.interval_secs = 0;
        let sim = SimulatedCluster::new(&config.nodes, &config.simulation);

        match Cluster::start(config, Arc::new(sim)).await {
            Err(StartupError::Config(ConfigError::Validation(errors))) => {
                assert!(errors.contains(&ValidationError::Zero("health_check.interval_secs")));
            }
            other => panic!("expected validation error, got {:?}", other.err()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_prober_marks_failed_replica_after_start() {
        let mut config = VerifierConfig::local_pair();
        config.health_check.interval_secs = 1;
        let sim = SimulatedCluster::new(&config.nodes, &config.simulation);
        let cluster = Cluster::start(config, Arc::new(sim.clone())).await.unwrap();

        sim.set_down("replica-1", true);
        tokio::time::sleep(Duration::from_secs(5)).await;

        let snapshot = cluster.router().health().load();
        assert!(snapshot.version >= 2);
        assert!(!snapshot.is_healthy("replica-1"));
        cluster.shutdown().await;
    }
}
