//! Health-aware read/write router.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::cluster::NodeRegistry;
use crate::config::{NodeConfig, PoolConfig};
use crate::driver::{Connector, DriverError, Session};
use crate::health::HealthStore;
use crate::load_balancer::{
    Candidate, ConnectionPool, Lease, LoadBalancer, PoolError, PoolStats, WeightedRandom,
};
use crate::observability::metrics;

/// Errors returned when the router cannot produce a connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("primary {node_id} unavailable: {source}")]
    PrimaryUnavailable {
        node_id: String,
        #[source]
        source: PoolError,
    },

    /// Primary traffic is fenced off by an outage simulation.
    #[error("primary {0} traffic is suspended")]
    PrimarySuspended(String),

    #[error("node {node_id} unavailable: {source}")]
    NodeUnavailable {
        node_id: String,
        #[source]
        source: PoolError,
    },

    #[error("node {node_id} unreachable: {source}")]
    Unreachable {
        node_id: String,
        #[source]
        source: DriverError,
    },

    #[error("unknown node {0}")]
    UnknownNode(String),
}

/// Pool counters joined with the node's current health.
#[derive(Debug, Clone, Serialize)]
pub struct NodeConnectionStats {
    #[serde(flatten)]
    pub pool: PoolStats,
    pub healthy: bool,
    pub weight: f64,
}

/// Mediates all node access.
pub struct Router {
    registry: NodeRegistry,
    pools: HashMap<String, Arc<ConnectionPool>>,
    health: Arc<HealthStore>,
    balancer: Box<dyn LoadBalancer>,
    connector: Arc<dyn Connector>,
    degraded_reads: AtomicU64,
    primary_suspended: AtomicBool,
}

impl Router {
    /// Create a router with one (cold) pool per node.
    pub fn new(
        registry: NodeRegistry,
        connector: Arc<dyn Connector>,
        health: Arc<HealthStore>,
        pool_config: &PoolConfig,
    ) -> Self {
        let pools = registry
            .all()
            .iter()
            .map(|node| {
                let pool = ConnectionPool::new(node.clone(), connector.clone(), pool_config.clone());
                (node.id.clone(), pool)
            })
            .collect();

        Self {
            registry,
            pools,
            health,
            balancer: Box::new(WeightedRandom::new()),
            connector,
            degraded_reads: AtomicU64::new(0),
            primary_suspended: AtomicBool::new(false),
        }
    }

    /// Replace the replica selection strategy.
    pub fn with_balancer(mut self, balancer: Box<dyn LoadBalancer>) -> Self {
        self.balancer = balancer;
        self
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthStore> {
        &self.health
    }

    pub fn pool(&self, node_id: &str) -> Option<&Arc<ConnectionPool>> {
        self.pools.get(node_id)
    }

    /// Lease a connection on the primary.
    pub async fn acquire_write(&self) -> Result<Lease, RouterError> {
        self.lease_from(self.registry.primary()).await
    }

    /// Lease a read connection.
    ///
    /// A healthy `preferred` replica wins; otherwise a healthy replica is
    /// picked by weight. With no healthy replica the primary serves the read
    /// and the degraded-read counter is bumped.
    pub async fn acquire_read(&self, preferred: Option<&str>) -> Result<Lease, RouterError> {
        match self.select_replica(preferred) {
            Some(node) => self.lease_from(node).await,
            None => {
                let total = self.degraded_reads.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::record_degraded_read();
                tracing::warn!(
                    primary = %self.registry.primary().id,
                    degraded_reads = total,
                    "No healthy replica, serving read from primary"
                );
                self.acquire_write().await
            }
        }
    }

    /// Read lease when replicas exist, falling back to the primary when the
    /// read path fails.
    pub async fn acquire_any(&self, prefer_read: bool) -> Result<Lease, RouterError> {
        if prefer_read && !self.registry.replicas().is_empty() {
            match self.acquire_read(None).await {
                Ok(lease) => return Ok(lease),
                Err(e) => tracing::warn!(error = %e, "Read connection failed, falling back to primary"),
            }
        }
        self.acquire_write().await
    }

    /// Lease from a specific node regardless of its health.
    pub async fn acquire_node(&self, node_id: &str) -> Result<Lease, RouterError> {
        let node = self
            .registry
            .get(node_id)
            .ok_or_else(|| RouterError::UnknownNode(node_id.to_string()))?;
        self.lease_from(node).await
    }

    /// Open a session outside the pools, counting against the node's own
    /// connection limit only.
    pub async fn connect_unpooled(&self, node_id: &str) -> Result<Box<dyn Session>, RouterError> {
        let node = self
            .registry
            .get(node_id)
            .ok_or_else(|| RouterError::UnknownNode(node_id.to_string()))?;
        self.check_suspended(node)?;
        self.connector
            .connect(node)
            .await
            .map_err(|source| RouterError::Unreachable {
                node_id: node.id.clone(),
                source,
            })
    }

    /// Return a lease to its pool.
    pub fn release(&self, lease: Lease) {
        lease.release();
    }

    /// Pick a healthy replica without leasing.
    pub fn select_replica(&self, preferred: Option<&str>) -> Option<&NodeConfig> {
        let snapshot = self.health.load();
        let healthy: Vec<&NodeConfig> = self
            .registry
            .replicas()
            .iter()
            .filter(|n| snapshot.is_healthy(&n.id))
            .collect();

        if let Some(id) = preferred {
            if let Some(node) = healthy.iter().find(|n| n.id == id) {
                return Some(*node);
            }
        }

        let candidates: Vec<Candidate<'_>> = healthy
            .iter()
            .map(|n| Candidate {
                node_id: &n.id,
                weight: snapshot.weight(&n.id),
            })
            .collect();
        self.balancer.select(&candidates).map(|i| healthy[i])
    }

    async fn lease_from(&self, node: &NodeConfig) -> Result<Lease, RouterError> {
        self.check_suspended(node)?;
        let pool = self
            .pools
            .get(&node.id)
            .ok_or_else(|| RouterError::UnknownNode(node.id.clone()))?;

        pool.acquire().await.map_err(|source| {
            if node.is_primary() {
                RouterError::PrimaryUnavailable {
                    node_id: node.id.clone(),
                    source,
                }
            } else {
                RouterError::NodeUnavailable {
                    node_id: node.id.clone(),
                    source,
                }
            }
        })
    }

    fn check_suspended(&self, node: &NodeConfig) -> Result<(), RouterError> {
        if node.is_primary() && self.primary_suspended.load(Ordering::Acquire) {
            Err(RouterError::PrimarySuspended(node.id.clone()))
        } else {
            Ok(())
        }
    }

    /// Fence off all primary traffic.
    pub fn suspend_primary(&self) {
        self.primary_suspended.store(true, Ordering::Release);
        tracing::warn!(primary = %self.registry.primary().id, "Primary traffic suspended");
    }

    pub fn resume_primary(&self) {
        self.primary_suspended.store(false, Ordering::Release);
        tracing::info!(primary = %self.registry.primary().id, "Primary traffic resumed");
    }

    pub fn is_primary_suspended(&self) -> bool {
        self.primary_suspended.load(Ordering::Acquire)
    }

    /// Reads served by the primary because no replica was healthy.
    pub fn degraded_reads(&self) -> u64 {
        self.degraded_reads.load(Ordering::Relaxed)
    }

    /// Pool and health figures per node, in registration order.
    pub fn connection_stats(&self) -> Vec<NodeConnectionStats> {
        let snapshot = self.health.load();
        self.registry
            .all()
            .iter()
            .filter_map(|node| {
                let pool = self.pools.get(&node.id)?;
                Some(NodeConnectionStats {
                    pool: pool.stats(),
                    healthy: snapshot.is_healthy(&node.id),
                    weight: snapshot.weight(&node.id),
                })
            })
            .collect()
    }

    /// Close every pool.
    pub fn close(&self) {
        for node in self.registry.all() {
            if let Some(pool) = self.pools.get(&node.id) {
                pool.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NodeRole, VerifierConfig};
    use crate::driver::SimulatedCluster;
    use crate::health::NodeState;

    fn router() -> (Router, SimulatedCluster) {
        let mut config = VerifierConfig::local_pair();
        config.nodes.push(NodeConfig::new("replica-2", NodeRole::Replica, "localhost", 3308));
        let sim = SimulatedCluster::new(&config.nodes, &config.simulation);
        let registry = NodeRegistry::register(config.nodes).unwrap();
        let health = Arc::new(HealthStore::new(&registry));
        let router = Router::new(registry, Arc::new(sim.clone()), health, &config.pool)
            .with_balancer(Box::new(WeightedRandom::with_seed(42)));
        (router, sim)
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_goes_to_primary() {
        let (router, _sim) = router();
        let lease = router.acquire_write().await.unwrap();
        assert_eq!(lease.role(), NodeRole::Primary);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preferred_healthy_replica_wins() {
        let (router, _sim) = router();
        for _ in 0..20 {
            let lease = router.acquire_read(Some("replica-2")).await.unwrap();
            assert_eq!(lease.node_id(), "replica-2");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_preferred_falls_back_to_weighted() {
        let (router, _sim) = router();
        router.health().update(NodeState::unhealthy("replica-2", None));
        for _ in 0..20 {
            let lease = router.acquire_read(Some("replica-2")).await.unwrap();
            assert_eq!(lease.node_id(), "replica-1");
        }
        assert_eq!(router.degraded_reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_healthy_replica_reads_from_primary() {
        let (router, _sim) = router();
        router.health().update(NodeState::unhealthy("replica-1", None));
        router.health().update(NodeState::unhealthy("replica-2", None));

        let lease = router.acquire_read(None).await.unwrap();
        assert_eq!(lease.role(), NodeRole::Primary);
        assert_eq!(router.degraded_reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspended_primary_rejects_writes() {
        let (router, _sim) = router();
        router.suspend_primary();
        assert_eq!(
            router.acquire_write().await.unwrap_err(),
            RouterError::PrimarySuspended("primary".into())
        );
        // reads on replicas are unaffected
        assert!(router.acquire_read(None).await.is_ok());

        router.resume_primary();
        assert!(router.acquire_write().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_down_is_primary_unavailable() {
        let (router, sim) = router();
        sim.set_down("primary", true);
        assert!(matches!(
            router.acquire_write().await.unwrap_err(),
            RouterError::PrimaryUnavailable { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_any_falls_back_to_primary() {
        let (router, sim) = router();
        router.health().update(NodeState::unhealthy("replica-2", None));
        sim.set_down("replica-1", true);

        let lease = router.acquire_any(true).await.unwrap();
        assert_eq!(lease.role(), NodeRole::Primary);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_stats_track_leases() {
        let (router, _sim) = router();
        let lease = router.acquire_node("replica-1").await.unwrap();

        let stats = router.connection_stats();
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[1].pool.node_id, "replica-1");
        assert_eq!(stats[1].pool.leased_connections, 1);
        assert!(stats[1].healthy);

        router.release(lease);
        assert_eq!(router.connection_stats()[1].pool.idle_connections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_node() {
        let (router, _sim) = router();
        assert_eq!(
            router.acquire_node("ghost").await.unwrap_err(),
            RouterError::UnknownNode("ghost".into())
        );
    }
}
