//! Active health probing.
//!
//! # Responsibilities
//! - Probe every node concurrently (liveness + timed no-op)
//! - Derive a weight tier per node from the measured latency
//! - Publish a new snapshot for the router

use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{self, Instant};

use crate::cluster::NodeRegistry;
use crate::config::{HealthCheckConfig, NodeConfig};
use crate::driver::{Connector, DriverError};
use crate::health::state::{HealthSnapshot, HealthStore, NodeState};
use crate::observability::metrics;

/// Why a node failed its probe.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeFailure {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Result of probing one node. Unhealthy is ordinary data, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy { latency: Duration },
    Unhealthy(ProbeFailure),
}

pub struct HealthProber {
    registry: NodeRegistry,
    connector: Arc<dyn Connector>,
    store: Arc<HealthStore>,
    config: HealthCheckConfig,
    /// Completion time of the last probe round; also serializes rounds.
    last_probe: Mutex<Option<Instant>>,
}

impl HealthProber {
    pub fn new(
        registry: NodeRegistry,
        connector: Arc<dyn Connector>,
        store: Arc<HealthStore>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            registry,
            connector,
            store,
            config,
            last_probe: Mutex::new(None),
        }
    }

    /// Re-measure every node unless the last round is younger than the
    /// configured interval and `force` is false. Returns the current snapshot.
    pub async fn probe(&self, force: bool) -> Arc<HealthSnapshot> {
        let mut last = self.last_probe.lock().await;
        if !force {
            if let Some(at) = *last {
                if at.elapsed() < self.config.interval() {
                    return self.store.load();
                }
            }
        }

        tracing::debug!(nodes = self.registry.len(), "Running health probe");

        let outcomes = join_all(self.registry.all().iter().map(|node| self.probe_node(node))).await;
        let probed_at = Utc::now();

        let states = self
            .registry
            .all()
            .iter()
            .zip(outcomes)
            .map(|(node, outcome)| match outcome {
                ProbeOutcome::Healthy { latency } => {
                    let state = NodeState::probed(&node.id, latency, probed_at);
                    tracing::info!(
                        node = %node.id,
                        latency_ms = latency.as_secs_f64() * 1000.0,
                        weight = state.weight,
                        "Health check OK"
                    );
                    metrics::record_probe_latency(&node.id, latency);
                    state
                }
                ProbeOutcome::Unhealthy(failure) => {
                    tracing::warn!(node = %node.id, error = %failure, "Health check failed");
                    NodeState::unhealthy(&node.id, Some(probed_at))
                }
            })
            .collect::<Vec<_>>();

        for state in &states {
            metrics::record_node_health(&state.node_id, state.healthy, state.weight);
        }

        *last = Some(Instant::now());
        self.store.publish(states)
    }

    /// Probe a single node: connect, liveness round-trip, timed no-op.
    pub async fn probe_node(&self, node: &NodeConfig) -> ProbeOutcome {
        let deadline = self.config.timeout();
        match time::timeout(deadline, self.measure(node)).await {
            Ok(Ok(latency)) => ProbeOutcome::Healthy { latency },
            Ok(Err(e)) => ProbeOutcome::Unhealthy(e.into()),
            Err(_) => ProbeOutcome::Unhealthy(ProbeFailure::Timeout(deadline)),
        }
    }

    async fn measure(&self, node: &NodeConfig) -> Result<Duration, DriverError> {
        let mut session = self.connector.connect(node).await?;
        session.ping().await?;

        let start = Instant::now();
        session.server_time().await?;
        Ok(start.elapsed())
    }

    /// Probe on a fixed ticker until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.config.interval_secs,
            "Health prober starting"
        );

        let mut ticker = time::interval(self.config.interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe(true).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifierConfig;
    use crate::driver::SimulatedCluster;

    fn setup() -> (HealthProber, SimulatedCluster) {
        let mut config = VerifierConfig::local_pair();
        config.nodes.push(NodeConfig::new(
            "replica-2",
            crate::config::NodeRole::Replica,
            "localhost",
            3308,
        ));
        let sim = SimulatedCluster::new(&config.nodes, &config.simulation);
        let registry = NodeRegistry::register(config.nodes).unwrap();
        let store = Arc::new(HealthStore::new(&registry));
        let prober = HealthProber::new(registry, Arc::new(sim.clone()), store, config.health_check);
        (prober, sim)
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_sets_weight_tier() {
        let (prober, sim) = setup();
        sim.set_latency("primary", Duration::from_millis(30));
        sim.set_latency("replica-1", Duration::from_millis(80));
        sim.set_latency("replica-2", Duration::from_millis(150));

        let snap = prober.probe(true).await;
        assert_eq!(snap.version, 1);
        assert_eq!(snap.weight("primary"), 1.2);
        assert_eq!(snap.weight("replica-1"), 1.0);
        assert_eq!(snap.weight("replica-2"), 0.8);
        let latency = snap.get("replica-1").and_then(|n| n.last_latency).unwrap();
        assert!(latency >= Duration::from_millis(80));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_isolated_per_node() {
        let (prober, sim) = setup();
        sim.set_down("replica-1", true);

        let snap = prober.probe(true).await;
        assert!(!snap.is_healthy("replica-1"));
        assert_eq!(snap.weight("replica-1"), 0.0);
        assert!(snap.is_healthy("primary"));
        assert!(snap.is_healthy("replica-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_node_times_out() {
        let (prober, sim) = setup();
        sim.set_latency("replica-2", Duration::from_secs(10));

        let node = prober.registry.get("replica-2").unwrap().clone();
        assert_eq!(
            prober.probe_node(&node).await,
            ProbeOutcome::Unhealthy(ProbeFailure::Timeout(Duration::from_secs(5)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_gates_unforced_probes() {
        let (prober, sim) = setup();
        prober.probe(true).await;

        sim.set_down("replica-1", true);
        let snap = prober.probe(false).await;
        assert_eq!(snap.version, 1);
        assert!(snap.is_healthy("replica-1"));

        time::advance(Duration::from_secs(31)).await;
        let snap = prober.probe(false).await;
        assert_eq!(snap.version, 2);
        assert!(!snap.is_healthy("replica-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_node_returns_to_rotation() {
        let (prober, sim) = setup();
        sim.set_down("replica-1", true);
        assert!(!prober.probe(true).await.is_healthy("replica-1"));

        sim.set_down("replica-1", false);
        assert!(prober.probe(true).await.is_healthy("replica-1"));
    }
}
