//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use replica_verifier::cluster::NodeRegistry;
use replica_verifier::config::{NodeConfig, NodeRole, VerifierConfig};
use replica_verifier::health::{HealthProber, HealthStore};
use replica_verifier::load_balancer::WeightedRandom;
use replica_verifier::{Router, SimulatedCluster};

/// Router, prober and backend wired together without background tasks.
pub struct Harness {
    pub router: Arc<Router>,
    pub prober: HealthProber,
    pub sim: SimulatedCluster,
    pub config: VerifierConfig,
}

/// A primary plus `replicas` replicas on localhost.
pub fn cluster_config(replicas: usize) -> VerifierConfig {
    let mut config = VerifierConfig::local_pair();
    config.nodes.truncate(1);
    for i in 1..=replicas {
        config.nodes.push(NodeConfig::new(
            &format!("replica-{i}"),
            NodeRole::Replica,
            "localhost",
            3306 + i as u16,
        ));
    }
    config
}

pub fn harness(config: VerifierConfig) -> Harness {
    let sim = SimulatedCluster::new(&config.nodes, &config.simulation);
    let registry = NodeRegistry::register(config.nodes.clone()).expect("valid test topology");
    let store = Arc::new(HealthStore::new(&registry));
    let router = Router::new(
        registry.clone(),
        Arc::new(sim.clone()),
        store.clone(),
        &config.pool,
    )
    .with_balancer(Box::new(WeightedRandom::with_seed(7)));
    let prober = HealthProber::new(
        registry,
        Arc::new(sim.clone()),
        store,
        config.health_check.clone(),
    );

    Harness {
        router: Arc::new(router),
        prober,
        sim,
        config,
    }
}
