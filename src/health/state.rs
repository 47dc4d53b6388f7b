//! Node health state and published snapshots.
//!
//! # States
//! - Healthy: weight taken from the latency tier, eligible for selection
//! - Unhealthy: weight forced to 0, excluded from selection
//!
//! # Design Decisions
//! - The prober is the only writer; it publishes a whole new snapshot
//! - Readers load an `Arc` and never block the writer
//! - Versions increase by one per publication

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::NodeRegistry;

/// Weight for probes answering under 50ms.
pub const FAST_WEIGHT: f64 = 1.2;
/// Weight for probes answering under 100ms.
pub const NORMAL_WEIGHT: f64 = 1.0;
/// Weight for anything slower.
pub const SLOW_WEIGHT: f64 = 0.8;

/// Map a probe round-trip to a weight tier.
pub fn weight_for_latency(latency: Duration) -> f64 {
    if latency < Duration::from_millis(50) {
        FAST_WEIGHT
    } else if latency < Duration::from_millis(100) {
        NORMAL_WEIGHT
    } else {
        SLOW_WEIGHT
    }
}

/// Health of a single node as last observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeState {
    pub node_id: String,
    pub healthy: bool,
    pub weight: f64,
    pub last_probed_at: Option<DateTime<Utc>>,
    pub last_latency: Option<Duration>,
}

impl NodeState {
    /// State before any probe ran.
    pub fn assumed_healthy(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            healthy: true,
            weight: NORMAL_WEIGHT,
            last_probed_at: None,
            last_latency: None,
        }
    }

    pub fn unhealthy(node_id: &str, probed_at: Option<DateTime<Utc>>) -> Self {
        Self {
            node_id: node_id.to_string(),
            healthy: false,
            weight: 0.0,
            last_probed_at: probed_at,
            last_latency: None,
        }
    }

    pub fn probed(node_id: &str, latency: Duration, probed_at: DateTime<Utc>) -> Self {
        Self {
            node_id: node_id.to_string(),
            healthy: true,
            weight: weight_for_latency(latency),
            last_probed_at: Some(probed_at),
            last_latency: Some(latency),
        }
    }
}

/// Immutable view of every node's health, in registration order.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub version: u64,
    pub nodes: Vec<NodeState>,
}

impl HealthSnapshot {
    pub fn get(&self, node_id: &str) -> Option<&NodeState> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    pub fn is_healthy(&self, node_id: &str) -> bool {
        self.get(node_id).is_some_and(|n| n.healthy)
    }

    pub fn weight(&self, node_id: &str) -> f64 {
        self.get(node_id).map(|n| n.weight).unwrap_or(0.0)
    }
}

/// Single-writer, multi-reader holder of the current snapshot.
#[derive(Debug)]
pub struct HealthStore {
    current: ArcSwap<HealthSnapshot>,
}

impl HealthStore {
    /// Start with every node assumed healthy at version 0.
    pub fn new(registry: &NodeRegistry) -> Self {
        let nodes = registry
            .all()
            .iter()
            .map(|n| NodeState::assumed_healthy(&n.id))
            .collect();
        Self::with_states(nodes)
    }

    pub fn with_states(nodes: Vec<NodeState>) -> Self {
        Self {
            current: ArcSwap::from_pointee(HealthSnapshot { version: 0, nodes }),
        }
    }

    /// The latest published snapshot.
    pub fn load(&self) -> Arc<HealthSnapshot> {
        self.current.load_full()
    }

    /// Publish a new snapshot, returning it.
    pub fn publish(&self, nodes: Vec<NodeState>) -> Arc<HealthSnapshot> {
        let next = Arc::new(HealthSnapshot {
            version: self.current.load().version + 1,
            nodes,
        });
        self.current.store(next.clone());
        next
    }

    /// Replace one node's state, keeping the others.
    pub fn update(&self, state: NodeState) -> Arc<HealthSnapshot> {
        let mut nodes = self.current.load().nodes.clone();
        match nodes.iter_mut().find(|n| n.node_id == state.node_id) {
            Some(slot) => *slot = state,
            None => nodes.push(state),
        }
        self.publish(nodes)
    }
}
