//! In-process simulated primary/replica cluster.
//!
//! Every node keeps its own copy of the canary table. Writes on the primary
//! reach each replica after that replica's replication delay. Latency,
//! outages and the server-side connection ceiling can be changed at runtime
//! to drive the harness through failure scenarios.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{NodeConfig, NodeRole, SimulationConfig};
use crate::driver::{CanaryRow, Connector, DriverError, Session};

/// A cluster of simulated nodes implementing [`Connector`].
#[derive(Clone)]
pub struct SimulatedCluster {
    inner: Arc<SimInner>,
}

struct SimInner {
    nodes: DashMap<String, Arc<SimNode>>,
    table_ready: AtomicBool,
}

struct SimNode {
    id: String,
    role: NodeRole,
    latency_us: AtomicU64,
    replication_delay_ms: AtomicU64,
    max_connections: AtomicUsize,
    open_connections: AtomicUsize,
    down: AtomicBool,
    rows: DashMap<String, CanaryRow>,
}

enum Replicated {
    Upsert(CanaryRow),
    Delete(String),
}

impl SimulatedCluster {
    /// Build a cluster for the given nodes, applying per-node overrides.
    pub fn new(nodes: &[NodeConfig], config: &SimulationConfig) -> Self {
        let map = DashMap::new();
        for node in nodes {
            let sim = SimNode {
                id: node.id.clone(),
                role: node.role,
                latency_us: AtomicU64::new(config.latency_ms * 1_000),
                replication_delay_ms: AtomicU64::new(config.replication_delay_ms),
                max_connections: AtomicUsize::new(config.max_connections),
                open_connections: AtomicUsize::new(0),
                down: AtomicBool::new(false),
                rows: DashMap::new(),
            };
            if let Some(o) = config.overrides.iter().find(|o| o.node_id == node.id) {
                if let Some(ms) = o.latency_ms {
                    sim.latency_us.store(ms * 1_000, Ordering::Relaxed);
                }
                if let Some(ms) = o.replication_delay_ms {
                    sim.replication_delay_ms.store(ms, Ordering::Relaxed);
                }
                if let Some(max) = o.max_connections {
                    sim.max_connections.store(max, Ordering::Relaxed);
                }
                sim.down.store(o.down, Ordering::Relaxed);
            }
            map.insert(node.id.clone(), Arc::new(sim));
        }

        Self {
            inner: Arc::new(SimInner {
                nodes: map,
                table_ready: AtomicBool::new(false),
            }),
        }
    }

    fn node(&self, id: &str) -> Option<Arc<SimNode>> {
        self.inner.nodes.get(id).map(|n| n.value().clone())
    }

    /// Set the per-query round-trip latency of a node.
    pub fn set_latency(&self, node_id: &str, latency: Duration) {
        if let Some(node) = self.node(node_id) {
            node.latency_us
                .store(latency.as_micros() as u64, Ordering::Relaxed);
        }
    }

    /// Set how long primary writes take to reach a replica.
    pub fn set_replication_delay(&self, node_id: &str, delay: Duration) {
        if let Some(node) = self.node(node_id) {
            node.replication_delay_ms
                .store(delay.as_millis() as u64, Ordering::Relaxed);
        }
    }

    /// Set the server-side connection ceiling of a node.
    pub fn set_max_connections(&self, node_id: &str, max: usize) {
        if let Some(node) = self.node(node_id) {
            node.max_connections.store(max, Ordering::Relaxed);
        }
    }

    /// Take a node down (new and existing sessions fail) or bring it back.
    pub fn set_down(&self, node_id: &str, down: bool) {
        if let Some(node) = self.node(node_id) {
            node.down.store(down, Ordering::Relaxed);
            tracing::debug!(node = %node_id, down, "Simulated node state changed");
        }
    }

    /// Sessions currently open on a node.
    pub fn open_connections(&self, node_id: &str) -> usize {
        self.node(node_id)
            .map(|n| n.open_connections.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Canary rows currently stored on a node.
    pub fn row_count(&self, node_id: &str) -> usize {
        self.node(node_id).map(|n| n.rows.len()).unwrap_or(0)
    }

    /// Overwrite the payload of a stored row on one node, leaving its
    /// checksum untouched. Returns false when the row is absent.
    pub fn tamper(&self, node_id: &str, row_id: &str, payload: &str) -> bool {
        let Some(node) = self.node(node_id) else {
            return false;
        };
        let Some(mut row) = node.rows.get_mut(row_id) else {
            return false;
        };
        row.payload = payload.to_string();
        true
    }

    fn replicate(&self, change: Replicated) {
        let replicas: Vec<Arc<SimNode>> = self
            .inner
            .nodes
            .iter()
            .filter(|n| n.role == NodeRole::Replica)
            .map(|n| n.value().clone())
            .collect();

        let change = Arc::new(change);
        for replica in replicas {
            let change = change.clone();
            let delay = Duration::from_millis(replica.replication_delay_ms.load(Ordering::Relaxed));
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                match change.as_ref() {
                    Replicated::Upsert(row) => {
                        replica.rows.insert(row.id.clone(), row.clone());
                    }
                    Replicated::Delete(id) => {
                        replica.rows.remove(id);
                    }
                }
            });
        }
    }
}

#[async_trait]
impl Connector for SimulatedCluster {
    async fn connect(&self, config: &NodeConfig) -> Result<Box<dyn Session>, DriverError> {
        let Some(node) = self.node(&config.id) else {
            return Err(DriverError::Refused {
                node: config.id.clone(),
                reason: format!("unknown host {}", config.address()),
            });
        };
        if node.down.load(Ordering::Relaxed) {
            return Err(DriverError::Refused {
                node: node.id.clone(),
                reason: "node is down".into(),
            });
        }

        tokio::time::sleep(node.latency()).await;

        let mut prev = node.open_connections.load(Ordering::Relaxed);
        loop {
            if prev >= node.max_connections.load(Ordering::Relaxed) {
                return Err(DriverError::TooManyConnections(node.id.clone()));
            }
            match node.open_connections.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }

        Ok(Box::new(SimSession {
            node,
            cluster: self.clone(),
        }))
    }
}

impl SimNode {
    fn latency(&self) -> Duration {
        Duration::from_micros(self.latency_us.load(Ordering::Relaxed))
    }

    fn check_up(&self) -> Result<(), DriverError> {
        if self.down.load(Ordering::Relaxed) {
            Err(DriverError::Refused {
                node: self.id.clone(),
                reason: "connection lost".into(),
            })
        } else {
            Ok(())
        }
    }
}

struct SimSession {
    node: Arc<SimNode>,
    cluster: SimulatedCluster,
}

impl SimSession {
    async fn round_trip(&self) -> Result<(), DriverError> {
        self.node.check_up()?;
        tokio::time::sleep(self.node.latency()).await;
        self.node.check_up()
    }

    fn table_ready(&self) -> Result<(), DriverError> {
        if self.cluster.inner.table_ready.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(DriverError::Query("canary table does not exist".into()))
        }
    }
}

impl Drop for SimSession {
    fn drop(&mut self) {
        self.node.open_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl Session for SimSession {
    async fn ping(&mut self) -> Result<(), DriverError> {
        self.round_trip().await
    }

    async fn server_time(&mut self) -> Result<DateTime<Utc>, DriverError> {
        self.round_trip().await?;
        Ok(Utc::now())
    }

    async fn ensure_canary_table(&mut self) -> Result<(), DriverError> {
        self.round_trip().await?;
        self.cluster.inner.table_ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn insert_canary(&mut self, row: &CanaryRow) -> Result<(), DriverError> {
        self.round_trip().await?;
        self.table_ready()?;
        if self.node.rows.contains_key(&row.id) {
            return Err(DriverError::Query(format!("duplicate entry '{}'", row.id)));
        }
        self.node.rows.insert(row.id.clone(), row.clone());
        if self.node.role == NodeRole::Primary {
            self.cluster.replicate(Replicated::Upsert(row.clone()));
        }
        Ok(())
    }

    async fn fetch_canary(&mut self, id: &str) -> Result<Option<CanaryRow>, DriverError> {
        self.round_trip().await?;
        self.table_ready()?;
        Ok(self.node.rows.get(id).map(|r| r.value().clone()))
    }

    async fn delete_canary(&mut self, id: &str) -> Result<u64, DriverError> {
        self.round_trip().await?;
        self.table_ready()?;
        let removed = self.node.rows.remove(id).is_some();
        if removed && self.node.role == NodeRole::Primary {
            self.cluster.replicate(Replicated::Delete(id.to_string()));
        }
        Ok(u64::from(removed))
    }
}
