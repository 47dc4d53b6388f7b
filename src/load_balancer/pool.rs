//! Per-node connection pool.
//!
//! # Responsibilities
//! - Hold idle sessions for reuse
//! - Cap sessions per node with a semaphore (one permit per live lease)
//! - Hand out [`Lease`] guards that return the session on drop

use serde::Serialize;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::{NodeConfig, NodeRole, PoolConfig};
use crate::driver::{Connector, DriverError, Session};
use crate::observability::metrics;

/// Errors returned by pool acquisition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// No session became free within the configured acquire timeout.
    #[error("pool for {node_id} exhausted after waiting {waited:?}")]
    Exhausted { node_id: String, waited: Duration },

    #[error("pool for {0} is closed")]
    Closed(String),

    #[error("failed to open session on {node_id}: {source}")]
    Connect {
        node_id: String,
        #[source]
        source: DriverError,
    },
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolStats {
    pub node_id: String,
    pub role: NodeRole,
    pub max_connections: usize,
    pub open_connections: usize,
    pub idle_connections: usize,
    pub leased_connections: usize,
}

/// Bounded pool of sessions to one node.
pub struct ConnectionPool {
    node: NodeConfig,
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    idle: Mutex<VecDeque<Box<dyn Session>>>,
    permits: Arc<Semaphore>,
    open: AtomicUsize,
}

impl ConnectionPool {
    /// Create an empty pool. Call [`warm_up`](Self::warm_up) to open the
    /// minimum number of sessions.
    pub fn new(node: NodeConfig, connector: Arc<dyn Connector>, config: PoolConfig) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(config.max_connections));
        Arc::new(Self {
            node,
            connector,
            config,
            idle: Mutex::new(VecDeque::new()),
            permits,
            open: AtomicUsize::new(0),
        })
    }

    pub fn node(&self) -> &NodeConfig {
        &self.node
    }

    /// Eagerly open sessions until `min_connections` exist.
    pub async fn warm_up(&self) -> Result<usize, PoolError> {
        let mut opened = 0;
        while self.open.load(Ordering::SeqCst) < self.config.min_connections {
            let session = self.open_session().await?;
            self.idle_queue().push_back(session);
            opened += 1;
        }
        tracing::info!(
            node = %self.node.id,
            address = %self.node.address(),
            opened,
            "Connection pool warmed up"
        );
        Ok(opened)
    }

    /// Lease a session, waiting for one to free up when the pool is at its cap.
    pub async fn acquire(self: &Arc<Self>) -> Result<Lease, PoolError> {
        let start = Instant::now();
        let permit = match self.config.acquire_timeout() {
            None => self.permits.clone().acquire_owned().await,
            Some(limit) => {
                match tokio::time::timeout(limit, self.permits.clone().acquire_owned()).await {
                    Ok(permit) => permit,
                    Err(_) => {
                        metrics::record_pool_exhausted(&self.node.id);
                        tracing::warn!(node = %self.node.id, waited = ?start.elapsed(), "Pool exhausted");
                        return Err(PoolError::Exhausted {
                            node_id: self.node.id.clone(),
                            waited: start.elapsed(),
                        });
                    }
                }
            }
        }
        .map_err(|_| PoolError::Closed(self.node.id.clone()))?;

        let reused = self.idle_queue().pop_front();
        let session = match reused {
            Some(session) => session,
            None => self.open_session().await?,
        };

        metrics::record_lease(&self.node.id, role_label(self.node.role));
        Ok(Lease {
            session: Some(session),
            pool: self.clone(),
            _permit: permit,
        })
    }

    async fn open_session(&self) -> Result<Box<dyn Session>, PoolError> {
        let session = self
            .connector
            .connect(&self.node)
            .await
            .map_err(|source| PoolError::Connect {
                node_id: self.node.id.clone(),
                source,
            })?;
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(session)
    }

    fn idle_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Box<dyn Session>>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn give_back(&self, session: Box<dyn Session>) {
        if self.permits.is_closed() {
            self.discard(session);
        } else {
            self.idle_queue().push_back(session);
        }
    }

    fn discard(&self, session: Box<dyn Session>) {
        drop(session);
        self.open.fetch_sub(1, Ordering::SeqCst);
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        let idle = self.idle_queue().len();
        let open = self.open.load(Ordering::SeqCst);
        PoolStats {
            node_id: self.node.id.clone(),
            role: self.node.role,
            max_connections: self.config.max_connections,
            open_connections: open,
            idle_connections: idle,
            leased_connections: open.saturating_sub(idle),
        }
    }

    /// Stop handing out leases and drop idle sessions. Outstanding leases
    /// close their session when released.
    pub fn close(&self) {
        self.permits.close();
        let drained: Vec<_> = self.idle_queue().drain(..).collect();
        for session in drained {
            self.discard(session);
        }
        tracing::info!(node = %self.node.id, "Connection pool closed");
    }
}

fn role_label(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Primary => "primary",
        NodeRole::Replica => "replica",
    }
}

/// A session leased from a pool.
///
/// The session goes back to its pool when the lease is dropped or
/// [`release`](Self::release)d, on every exit path.
pub struct Lease {
    session: Option<Box<dyn Session>>,
    pool: Arc<ConnectionPool>,
    _permit: OwnedSemaphorePermit,
}

impl Lease {
    pub fn node_id(&self) -> &str {
        &self.pool.node.id
    }

    pub fn role(&self) -> NodeRole {
        self.pool.node.role
    }

    /// Return the session to the pool.
    pub fn release(self) {}

    /// Close the session instead of returning it, e.g. after an I/O error
    /// left it in an unknown state.
    pub fn discard(mut self) {
        if let Some(session) = self.session.take() {
            self.pool.discard(session);
        }
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("node_id", &self.node_id())
            .field("role", &self.role())
            .finish()
    }
}

impl Deref for Lease {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        self.session.as_deref().expect("session present until the lease drops")
    }
}

impl DerefMut for Lease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
            .as_deref_mut()
            .expect("session present until the lease drops")
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.give_back(session);
        }
    }
}
