//! Load balancing and connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Router needs a replica
//!     → healthy replicas + weights from the HealthSnapshot
//!     → weighted.rs (weighted random pick)
//!     → pool.rs (lease a session from that node's pool)
//!     → Lease returned to caller, released on drop
//! ```
//!
//! # Design Decisions
//! - Balancers are stateless apart from their RNG; health lives in snapshots
//! - Only healthy candidates are passed in
//! - One bounded pool per node

pub mod pool;
pub mod weighted;

pub use pool::{ConnectionPool, Lease, PoolError, PoolStats};
pub use weighted::WeightedRandom;

/// A selectable node and its current weight.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub node_id: &'a str,
    pub weight: f64,
}

/// Load balancing strategy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Index of the chosen candidate, or `None` when there are none.
    fn select(&self, candidates: &[Candidate<'_>]) -> Option<usize>;
}
