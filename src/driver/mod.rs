//! Database driver seam.
//!
//! # Data Flow
//! ```text
//! ConnectionPool / HealthProber / CapacityProbe
//!     → Connector::connect(&NodeConfig)
//!     → Box<dyn Session>
//!     → ping / server_time / canary table operations
//! ```
//!
//! # Design Decisions
//! - No wire protocol lives in this crate; drivers implement two traits
//! - Sessions are owned (`&mut self`), never shared between tasks
//! - `sim.rs` is the bundled in-process cluster used by tests and the binary

pub mod sim;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::config::NodeConfig;

pub use sim::SimulatedCluster;

/// Errors raised by a driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// Node refused or dropped the connection.
    #[error("connection to {node} refused: {reason}")]
    Refused { node: String, reason: String },

    /// Server-side connection ceiling reached.
    #[error("node {0} has too many connections")]
    TooManyConnections(String),

    /// Operation did not finish within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Statement failed on the server.
    #[error("query failed: {0}")]
    Query(String),
}

/// A row of the canary scratch table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanaryRow {
    pub id: String,
    pub payload: String,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Opens sessions against a node.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, node: &NodeConfig) -> Result<Box<dyn Session>, DriverError>;
}

/// A live session on one node.
#[async_trait]
pub trait Session: Send {
    /// Liveness round-trip (`SELECT 1`).
    async fn ping(&mut self) -> Result<(), DriverError>;

    /// Lightweight no-op returning the server clock (`SELECT NOW()`).
    async fn server_time(&mut self) -> Result<DateTime<Utc>, DriverError>;

    /// Create the canary table if it does not exist.
    async fn ensure_canary_table(&mut self) -> Result<(), DriverError>;

    async fn insert_canary(&mut self, row: &CanaryRow) -> Result<(), DriverError>;

    async fn fetch_canary(&mut self, id: &str) -> Result<Option<CanaryRow>, DriverError>;

    /// Returns the number of deleted rows.
    async fn delete_canary(&mut self, id: &str) -> Result<u64, DriverError>;
}
