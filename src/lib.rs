//! Replica routing and consistency verification engine.
//!
//! Validates a primary/replica cluster: which node answers a request, how
//! fresh replica data is, and how the cluster behaves under connection
//! pressure or a primary outage.

// Topology and configuration
pub mod cluster;
pub mod config;
pub mod driver;

// Traffic management
pub mod health;
pub mod load_balancer;
pub mod routing;

// Verification suites
pub mod performance;
pub mod resilience;
pub mod runner;
pub mod verification;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::VerifierConfig;
pub use driver::{Connector, Session, SimulatedCluster};
pub use lifecycle::{Cluster, Shutdown};
pub use routing::Router;
pub use runner::{RunReport, SuiteSelection, TestRunner};
