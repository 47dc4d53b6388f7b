//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → VerifierConfig (validated, immutable)
//!     → node list handed to cluster::NodeRegistry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CapacityConfig, ConsistencyConfig, FailoverConfig, HealthCheckConfig, LoadScenario, LogFormat,
    NodeConfig, NodeRole, ObservabilityConfig, PerformanceConfig, PoolConfig, SimNodeOverride,
    SimulationConfig, SustainedLoadConfig, VerifierConfig,
};
pub use validation::ValidationError;
