//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the verifier.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the replica verifier.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct VerifierConfig {
    /// Cluster nodes, primary first.
    pub nodes: Vec<NodeConfig>,

    /// Per-node connection pool sizing.
    pub pool: PoolConfig,

    /// Health probe settings.
    pub health_check: HealthCheckConfig,

    /// Canary consistency and lag settings.
    pub consistency: ConsistencyConfig,

    /// Connection capacity probe settings.
    pub capacity: CapacityConfig,

    /// Primary outage simulation settings.
    pub failover: FailoverConfig,

    /// Sustained-load stability run settings.
    pub sustained: SustainedLoadConfig,

    /// Rate-scheduled load scenarios.
    pub performance: PerformanceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Behaviour of the in-process simulated cluster.
    pub simulation: SimulationConfig,
}

impl VerifierConfig {
    /// A two-node default cluster (one primary, one replica) on localhost.
    pub fn local_pair() -> Self {
        Self {
            nodes: vec![
                NodeConfig::new("primary", NodeRole::Primary, "localhost", 3306),
                NodeConfig::new("replica-1", NodeRole::Replica, "localhost", 3307),
            ],
            ..Self::default()
        }
    }
}

/// Role of a node in the replication topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Primary,
    Replica,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Primary => f.write_str("primary"),
            NodeRole::Replica => f.write_str("replica"),
        }
    }
}

/// A single database node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeConfig {
    /// Unique node identifier.
    pub id: String,

    /// Primary or replica.
    pub role: NodeRole,

    /// Host name or address.
    pub host: String,

    /// Server port (default: 3306).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user.
    #[serde(default = "default_user")]
    pub user: String,

    /// Login password.
    #[serde(default)]
    pub password: String,

    /// Schema (database) name.
    #[serde(default = "default_schema")]
    pub schema: String,
}

impl NodeConfig {
    /// Create a node with default credentials and schema.
    pub fn new(id: &str, role: NodeRole, host: &str, port: u16) -> Self {
        Self {
            id: id.to_string(),
            role,
            host: host.to_string(),
            port,
            user: default_user(),
            password: "testpass".to_string(),
            schema: default_schema(),
        }
    }

    /// `host:port` for logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_primary(&self) -> bool {
        self.role == NodeRole::Primary
    }
}

fn default_port() -> u16 {
    3306
}

fn default_user() -> String {
    "root".to_string()
}

fn default_schema() -> String {
    "testdb".to_string()
}

/// Connection pool sizing, applied to every node.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections opened eagerly at startup.
    pub min_connections: usize,

    /// Hard cap on connections per node.
    pub max_connections: usize,

    /// Optional bound on how long an acquisition may wait.
    /// `None` blocks until a connection frees up.
    pub acquire_timeout_ms: Option<u64>,
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 5,
            max_connections: 20,
            acquire_timeout_ms: None,
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Run the background probe loop.
    pub enabled: bool,

    /// Minimum spacing between non-forced probes, in seconds.
    pub interval_secs: u64,

    /// Deadline for each node's probe round-trips, in milliseconds.
    pub timeout_ms: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_ms: 5_000,
        }
    }
}

/// Canary consistency and replication-lag configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Number of read-after-write cases.
    pub case_count: usize,

    /// Delay schedule between canary write and replica reads, in milliseconds.
    pub delays_ms: Vec<u64>,

    /// Number of lag samples.
    pub lag_sample_count: usize,

    /// Replica polling interval while measuring lag.
    pub lag_poll_interval_ms: u64,

    /// Give up on a replica after this long.
    pub lag_ceiling_ms: u64,

    /// Pause between lag samples.
    pub lag_sample_gap_ms: u64,
}

impl ConsistencyConfig {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays_ms.iter().copied().map(Duration::from_millis).collect()
    }
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            case_count: 20,
            delays_ms: vec![100, 500, 1_000, 2_000],
            lag_sample_count: 10,
            lag_poll_interval_ms: 100,
            lag_ceiling_ms: 5_000,
            lag_sample_gap_ms: 500,
        }
    }
}

/// Connection capacity probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CapacityConfig {
    /// Escalating batch sizes.
    pub batch_sizes: Vec<usize>,

    /// Pause after each batch is released.
    pub settle_ms: u64,

    /// Deadline for a single connection attempt.
    pub attempt_timeout_ms: u64,

    /// Stability is `GOOD` while total errors stay below this.
    pub error_threshold: usize,

    /// How many error details to keep in the report.
    pub error_detail_limit: usize,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            batch_sizes: vec![10, 50, 100, 200, 500],
            settle_ms: 2_000,
            attempt_timeout_ms: 5_000,
            error_threshold: 10,
            error_detail_limit: 5,
        }
    }
}

/// Failover simulation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Length of each measurement window.
    pub window_secs: u64,

    /// Length of the simulated primary outage.
    pub outage_secs: u64,

    /// Spacing between measurement queries.
    pub query_interval_ms: u64,

    /// Recovery-time target reported alongside the result.
    pub target_recovery_secs: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            window_secs: 30,
            outage_secs: 5,
            query_interval_ms: 100,
            target_recovery_secs: 30,
        }
    }
}

/// Sustained-load stability run configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SustainedLoadConfig {
    pub duration_secs: u64,
    pub interval_ms: u64,
    /// Back-off after a failed iteration.
    pub error_backoff_ms: u64,
}

impl Default for SustainedLoadConfig {
    fn default() -> Self {
        Self {
            duration_secs: 180,
            interval_ms: 100,
            error_backoff_ms: 1_000,
        }
    }
}

/// A rate-scheduled load scenario.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoadScenario {
    pub name: String,
    pub duration_secs: u64,
    pub target_qps: u64,
}

impl LoadScenario {
    pub fn new(name: &str, duration_secs: u64, target_qps: u64) -> Self {
        Self {
            name: name.to_string(),
            duration_secs,
            target_qps,
        }
    }
}

/// Load generator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub scenarios: Vec<LoadScenario>,
    /// Rest between scenarios.
    pub rest_secs: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            scenarios: vec![
                LoadScenario::new("basic_select", 60, 50),
                LoadScenario::new("mixed_high_load", 120, 100),
                LoadScenario::new("max_throughput", 60, 200),
            ],
            rest_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty output for terminals, JSON for log shipping.
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Per-node overrides for the simulated cluster.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimNodeOverride {
    pub node_id: String,
    pub latency_ms: Option<u64>,
    pub replication_delay_ms: Option<u64>,
    pub max_connections: Option<usize>,
    #[serde(default)]
    pub down: bool,
}

/// Simulated cluster behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Round-trip latency of every query.
    pub latency_ms: u64,

    /// Delay before a primary write becomes visible on a replica.
    pub replication_delay_ms: u64,

    /// Server-side connection ceiling per node.
    pub max_connections: usize,

    pub overrides: Vec<SimNodeOverride>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency_ms: 5,
            replication_delay_ms: 300,
            max_connections: 151,
            overrides: Vec::new(),
        }
    }
}
