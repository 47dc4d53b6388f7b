//! Resilience harness.
//!
//! # Data Flow
//! ```text
//! CapacityProbe:      batch of direct sessions → join all → count / classify → settle
//! FailoverSimulation: baseline window → fence primary → outage → recovery window → unfence
//! SustainedLoad:      fixed-interval query loop on the primary → success rate / uptime
//! ```
//!
//! # Design Decisions
//! - Every attempt yields an outcome; no failure cancels its siblings
//! - Sessions opened by a burst are all released before the next batch
//! - Outages are simulated by fencing primary traffic in the router

pub mod capacity;
pub mod failover;
pub mod sustained;

pub use capacity::{
    CapacityProbe, CapacityProbeResult, CapacityReport, ConnectionAttemptError,
    ConnectionErrorKind, ConnectionStability,
};
pub use failover::{
    classify_recovery, performance_impact_percent, FailoverResult, FailoverSimulation,
    RecoveryQuality, WindowStats,
};
pub use sustained::{SustainedLoad, SustainedLoadReport};
