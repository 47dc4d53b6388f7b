//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic ticker (active.rs)
//!     → probe every node concurrently
//!     → latency → weight tier, failure → weight 0
//!     → publish HealthSnapshot (state.rs)
//!     → Router reads the latest snapshot
//! ```
//!
//! # Design Decisions
//! - One writer (the prober), many readers
//! - A failing node never aborts probing of its siblings
//! - Readers may see a snapshot one round old

pub mod active;
pub mod state;

pub use active::{HealthProber, ProbeFailure, ProbeOutcome};
pub use state::{weight_for_latency, HealthSnapshot, HealthStore, NodeState};
