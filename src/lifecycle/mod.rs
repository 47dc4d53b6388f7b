//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Register nodes → Build pools + router
//!     → Warm up pools → Start health prober
//!
//! Shutdown (shutdown.rs):
//!     trigger() → prober loop exits → pools closed
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then pools, then background tasks
//! - An unreachable primary is fatal; an unreachable replica starts unhealthy

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Cluster, StartupError};
