//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! acquire_write()
//!     → primary pool → Lease
//!
//! acquire_read(preferred)
//!     → latest HealthSnapshot
//!     → healthy replicas (registration order)
//!     → preferred if healthy, else weighted pick
//!     → replica pool → Lease
//!     → no healthy replica: primary Lease + degraded signal
//! ```
//!
//! # Design Decisions
//! - The primary is never a weighted candidate
//! - Degraded reads are a counted signal, not an error
//! - No retries: a failed acquisition is returned to the caller

pub mod router;

pub use router::{NodeConnectionStats, Router, RouterError};
