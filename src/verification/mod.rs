//! Canary-based consistency verification.
//!
//! # Data Flow
//! ```text
//! CanaryRecord::generate()
//!     → Router::acquire_write() → insert on the primary
//!     → per delay: sleep → read on every replica (pinned) → observation
//!     → delete on the primary (best effort)
//!
//! Lag measurement:
//!     write → poll each replica until match or ceiling → LagSample
//! ```
//!
//! # Design Decisions
//! - A mismatch or a failed replica read is an observation, not an error
//! - Only a failed canary write abandons a case
//! - Cleanup failures are logged and swallowed

pub mod canary;
pub mod consistency;
pub mod lag;

pub use canary::{checksum, verify, CanaryRecord};
pub use consistency::{
    CaseFailure, ConsistencyObservation, ConsistencyReport, ConsistencyVerifier, VerifyError,
};
pub use lag::{LagReport, LagSample};
