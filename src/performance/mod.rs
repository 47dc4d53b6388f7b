//! Rate-scheduled load scenarios.
//!
//! # Data Flow
//! ```text
//! LoadScenario { duration, target_qps }
//!     → duration × qps query tasks, task i starts at i / qps
//!     → each task: random read/write lease → timed query
//!     → PerformanceMetrics (qps, avg, p95, p99, grade)
//! ```

pub mod load;

pub use load::{percentile, LoadGenerator, PerformanceGrade, PerformanceMetrics};
