//! Cluster topology.
//!
//! The registry is the single source of node identity and ordering. It is
//! built once from validated configuration and shared by value (cheap clone).

pub mod registry;

pub use registry::NodeRegistry;
