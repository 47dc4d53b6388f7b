//! Connection capacity probing.
//!
//! Opens escalating bursts of direct sessions on the primary to find how many
//! concurrent connections the node accepts.

use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CapacityConfig;
use crate::driver::{DriverError, Session};
use crate::observability::metrics;
use crate::routing::{Router, RouterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionErrorKind {
    /// Server connection limit reached.
    Exhausted,
    Refused,
    Timeout,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionAttemptError {
    pub kind: ConnectionErrorKind,
    pub message: String,
}

impl ConnectionAttemptError {
    fn from_router(err: RouterError) -> Self {
        let kind = match &err {
            RouterError::Unreachable { source, .. } => match source {
                DriverError::TooManyConnections(_) => ConnectionErrorKind::Exhausted,
                DriverError::Refused { .. } => ConnectionErrorKind::Refused,
                DriverError::Timeout(_) => ConnectionErrorKind::Timeout,
                DriverError::Query(_) => ConnectionErrorKind::Other,
            },
            RouterError::PrimarySuspended(_) => ConnectionErrorKind::Refused,
            _ => ConnectionErrorKind::Other,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }

    fn from_driver(err: DriverError) -> Self {
        let kind = match err {
            DriverError::TooManyConnections(_) => ConnectionErrorKind::Exhausted,
            DriverError::Refused { .. } => ConnectionErrorKind::Refused,
            DriverError::Timeout(_) => ConnectionErrorKind::Timeout,
            DriverError::Query(_) => ConnectionErrorKind::Other,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }

    fn timed_out(limit: Duration) -> Self {
        Self {
            kind: ConnectionErrorKind::Timeout,
            message: format!("connection attempt timed out after {limit:?}"),
        }
    }
}

/// Outcome of one burst.
#[derive(Debug, Clone, Serialize)]
pub struct CapacityProbeResult {
    pub batch_size: usize,
    pub successful_connections: usize,
    pub errors: Vec<ConnectionAttemptError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStability {
    Good,
    Poor,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapacityReport {
    pub batches: Vec<CapacityProbeResult>,
    pub max_successful_connections: usize,
    pub total_errors: usize,
    pub connection_stability: ConnectionStability,
    /// First few error messages across all batches.
    pub error_details: Vec<String>,
}

impl CapacityReport {
    fn summarize(batches: Vec<CapacityProbeResult>, config: &CapacityConfig) -> Self {
        let max_successful_connections = batches
            .iter()
            .map(|b| b.successful_connections)
            .max()
            .unwrap_or(0);
        let total_errors = batches.iter().map(|b| b.errors.len()).sum();
        let connection_stability = if total_errors < config.error_threshold {
            ConnectionStability::Good
        } else {
            ConnectionStability::Poor
        };
        let error_details = batches
            .iter()
            .flat_map(|b| b.errors.iter().map(|e| e.message.clone()))
            .take(config.error_detail_limit)
            .collect();

        Self {
            batches,
            max_successful_connections,
            total_errors,
            connection_stability,
            error_details,
        }
    }
}

pub struct CapacityProbe {
    router: Arc<Router>,
    config: CapacityConfig,
}

impl CapacityProbe {
    pub fn new(router: Arc<Router>, config: CapacityConfig) -> Self {
        Self { router, config }
    }

    /// Run one burst per batch size, settling between bursts.
    pub async fn run_capacity_probe(&self, batches: &[usize]) -> CapacityReport {
        let settle = Duration::from_millis(self.config.settle_ms);
        let mut results = Vec::with_capacity(batches.len());

        for (i, &batch_size) in batches.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(settle).await;
            }
            let result = self.run_batch(batch_size).await;
            metrics::record_capacity_batch(batch_size, result.successful_connections);
            tracing::info!(
                batch_size,
                successful = result.successful_connections,
                errors = result.errors.len(),
                "Capacity batch finished"
            );
            results.push(result);
        }

        let report = CapacityReport::summarize(results, &self.config);
        tracing::info!(
            max_successful_connections = report.max_successful_connections,
            total_errors = report.total_errors,
            stability = ?report.connection_stability,
            "Capacity probe finished"
        );
        report
    }

    async fn run_batch(&self, batch_size: usize) -> CapacityProbeResult {
        let outcomes = join_all((0..batch_size).map(|_| self.attempt())).await;

        let mut successful_connections = 0;
        let mut errors = Vec::new();
        let mut held = Vec::with_capacity(batch_size);
        for outcome in outcomes {
            match outcome {
                Ok(session) => {
                    successful_connections += 1;
                    held.push(session);
                }
                Err(e) => errors.push(e),
            }
        }
        // all sessions of the burst stay open until every attempt finished
        drop(held);

        CapacityProbeResult {
            batch_size,
            successful_connections,
            errors,
        }
    }

    async fn attempt(&self) -> Result<Box<dyn Session>, ConnectionAttemptError> {
        let limit = Duration::from_millis(self.config.attempt_timeout_ms);
        let primary = &self.router.registry().primary().id;

        let connect = async {
            let mut session = self
                .router
                .connect_unpooled(primary)
                .await
                .map_err(ConnectionAttemptError::from_router)?;
            session
                .ping()
                .await
                .map_err(ConnectionAttemptError::from_driver)?;
            Ok::<_, ConnectionAttemptError>(session)
        };

        match tokio::time::timeout(limit, connect).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ConnectionAttemptError::timed_out(limit)),
        }
    }
}
