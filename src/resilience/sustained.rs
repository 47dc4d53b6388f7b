//! Sustained-load stability run.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::SustainedLoadConfig;
use crate::driver::DriverError;
use crate::routing::{Router, RouterError};

const QUERIES_PER_ITERATION: usize = 3;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SustainedLoadReport {
    pub duration_seconds: f64,
    pub total_requests: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub uptime_percentage: f64,
    pub avg_response_time_ms: f64,
}

/// Fixed-interval query loop against the primary.
pub struct SustainedLoad {
    router: Arc<Router>,
    config: SustainedLoadConfig,
}

impl SustainedLoad {
    pub fn new(router: Arc<Router>, config: SustainedLoadConfig) -> Self {
        Self { router, config }
    }

    pub async fn run(&self, duration: Duration) -> SustainedLoadReport {
        let interval = Duration::from_millis(self.config.interval_ms);
        let backoff = Duration::from_millis(self.config.error_backoff_ms);
        tracing::info!(duration_secs = duration.as_secs(), "Starting sustained load run");

        let start = Instant::now();
        let mut succeeded = 0u64;
        let mut errors = 0u64;
        let mut total_ms = 0.0;

        while start.elapsed() < duration {
            match self.iteration(&mut succeeded, &mut total_ms).await {
                Ok(()) => tokio::time::sleep(interval).await,
                Err(e) => {
                    errors += 1;
                    tracing::warn!(error = %e, "Sustained load query failed");
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        let total = succeeded + errors;
        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64
        };
        let report = SustainedLoadReport {
            duration_seconds: start.elapsed().as_secs_f64(),
            total_requests: total,
            error_count: errors,
            success_rate,
            uptime_percentage: success_rate * 100.0,
            avg_response_time_ms: if succeeded > 0 { total_ms / succeeded as f64 } else { 0.0 },
        };
        tracing::info!(
            total_requests = report.total_requests,
            errors = report.error_count,
            uptime_percentage = report.uptime_percentage,
            avg_response_time_ms = report.avg_response_time_ms,
            "Sustained load run finished"
        );
        report
    }

    /// One lease, three timed queries. Stops at the first failure.
    async fn iteration(&self, succeeded: &mut u64, total_ms: &mut f64) -> Result<(), RouterError> {
        let mut lease = self.router.acquire_write().await?;
        let node_id = lease.node_id().to_string();

        for i in 0..QUERIES_PER_ITERATION {
            let start = Instant::now();
            let result: Result<(), DriverError> = if i % 2 == 0 {
                lease.server_time().await.map(|_| ())
            } else {
                lease.ping().await
            };
            if let Err(source) = result {
                lease.discard();
                return Err(RouterError::Unreachable { node_id, source });
            }
            *succeeded += 1;
            *total_ms += start.elapsed().as_secs_f64() * 1000.0;
        }
        Ok(())
    }
}
