//! Replication lag measurement.

use futures_util::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::verification::canary::CanaryRecord;
use crate::verification::consistency::ConsistencyVerifier;

#[derive(Debug, Clone, Serialize)]
pub struct LagSample {
    pub case: usize,
    pub node_id: String,
    pub lag_seconds: f64,
}

/// Aggregates over matched samples only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LagReport {
    pub samples: Vec<LagSample>,
    /// Replica polls that hit the ceiling without seeing the canary.
    pub unmatched: usize,
    /// Samples whose canary write failed.
    pub failed_writes: usize,
    pub avg_lag_seconds: f64,
    pub min_lag_seconds: f64,
    pub max_lag_seconds: f64,
}

impl LagReport {
    fn aggregate(samples: Vec<LagSample>, unmatched: usize, failed_writes: usize) -> Self {
        if samples.is_empty() {
            return Self {
                unmatched,
                failed_writes,
                ..Self::default()
            };
        }
        let lags = samples.iter().map(|s| s.lag_seconds);
        let sum: f64 = lags.clone().sum();
        let min = lags.clone().fold(f64::INFINITY, f64::min);
        let max = lags.fold(0.0, f64::max);
        Self {
            avg_lag_seconds: sum / samples.len() as f64,
            min_lag_seconds: min,
            max_lag_seconds: max,
            samples,
            unmatched,
            failed_writes,
        }
    }
}

impl ConsistencyVerifier {
    /// Write `sample_count` canaries and time how long each replica takes
    /// to serve them.
    pub async fn run_lag_measurement(&self, sample_count: usize) -> LagReport {
        let poll_interval = Duration::from_millis(self.config.lag_poll_interval_ms);
        let ceiling = Duration::from_millis(self.config.lag_ceiling_ms);
        let gap = Duration::from_millis(self.config.lag_sample_gap_ms);

        tracing::info!(samples = sample_count, "Starting replication lag measurement");

        let mut samples = Vec::new();
        let mut unmatched = 0;
        let mut failed_writes = 0;

        for case in 0..sample_count {
            if case > 0 {
                tokio::time::sleep(gap).await;
            }

            let canary = CanaryRecord::generate();
            if let Err(e) = self.write_canary(&canary).await {
                tracing::warn!(case, error = %e, "Lag sample write failed");
                failed_writes += 1;
                continue;
            }
            let written_at = Instant::now();

            let replicas = self.router.registry().replicas();
            let lags = join_all(
                replicas
                    .iter()
                    .map(|r| self.wait_for(&r.id, &canary, written_at, poll_interval, ceiling)),
            )
            .await;

            for (replica, lag) in replicas.iter().zip(lags) {
                match lag {
                    Some(lag) => {
                        metrics::record_replication_lag(&replica.id, lag);
                        tracing::debug!(case, node = %replica.id, lag_ms = lag.as_millis() as u64, "Replica caught up");
                        samples.push(LagSample {
                            case,
                            node_id: replica.id.clone(),
                            lag_seconds: lag.as_secs_f64(),
                        });
                    }
                    None => {
                        tracing::warn!(case, node = %replica.id, ceiling_ms = ceiling.as_millis() as u64, "Replica did not catch up");
                        unmatched += 1;
                    }
                }
            }

            self.cleanup(&canary).await;
        }

        let report = LagReport::aggregate(samples, unmatched, failed_writes);
        tracing::info!(
            matched = report.samples.len(),
            unmatched = report.unmatched,
            avg_lag_seconds = report.avg_lag_seconds,
            max_lag_seconds = report.max_lag_seconds,
            "Replication lag measurement finished"
        );
        report
    }

    async fn wait_for(
        &self,
        node_id: &str,
        canary: &CanaryRecord,
        written_at: Instant,
        poll_interval: Duration,
        ceiling: Duration,
    ) -> Option<Duration> {
        let deadline = written_at + ceiling;
        loop {
            if self.matches_on(node_id, canary).await {
                return Some(written_at.elapsed());
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
