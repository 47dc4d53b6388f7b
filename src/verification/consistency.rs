//! Read-after-write consistency checks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::config::ConsistencyConfig;
use crate::driver::DriverError;
use crate::observability::metrics;
use crate::routing::{Router, RouterError};
use crate::verification::canary::{verify, CanaryRecord};

/// Errors that abandon a single case or sample.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error(transparent)]
    Route(#[from] RouterError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// One replica read at one delay.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyObservation {
    pub case: usize,
    pub node_id: String,
    pub delay_ms: u64,
    pub consistent: bool,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseFailure {
    pub case: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    pub cases_run: usize,
    pub total_observations: usize,
    pub consistent_observations: usize,
    /// `consistent / total`, 0 when nothing was observed.
    pub consistency_rate: f64,
    pub failed_cases: Vec<CaseFailure>,
    pub observations: Vec<ConsistencyObservation>,
}

impl ConsistencyReport {
    fn from_cases(
        cases_run: usize,
        observations: Vec<ConsistencyObservation>,
        failed_cases: Vec<CaseFailure>,
    ) -> Self {
        let total = observations.len();
        let consistent = observations.iter().filter(|o| o.consistent).count();
        let rate = if total == 0 {
            0.0
        } else {
            consistent as f64 / total as f64
        };
        Self {
            cases_run,
            total_observations: total,
            consistent_observations: consistent,
            consistency_rate: rate,
            failed_cases,
            observations,
        }
    }
}

/// Writes canaries through the router and checks them on every replica.
pub struct ConsistencyVerifier {
    pub(crate) router: Arc<Router>,
    pub(crate) config: ConsistencyConfig,
    table: OnceCell<()>,
}

impl ConsistencyVerifier {
    pub fn new(router: Arc<Router>, config: ConsistencyConfig) -> Self {
        Self {
            router,
            config,
            table: OnceCell::new(),
        }
    }

    /// Run `case_count` cases, reading each canary back after every delay.
    pub async fn run_consistency_check(
        &self,
        case_count: usize,
        delays: &[Duration],
    ) -> ConsistencyReport {
        tracing::info!(
            cases = case_count,
            delays = ?delays,
            replicas = self.router.registry().replicas().len(),
            "Starting consistency check"
        );

        let mut observations = Vec::new();
        let mut failed = Vec::new();

        for case in 0..case_count {
            match self.run_case(case, delays).await {
                Ok(mut found) => observations.append(&mut found),
                Err(e) => {
                    tracing::warn!(case, error = %e, "Consistency case abandoned");
                    failed.push(CaseFailure {
                        case,
                        error: e.to_string(),
                    });
                }
            }
        }

        let report = ConsistencyReport::from_cases(case_count, observations, failed);
        tracing::info!(
            total = report.total_observations,
            consistent = report.consistent_observations,
            rate = report.consistency_rate,
            failed_cases = report.failed_cases.len(),
            "Consistency check finished"
        );
        report
    }

    /// Write one canary, observe it on every replica after each delay, then
    /// remove it.
    pub async fn run_case(
        &self,
        case: usize,
        delays: &[Duration],
    ) -> Result<Vec<ConsistencyObservation>, VerifyError> {
        let canary = CanaryRecord::generate();
        self.write_canary(&canary).await?;

        let replicas = self.router.registry().replicas();
        let mut observations = Vec::with_capacity(delays.len() * replicas.len());
        for delay in delays {
            tokio::time::sleep(*delay).await;
            for replica in replicas {
                let consistent = self.matches_on(&replica.id, &canary).await;
                metrics::record_consistency_observation(&replica.id, consistent);
                tracing::debug!(
                    case,
                    node = %replica.id,
                    delay_ms = delay.as_millis() as u64,
                    consistent,
                    "Canary observed"
                );
                observations.push(ConsistencyObservation {
                    case,
                    node_id: replica.id.clone(),
                    delay_ms: delay.as_millis() as u64,
                    consistent,
                    observed_at: Utc::now(),
                });
            }
        }

        self.cleanup(&canary).await;
        Ok(observations)
    }

    /// Create the canary table on first use.
    async fn ensure_table(&self) -> Result<(), VerifyError> {
        self.table
            .get_or_try_init(|| async {
                let mut lease = self.router.acquire_write().await?;
                lease.ensure_canary_table().await?;
                tracing::debug!(node = %lease.node_id(), "Canary table ready");
                Ok::<(), VerifyError>(())
            })
            .await?;
        Ok(())
    }

    pub(crate) async fn write_canary(&self, canary: &CanaryRecord) -> Result<(), VerifyError> {
        self.ensure_table().await?;
        let mut lease = self.router.acquire_write().await?;
        if let Err(e) = lease.insert_canary(&canary.to_row()).await {
            lease.discard();
            return Err(e.into());
        }
        Ok(())
    }

    /// Read the canary on one node. Any failure counts as inconsistent.
    pub(crate) async fn matches_on(&self, node_id: &str, canary: &CanaryRecord) -> bool {
        let mut lease = match self.router.acquire_node(node_id).await {
            Ok(lease) => lease,
            Err(e) => {
                tracing::debug!(node = %node_id, error = %e, "Replica unavailable for canary read");
                return false;
            }
        };
        match lease.fetch_canary(&canary.id).await {
            Ok(row) => verify(canary, row.as_ref()),
            Err(e) => {
                tracing::debug!(node = %node_id, error = %e, "Canary read failed");
                lease.discard();
                false
            }
        }
    }

    pub(crate) async fn cleanup(&self, canary: &CanaryRecord) {
        let result = match self.router.acquire_write().await {
            Ok(mut lease) => lease.delete_canary(&canary.id).await.map_err(VerifyError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(canary = %canary.id, error = %e, "Canary cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeRegistry;
    use crate::config::VerifierConfig;
    use crate::driver::SimulatedCluster;
    use crate::health::HealthStore;

    fn verifier() -> (ConsistencyVerifier, SimulatedCluster) {
        let config = VerifierConfig::local_pair();
        let sim = SimulatedCluster::new(&config.nodes, &config.simulation);
        let registry = NodeRegistry::register(config.nodes).unwrap();
        let health = Arc::new(HealthStore::new(&registry));
        let router = Router::new(registry, Arc::new(sim.clone()), health, &config.pool);
        (
            ConsistencyVerifier::new(Arc::new(router), config.consistency),
            sim,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_tampered_replica_row_is_inconsistent() {
        let (verifier, sim) = verifier();
        let canary = CanaryRecord::generate();
        verifier.write_canary(&canary).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(verifier.matches_on("replica-1", &canary).await);
        assert!(sim.tamper("replica-1", &canary.id, "not the payload"));
        assert!(!verifier.matches_on("replica-1", &canary).await);
        assert!(verifier.matches_on("primary", &canary).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_failure_is_swallowed() {
        let (verifier, sim) = verifier();
        let canary = CanaryRecord::generate();
        verifier.write_canary(&canary).await.unwrap();

        sim.set_down("primary", true);
        verifier.cleanup(&canary).await;
        sim.set_down("primary", false);
        assert_eq!(sim.row_count("primary"), 1);
    }

    fn observation(consistent: bool) -> ConsistencyObservation {
        ConsistencyObservation {
            case: 0,
            node_id: "replica-1".into(),
            delay_ms: 100,
            consistent,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_rate_over_observations() {
        let report = ConsistencyReport::from_cases(
            2,
            vec![observation(true), observation(false), observation(true), observation(true)],
            Vec::new(),
        );
        assert_eq!(report.total_observations, 4);
        assert_eq!(report.consistent_observations, 3);
        assert_eq!(report.consistency_rate, 0.75);
    }

    #[test]
    fn test_rate_is_zero_without_observations() {
        let report = ConsistencyReport::from_cases(
            1,
            Vec::new(),
            vec![CaseFailure {
                case: 0,
                error: "boom".into(),
            }],
        );
        assert_eq!(report.consistency_rate, 0.0);
        assert_eq!(report.failed_cases.len(), 1);
    }
}
