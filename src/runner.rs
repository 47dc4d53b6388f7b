//! Suite runner.
//!
//! Executes the selected suites against a started [`Cluster`] and gathers
//! one serializable [`RunReport`]. Each suite runs in its own task so a
//! failing or panicking suite becomes an error entry instead of aborting
//! the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::VerifierConfig;
use crate::lifecycle::Cluster;
use crate::performance::{LoadGenerator, PerformanceMetrics};
use crate::resilience::{
    CapacityProbe, CapacityReport, FailoverResult, FailoverSimulation, SustainedLoad,
    SustainedLoadReport,
};
use crate::routing::{NodeConnectionStats, Router};
use crate::verification::{ConsistencyReport, ConsistencyVerifier, LagReport};

/// Which suites to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SuiteSelection {
    All,
    Consistency,
    Stability,
    Performance,
}

impl SuiteSelection {
    fn includes(self, suite: SuiteSelection) -> bool {
        self == SuiteSelection::All || self == suite
    }
}

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("all {cases} consistency cases failed, last error: {last_error}")]
    NoCaseCompleted { cases: usize, last_error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsistencySuiteReport {
    pub consistency: ConsistencyReport,
    pub lag: LagReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct StabilitySuiteReport {
    pub sustained: SustainedLoadReport,
    pub capacity: CapacityReport,
    pub failover: FailoverResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub selection: SuiteSelection,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub consistency: Option<ConsistencySuiteReport>,
    pub stability: Option<StabilitySuiteReport>,
    pub performance: Option<Vec<PerformanceMetrics>>,
    pub connection_stats: Vec<NodeConnectionStats>,
    pub degraded_reads: u64,
    pub errors: Vec<String>,
}

pub struct TestRunner {
    router: Arc<Router>,
    config: VerifierConfig,
}

impl TestRunner {
    pub fn new(cluster: &Cluster) -> Self {
        Self {
            router: cluster.router().clone(),
            config: cluster.config().clone(),
        }
    }

    pub async fn run(&self, selection: SuiteSelection) -> RunReport {
        let started_at = Utc::now();
        tracing::info!(?selection, "Test run starting");

        let mut errors = Vec::new();

        let consistency = if selection.includes(SuiteSelection::Consistency) {
            guarded("consistency", consistency_suite(self.router.clone(), self.config.clone()))
                .await
                .map_err(|e| errors.push(e))
                .ok()
        } else {
            None
        };

        let stability = if selection.includes(SuiteSelection::Stability) {
            guarded("stability", stability_suite(self.router.clone(), self.config.clone()))
                .await
                .map_err(|e| errors.push(e))
                .ok()
        } else {
            None
        };

        let performance = if selection.includes(SuiteSelection::Performance) {
            guarded("performance", performance_suite(self.router.clone(), self.config.clone()))
                .await
                .map_err(|e| errors.push(e))
                .ok()
        } else {
            None
        };

        let report = RunReport {
            selection,
            started_at,
            finished_at: Utc::now(),
            consistency,
            stability,
            performance,
            connection_stats: self.router.connection_stats(),
            degraded_reads: self.router.degraded_reads(),
            errors,
        };
        tracing::info!(
            errors = report.errors.len(),
            degraded_reads = report.degraded_reads,
            "Test run finished"
        );
        report
    }
}

async fn guarded<T, F>(name: &str, suite: F) -> Result<T, String>
where
    T: Send + 'static,
    F: Future<Output = Result<T, SuiteError>> + Send + 'static,
{
    let result = match tokio::spawn(suite).await {
        Ok(Ok(report)) => return Ok(report),
        Ok(Err(e)) => format!("{name} suite failed: {e}"),
        Err(e) => format!("{name} suite aborted: {e}"),
    };
    tracing::error!(suite = name, error = %result, "Suite did not complete");
    Err(result)
}

async fn consistency_suite(
    router: Arc<Router>,
    config: VerifierConfig,
) -> Result<ConsistencySuiteReport, SuiteError> {
    let settings = config.consistency;
    let verifier = ConsistencyVerifier::new(router, settings.clone());

    let consistency = verifier
        .run_consistency_check(settings.case_count, &settings.delays())
        .await;
    if consistency.cases_run > 0 && consistency.failed_cases.len() == consistency.cases_run {
        let last_error = consistency
            .failed_cases
            .last()
            .map(|f| f.error.clone())
            .unwrap_or_default();
        return Err(SuiteError::NoCaseCompleted {
            cases: consistency.cases_run,
            last_error,
        });
    }

    let lag = verifier.run_lag_measurement(settings.lag_sample_count).await;
    Ok(ConsistencySuiteReport { consistency, lag })
}

async fn stability_suite(
    router: Arc<Router>,
    config: VerifierConfig,
) -> Result<StabilitySuiteReport, SuiteError> {
    let sustained = SustainedLoad::new(router.clone(), config.sustained.clone())
        .run(Duration::from_secs(config.sustained.duration_secs))
        .await;

    let capacity = CapacityProbe::new(router.clone(), config.capacity.clone())
        .run_capacity_probe(&config.capacity.batch_sizes)
        .await;

    let failover = FailoverSimulation::new(router, config.failover.clone())
        .run_failover_simulation(
            Duration::from_secs(config.failover.outage_secs),
            Duration::from_secs(config.failover.window_secs),
        )
        .await;

    Ok(StabilitySuiteReport {
        sustained,
        capacity,
        failover,
    })
}

async fn performance_suite(
    router: Arc<Router>,
    config: VerifierConfig,
) -> Result<Vec<PerformanceMetrics>, SuiteError> {
    Ok(LoadGenerator::new(router, config.performance).run_all().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_includes() {
        assert!(SuiteSelection::All.includes(SuiteSelection::Stability));
        assert!(SuiteSelection::Consistency.includes(SuiteSelection::Consistency));
        assert!(!SuiteSelection::Consistency.includes(SuiteSelection::Performance));
    }

    #[tokio::test]
    async fn test_guarded_records_failure() {
        let err = guarded::<(), _>("consistency", async {
            Err(SuiteError::NoCaseCompleted {
                cases: 2,
                last_error: "primary down".into(),
            })
        })
        .await
        .unwrap_err();
        assert_eq!(
            err,
            "consistency suite failed: all 2 consistency cases failed, last error: primary down"
        );
    }

    #[tokio::test]
    async fn test_guarded_records_panic() {
        let suite = async {
            let scenarios: Vec<PerformanceMetrics> = Vec::new();
            assert!(!scenarios.is_empty(), "boom");
            Ok::<(), SuiteError>(())
        };
        let err = guarded::<(), _>("performance", suite).await.unwrap_err();
        assert!(err.starts_with("performance suite aborted"));
    }
}
