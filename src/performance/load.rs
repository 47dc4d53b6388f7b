//! Load generator.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::{LoadScenario, PerformanceConfig};
use crate::routing::{Router, RouterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformanceGrade {
    Excellent,
    Good,
    NeedsImprovement,
}

impl PerformanceGrade {
    pub fn for_qps(qps: f64) -> Self {
        if qps >= 150.0 {
            Self::Excellent
        } else if qps >= 100.0 {
            Self::Good
        } else {
            Self::NeedsImprovement
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub scenario: String,
    pub duration_seconds: f64,
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    pub queries_per_second: f64,
    pub avg_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub p99_response_time_ms: f64,
    pub grade: PerformanceGrade,
}

/// Nearest-rank percentile over sorted samples: `sorted[floor(n × p)]`,
/// clamped to the last element. 0 for no samples.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[idx]
}

impl PerformanceMetrics {
    fn compute(scenario: &str, duration: Duration, total: u64, mut times_ms: Vec<f64>) -> Self {
        times_ms.sort_by(|a, b| a.total_cmp(b));
        let successful = times_ms.len() as u64;
        let secs = duration.as_secs_f64();
        let qps = if secs > 0.0 { successful as f64 / secs } else { 0.0 };
        let avg = if times_ms.is_empty() {
            0.0
        } else {
            times_ms.iter().sum::<f64>() / times_ms.len() as f64
        };

        Self {
            scenario: scenario.to_string(),
            duration_seconds: secs,
            total_queries: total,
            successful_queries: successful,
            failed_queries: total - successful,
            queries_per_second: qps,
            avg_response_time_ms: avg,
            p95_response_time_ms: percentile(&times_ms, 0.95),
            p99_response_time_ms: percentile(&times_ms, 0.99),
            grade: PerformanceGrade::for_qps(qps),
        }
    }
}

pub struct LoadGenerator {
    router: Arc<Router>,
    config: PerformanceConfig,
}

impl LoadGenerator {
    pub fn new(router: Arc<Router>, config: PerformanceConfig) -> Self {
        Self { router, config }
    }

    /// Run every configured scenario with a rest period in between.
    pub async fn run_all(&self) -> Vec<PerformanceMetrics> {
        let rest = Duration::from_secs(self.config.rest_secs);
        let mut results = Vec::with_capacity(self.config.scenarios.len());
        for (i, scenario) in self.config.scenarios.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(rest).await;
            }
            results.push(self.run_scenario(scenario).await);
        }
        results
    }

    /// Issue `duration × target_qps` queries, query `i` starting at `i / qps`.
    pub async fn run_scenario(&self, scenario: &LoadScenario) -> PerformanceMetrics {
        let total = scenario.duration_secs * scenario.target_qps;
        tracing::info!(
            scenario = %scenario.name,
            duration_secs = scenario.duration_secs,
            target_qps = scenario.target_qps,
            total_queries = total,
            "Starting load scenario"
        );

        let start = Instant::now();
        let mut tasks = JoinSet::new();
        for i in 0..total {
            let router = self.router.clone();
            let at = start + Duration::from_secs_f64(i as f64 / scenario.target_qps as f64);
            tasks.spawn(async move {
                tokio::time::sleep_until(at).await;
                timed_query(&router, fastrand::bool()).await
            });
        }

        let mut times_ms = Vec::with_capacity(total as usize);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(elapsed)) => times_ms.push(elapsed.as_secs_f64() * 1000.0),
                Ok(Err(e)) => tracing::debug!(scenario = %scenario.name, error = %e, "Load query failed"),
                Err(e) => tracing::error!(scenario = %scenario.name, error = %e, "Load task panicked"),
            }
        }

        let metrics = PerformanceMetrics::compute(&scenario.name, start.elapsed(), total, times_ms);
        tracing::info!(
            scenario = %metrics.scenario,
            qps = metrics.queries_per_second,
            avg_ms = metrics.avg_response_time_ms,
            p95_ms = metrics.p95_response_time_ms,
            p99_ms = metrics.p99_response_time_ms,
            failed = metrics.failed_queries,
            grade = ?metrics.grade,
            "Load scenario finished"
        );
        metrics
    }
}

async fn timed_query(router: &Router, read: bool) -> Result<Duration, RouterError> {
    let start = Instant::now();
    let mut lease = router.acquire_any(read).await?;
    if let Err(source) = lease.server_time().await {
        let node_id = lease.node_id().to_string();
        lease.discard();
        return Err(RouterError::Unreachable { node_id, source });
    }
    Ok(start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeRegistry;
    use crate::config::VerifierConfig;
    use crate::driver::SimulatedCluster;
    use crate::health::HealthStore;

    #[tokio::test(start_paused = true)]
    async fn test_failed_query_does_not_return_session_to_pool() {
        let mut config = VerifierConfig::local_pair();
        config.nodes.truncate(1);
        let sim = SimulatedCluster::new(&config.nodes, &config.simulation);
        let registry = NodeRegistry::register(config.nodes).unwrap();
        let health = Arc::new(HealthStore::new(&registry));
        let router = Router::new(registry, Arc::new(sim.clone()), health, &config.pool);

        timed_query(&router, true).await.unwrap();
        assert_eq!(router.pool("primary").unwrap().stats().open_connections, 1);

        sim.set_down("primary", true);
        assert!(timed_query(&router, true).await.is_err());
        let stats = router.pool("primary").unwrap().stats();
        assert_eq!(stats.open_connections, 0);
        assert_eq!(stats.idle_connections, 0);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&samples, 0.95), 96.0);
        assert_eq!(percentile(&samples, 0.99), 100.0);
        assert_eq!(percentile(&[5.0], 0.99), 5.0);
        assert_eq!(percentile(&[], 0.95), 0.0);
    }

    #[test]
    fn test_grades() {
        assert_eq!(PerformanceGrade::for_qps(150.0), PerformanceGrade::Excellent);
        assert_eq!(PerformanceGrade::for_qps(120.0), PerformanceGrade::Good);
        assert_eq!(PerformanceGrade::for_qps(99.9), PerformanceGrade::NeedsImprovement);
    }

    #[test]
    fn test_compute_counts_failures() {
        let m = PerformanceMetrics::compute(
            "basic_select",
            Duration::from_secs(2),
            5,
            vec![30.0, 10.0, 20.0],
        );
        assert_eq!(m.successful_queries, 3);
        assert_eq!(m.failed_queries, 2);
        assert_eq!(m.queries_per_second, 1.5);
        assert_eq!(m.avg_response_time_ms, 20.0);
        assert_eq!(m.p95_response_time_ms, 30.0);
    }
}
