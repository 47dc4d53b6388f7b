//! Primary outage simulation.
//!
//! # Phases
//! ```text
//! Baseline  → one query per interval on the primary for `window`
//! Outage    → primary fenced in the router for `outage`
//! Recovery  → one query per interval through the read path for `window`
//!             (primary still fenced)
//! Restore   → primary unfenced
//! ```

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::FailoverConfig;
use crate::routing::{Router, RouterError};

/// Recovery grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryQuality {
    Excellent,
    Good,
    NeedsImprovement,
}

/// `|baseline − recovery| / baseline × 100`, 0 when the baseline is 0.
pub fn performance_impact_percent(baseline_avg_ms: f64, recovery_avg_ms: f64) -> f64 {
    if baseline_avg_ms == 0.0 {
        return 0.0;
    }
    ((baseline_avg_ms - recovery_avg_ms) / baseline_avg_ms * 100.0).abs()
}

pub fn classify_recovery(recovery_time_secs: f64, impact_percent: f64) -> RecoveryQuality {
    if recovery_time_secs <= 30.0 && impact_percent <= 20.0 {
        RecoveryQuality::Excellent
    } else if recovery_time_secs <= 60.0 && impact_percent <= 40.0 {
        RecoveryQuality::Good
    } else {
        RecoveryQuality::NeedsImprovement
    }
}

/// Query statistics over one measurement window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WindowStats {
    pub duration_seconds: f64,
    pub successful_queries: u64,
    pub errors: u64,
    pub qps: f64,
    pub avg_response_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailoverResult {
    pub recovery_time_seconds: f64,
    pub baseline_qps: f64,
    pub recovery_qps: f64,
    pub performance_impact_percent: f64,
    pub quality_tier: RecoveryQuality,
    pub baseline: WindowStats,
    pub recovery: WindowStats,
    pub target_recovery_time_seconds: f64,
    pub recovery_success: bool,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Primary,
    ReadPath,
}

pub struct FailoverSimulation {
    router: Arc<Router>,
    config: FailoverConfig,
}

impl FailoverSimulation {
    pub fn new(router: Arc<Router>, config: FailoverConfig) -> Self {
        Self { router, config }
    }

    /// Measure, fence the primary for `outage`, measure again, unfence.
    pub async fn run_failover_simulation(&self, outage: Duration, window: Duration) -> FailoverResult {
        tracing::info!(
            outage_secs = outage.as_secs_f64(),
            window_secs = window.as_secs_f64(),
            "Starting failover simulation"
        );

        let baseline = self.measure(Target::Primary, window).await;

        self.router.suspend_primary();
        let outage_start = Instant::now();
        tokio::time::sleep(outage).await;
        let recovery_time = outage_start.elapsed();

        let recovery = self.measure(Target::ReadPath, window).await;
        self.router.resume_primary();

        let impact = performance_impact_percent(baseline.avg_response_ms, recovery.avg_response_ms);
        let recovery_time_seconds = recovery_time.as_secs_f64();
        let target = self.config.target_recovery_secs as f64;
        let result = FailoverResult {
            recovery_time_seconds,
            baseline_qps: baseline.qps,
            recovery_qps: recovery.qps,
            performance_impact_percent: impact,
            quality_tier: classify_recovery(recovery_time_seconds, impact),
            baseline,
            recovery,
            target_recovery_time_seconds: target,
            recovery_success: recovery_time_seconds <= target,
        };

        tracing::info!(
            recovery_time_seconds = result.recovery_time_seconds,
            baseline_qps = result.baseline_qps,
            recovery_qps = result.recovery_qps,
            impact_percent = result.performance_impact_percent,
            quality = ?result.quality_tier,
            "Failover simulation finished"
        );
        result
    }

    async fn measure(&self, target: Target, window: Duration) -> WindowStats {
        let interval = Duration::from_millis(self.config.query_interval_ms);
        let start = Instant::now();
        let mut successful = 0u64;
        let mut errors = 0u64;
        let mut total_ms = 0.0;

        while start.elapsed() < window {
            let query_start = Instant::now();
            match self.query(target).await {
                Ok(()) => {
                    successful += 1;
                    total_ms += query_start.elapsed().as_secs_f64() * 1000.0;
                }
                Err(e) => {
                    errors += 1;
                    tracing::debug!(?target, error = %e, "Failover window query failed");
                }
            }
            tokio::time::sleep(interval).await;
        }

        let duration = start.elapsed().as_secs_f64();
        WindowStats {
            duration_seconds: duration,
            successful_queries: successful,
            errors,
            qps: if duration > 0.0 { successful as f64 / duration } else { 0.0 },
            avg_response_ms: if successful > 0 { total_ms / successful as f64 } else { 0.0 },
        }
    }

    async fn query(&self, target: Target) -> Result<(), RouterError> {
        let mut lease = match target {
            Target::Primary => self.router.acquire_write().await?,
            Target::ReadPath => self.router.acquire_read(None).await?,
        };
        if let Err(source) = lease.server_time().await {
            let node_id = lease.node_id().to_string();
            lease.discard();
            return Err(RouterError::Unreachable { node_id, source });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeRegistry;
    use crate::config::VerifierConfig;
    use crate::driver::SimulatedCluster;
    use crate::health::HealthStore;

    #[tokio::test(start_paused = true)]
    async fn test_failed_query_discards_session() {
        let config = VerifierConfig::local_pair();
        let sim = SimulatedCluster::new(&config.nodes, &config.simulation);
        let registry = NodeRegistry::register(config.nodes).unwrap();
        let health = Arc::new(HealthStore::new(&registry));
        let router = Arc::new(Router::new(registry, Arc::new(sim.clone()), health, &config.pool));
        let simulation = FailoverSimulation::new(router.clone(), config.failover);

        simulation.query(Target::Primary).await.unwrap();
        assert_eq!(router.pool("primary").unwrap().stats().idle_connections, 1);

        sim.set_down("primary", true);
        assert!(matches!(
            simulation.query(Target::Primary).await,
            Err(RouterError::Unreachable { .. })
        ));
        let stats = router.pool("primary").unwrap().stats();
        assert_eq!(stats.open_connections, 0);
        assert_eq!(stats.idle_connections, 0);
    }

    #[test]
    fn test_impact_percent() {
        assert!((performance_impact_percent(10.0, 11.0) - 10.0).abs() < 1e-9);
        assert!((performance_impact_percent(10.0, 9.0) - 10.0).abs() < 1e-9);
        assert_eq!(performance_impact_percent(0.0, 11.0), 0.0);
    }

    #[test]
    fn test_quality_tiers() {
        assert_eq!(classify_recovery(5.0, 10.0), RecoveryQuality::Excellent);
        assert_eq!(classify_recovery(30.0, 20.0), RecoveryQuality::Excellent);
        assert_eq!(classify_recovery(45.0, 10.0), RecoveryQuality::Good);
        assert_eq!(classify_recovery(5.0, 35.0), RecoveryQuality::Good);
        assert_eq!(classify_recovery(61.0, 5.0), RecoveryQuality::NeedsImprovement);
        assert_eq!(classify_recovery(5.0, 41.0), RecoveryQuality::NeedsImprovement);
    }
}
