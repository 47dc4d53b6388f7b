//! replica-verifier
//!
//! Runs the verification suites against a cluster and prints the run report
//! as JSON.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────┐     ┌───────────────┐     ┌──────────────────────┐
//!   │ health       │────▶│ routing       │────▶│ load_balancer        │
//!   │ prober       │     │ read / write  │     │ weighted + pools     │
//!   └──────────────┘     └───────┬───────┘     └──────────┬───────────┘
//!                                │                        │
//!          ┌─────────────────────┼────────────────┐       ▼
//!          ▼                     ▼                ▼   ┌────────┐
//!   ┌──────────────┐     ┌───────────────┐ ┌─────────┐│ driver │
//!   │ verification │     │ resilience    │ │ perf    ││ (sim)  │
//!   │ canary / lag │     │ cap/fail/soak │ │ load    │└────────┘
//!   └──────────────┘     └───────────────┘ └─────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use replica_verifier::config::load_config;
use replica_verifier::observability::{logging, metrics};
use replica_verifier::{Cluster, SimulatedCluster, SuiteSelection, TestRunner, VerifierConfig};

#[derive(Parser)]
#[command(name = "replica-verifier")]
#[command(about = "Routing, consistency and resilience checks for a primary/replica cluster", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults to a local primary/replica pair.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Suites to run.
    #[arg(short, long, value_enum, default_value_t = SuiteSelection::All)]
    suite: SuiteSelection,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => VerifierConfig::local_pair(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(
        nodes = config.nodes.len(),
        suite = ?cli.suite,
        "replica-verifier v0.1.0 starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let backend = SimulatedCluster::new(&config.nodes, &config.simulation);
    let cluster = Cluster::start(config, Arc::new(backend)).await?;
    let runner = TestRunner::new(&cluster);

    let report = tokio::select! {
        report = runner.run(cli.suite) => Some(report),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, skipping remaining suites");
            None
        }
    };

    if let Some(report) = report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    cluster.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
