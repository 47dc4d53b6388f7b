//! Read/write routing against a simulated cluster.

use std::collections::HashMap;
use std::time::Duration;

use replica_verifier::config::NodeRole;

mod common;

#[tokio::test(start_paused = true)]
async fn test_all_replicas_unhealthy_reads_from_primary() {
    let h = common::harness(common::cluster_config(2));
    h.sim.set_down("replica-1", true);
    h.sim.set_down("replica-2", true);
    h.prober.probe(true).await;

    let lease = h.router.acquire_read(None).await.unwrap();
    assert_eq!(lease.role(), NodeRole::Primary);
    assert_eq!(h.router.degraded_reads(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_weighted_reads_follow_latency_tiers() {
    let h = common::harness(common::cluster_config(2));
    h.sim.set_latency("replica-1", Duration::from_millis(30));
    h.sim.set_latency("replica-2", Duration::from_millis(150));
    let snapshot = h.prober.probe(true).await;
    assert_eq!(snapshot.weight("replica-1"), 1.2);
    assert_eq!(snapshot.weight("replica-2"), 0.8);

    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..2000 {
        let node = h.router.select_replica(None).unwrap();
        *counts.entry(node.id.clone()).or_default() += 1;
    }
    let share = counts["replica-1"] as f64 / 2000.0;
    assert!((share - 0.6).abs() < 0.05, "replica-1 share was {share}");
    assert!(!counts.contains_key("primary"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_replica_leaves_rotation_and_returns() {
    let h = common::harness(common::cluster_config(2));
    h.sim.set_down("replica-2", true);
    h.prober.probe(true).await;

    for _ in 0..50 {
        let lease = h.router.acquire_read(None).await.unwrap();
        assert_eq!(lease.node_id(), "replica-1");
    }

    h.sim.set_down("replica-2", false);
    h.prober.probe(true).await;
    let mut seen_replica_2 = false;
    for _ in 0..50 {
        let lease = h.router.acquire_read(None).await.unwrap();
        seen_replica_2 |= lease.node_id() == "replica-2";
    }
    assert!(seen_replica_2);
    assert_eq!(h.router.degraded_reads(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pool_never_exceeds_max() {
    let mut config = common::cluster_config(1);
    config.pool.min_connections = 0;
    config.pool.max_connections = 2;
    let h = common::harness(config);

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let router = h.router.clone();
        let sim = h.sim.clone();
        tasks.push(tokio::spawn(async move {
            let mut lease = router.acquire_write().await.unwrap();
            assert!(sim.open_connections("primary") <= 2);
            lease.ping().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            router.release(lease);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stats = &h.router.connection_stats()[0];
    assert!(stats.pool.open_connections <= 2);
    assert_eq!(stats.pool.leased_connections, 0);
}

#[tokio::test(start_paused = true)]
async fn test_connection_stats_serialize() {
    let h = common::harness(common::cluster_config(1));
    let _lease = h.router.acquire_write().await.unwrap();

    let json = serde_json::to_value(h.router.connection_stats()).unwrap();
    assert_eq!(json[0]["node_id"], "primary");
    assert_eq!(json[0]["role"], "primary");
    assert_eq!(json[0]["leased_connections"], 1);
    assert_eq!(json[1]["healthy"], true);
}
