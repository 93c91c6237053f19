//! End-to-end failover through real HTTP health checks.

use std::sync::Arc;
use std::time::Duration;

use model_router::config::HealthCheckConfig;
use model_router::health::HttpProbe;
use model_router::registry::InstanceId;
use model_router::routing::{ChangeReason, RoutingController, RoutingSettings};

mod common;
use common::{wait_until, HealthBackend};

fn settings() -> RoutingSettings {
    RoutingSettings {
        health_threshold: 50.0,
        max_failures: 3,
        health_checks_enabled: true,
        check_interval: Duration::from_millis(50),
        rotation_interval: Duration::from_secs(3600),
        failover_poll_interval: Duration::from_secs(3600),
    }
}

fn probe() -> Arc<HttpProbe> {
    let config = HealthCheckConfig {
        timeout_ms: 40,
        ..HealthCheckConfig::default()
    };
    Arc::new(HttpProbe::new(&config).unwrap())
}

/// Start the loops first so the immediate rotation tick sees no instances.
async fn started_controller() -> Arc<RoutingController> {
    let controller = RoutingController::new(settings(), probe());
    controller.start().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    controller
}

#[tokio::test]
async fn test_failover_to_healthy_instance() {
    let a = HealthBackend::start(90.0).await;
    let b = HealthBackend::start(80.0).await;

    let controller = started_controller().await;
    let mut changes = controller.subscribe();
    controller
        .sync_instances(vec![a.instance("a", 90.0), b.instance("b", 80.0)])
        .await;

    let first = controller.current_instance().expect("an instance is selected");
    let (degraded, standby) = if first.id.as_str() == "a" { (&a, "b") } else { (&b, "a") };

    // Let both monitors report before degrading the active one.
    assert!(wait_until(Duration::from_secs(2), || a.hits() > 1 && b.hits() > 1).await);
    degraded.set_score(20.0);

    let switched = wait_until(Duration::from_secs(3), || {
        controller.current_instance().map(|i| i.id.as_str() == standby).unwrap_or(false)
    })
    .await;
    assert!(switched, "traffic should move to {}", standby);

    let mut saw_failover = false;
    while let Ok(change) = changes.try_recv() {
        if change.reason == ChangeReason::Failover {
            assert_eq!(change.current.unwrap().id.as_str(), standby);
            saw_failover = true;
        }
    }
    assert!(saw_failover);
    assert_eq!(controller.status().consecutive_failures, 0);

    controller.stop().await;
}

#[tokio::test]
async fn test_outage_then_recovery() {
    let a = HealthBackend::start(90.0).await;

    let controller = started_controller().await;
    controller.sync_instances(vec![a.instance("a", 90.0)]).await;
    assert_eq!(controller.current_instance().unwrap().id.as_str(), "a");

    a.set_score(10.0);
    assert!(wait_until(Duration::from_secs(3), || controller.current_instance().is_none()).await);
    assert_eq!(controller.status().failover_state, "failed");

    a.set_score(95.0);
    let recovered = wait_until(Duration::from_secs(3), || {
        controller.current_instance().map(|i| i.id.as_str() == "a").unwrap_or(false)
    })
    .await;
    assert!(recovered);

    controller.stop().await;
}

#[tokio::test]
async fn test_removed_instance_stops_monitoring() {
    let a = HealthBackend::start(90.0).await;
    let b = HealthBackend::start(90.0).await;

    let controller = started_controller().await;
    controller
        .sync_instances(vec![a.instance("a", 90.0), b.instance("b", 90.0)])
        .await;
    assert_eq!(controller.status().monitors, 2);
    assert!(wait_until(Duration::from_secs(2), || b.hits() > 0).await);

    controller.sync_instances(vec![a.instance("a", 90.0)]).await;
    assert_eq!(controller.status().monitors, 1);
    assert_eq!(controller.current_instance().unwrap().id.as_str(), "a");
    assert!(!controller.health_snapshot().contains_key(&InstanceId::from("b")));

    // Requests already on the wire may still land.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let b_hits = b.hits();
    let a_hits = a.hits();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(b.hits(), b_hits);
    assert!(a.hits() > a_hits);

    controller.stop().await;
}

#[tokio::test]
async fn test_stop_cancels_every_monitor() {
    let a = HealthBackend::start(90.0).await;
    let b = HealthBackend::start(70.0).await;

    let controller = started_controller().await;
    controller
        .sync_instances(vec![a.instance("a", 90.0), b.instance("b", 70.0)])
        .await;
    assert!(wait_until(Duration::from_secs(2), || a.hits() > 0 && b.hits() > 0).await);

    tokio::time::timeout(Duration::from_secs(2), controller.stop())
        .await
        .expect("stop completes");
    assert_eq!(controller.status().monitors, 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let hits = a.hits() + b.hits();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(a.hits() + b.hits(), hits);

    // A stopped controller ignores further snapshots.
    controller.sync_instances(vec![a.instance("a", 90.0)]).await;
    assert_eq!(controller.status().monitors, 0);
}
