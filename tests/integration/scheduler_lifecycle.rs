//! Scheduler lifecycle: worker install/remove, live updates, manual
//! triggers, and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use sentinel::alerts::AlertManager;
use sentinel::config::{AlertsConfig, RetentionConfig};
use sentinel::scheduler::{Scheduler, SchedulerConfig};
use sentinel::storage::models::{CheckInput, Verdict};
use sentinel::storage::{MemoryStorage, Storage};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::helpers::{fast_prober, wait_for};

fn scheduler_for(storage: Arc<MemoryStorage>) -> Scheduler {
    let alerter = Arc::new(AlertManager::with_senders(
        AlertsConfig::default(),
        storage.clone(),
        Vec::new(),
    ));
    Scheduler::new(
        storage,
        alerter,
        SchedulerConfig {
            consecutive_failures: 2,
            retention: RetentionConfig::default(),
        },
    )
    .with_prober(fast_prober())
}

async fn mock_200_server() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    mock_server
}

#[tokio::test]
async fn start_installs_workers_for_enabled_checks_only() {
    let mock_server = mock_200_server().await;
    let storage = Arc::new(MemoryStorage::new());

    storage
        .create_check(
            &CheckInput {
                name: "enabled".to_string(),
                url: mock_server.uri(),
                interval_seconds: 3600,
                ..Default::default()
            }
            .into_check(),
        )
        .await
        .unwrap();
    storage
        .create_check(
            &CheckInput {
                name: "disabled".to_string(),
                url: mock_server.uri(),
                interval_seconds: 3600,
                enabled: Some(false),
                ..Default::default()
            }
            .into_check(),
        )
        .await
        .unwrap();

    let scheduler = scheduler_for(storage.clone());
    scheduler.start().await.unwrap();

    assert_eq!(scheduler.worker_count().await, 1);

    scheduler.stop().await;
    assert_eq!(scheduler.worker_count().await, 0);
}

#[tokio::test]
async fn disabling_a_check_removes_its_worker() {
    let mock_server = mock_200_server().await;
    let storage = Arc::new(MemoryStorage::new());

    let mut check = storage
        .create_check(
            &CheckInput {
                name: "toggled".to_string(),
                url: mock_server.uri(),
                interval_seconds: 3600,
                ..Default::default()
            }
            .into_check(),
        )
        .await
        .unwrap();

    let scheduler = scheduler_for(storage.clone());
    scheduler.start().await.unwrap();
    assert_eq!(scheduler.worker_count().await, 1);

    check.enabled = false;
    storage.update_check(&check).await.unwrap();
    scheduler.update_check(check.clone()).await;

    let removed = wait_for(Duration::from_secs(2), || async {
        scheduler.worker_count().await == 0
    })
    .await;
    assert!(removed, "worker should be gone after disabling");

    check.enabled = true;
    storage.update_check(&check).await.unwrap();
    scheduler.update_check(check).await;
    assert_eq!(scheduler.worker_count().await, 1);

    scheduler.stop().await;
}

#[tokio::test]
async fn worker_probes_on_its_interval() {
    let mock_server = mock_200_server().await;
    let storage = Arc::new(MemoryStorage::new());

    let check = storage
        .create_check(
            &CheckInput {
                name: "ticking".to_string(),
                url: mock_server.uri(),
                interval_seconds: 1,
                ..Default::default()
            }
            .into_check(),
        )
        .await
        .unwrap();

    let scheduler = scheduler_for(storage.clone());
    scheduler.start().await.unwrap();

    // Jitter is under a second, so the immediate probe plus at least one
    // periodic tick must land within the deadline.
    let storage_ref = storage.clone();
    let ticked = wait_for(Duration::from_secs(5), || {
        let storage = storage_ref.clone();
        async move { storage.results(check.id, 10, 0).await.unwrap().len() >= 2 }
    })
    .await;
    assert!(ticked, "expected at least two results from the worker loop");

    scheduler.stop().await;
}

#[tokio::test]
async fn worker_exits_when_its_check_vanishes() {
    let mock_server = mock_200_server().await;
    let storage = Arc::new(MemoryStorage::new());

    let check = storage
        .create_check(
            &CheckInput {
                name: "doomed".to_string(),
                url: mock_server.uri(),
                interval_seconds: 1,
                ..Default::default()
            }
            .into_check(),
        )
        .await
        .unwrap();

    let scheduler = scheduler_for(storage.clone());
    scheduler.start().await.unwrap();
    assert_eq!(scheduler.worker_count().await, 1);

    storage.delete_check(check.id).await.unwrap();

    let exited = wait_for(Duration::from_secs(5), || async {
        scheduler.worker_count().await == 0
    })
    .await;
    assert!(exited, "worker should exit after its check is deleted");

    scheduler.stop().await;
}

#[tokio::test]
async fn trigger_runs_outside_the_schedule() {
    let mock_server = mock_200_server().await;
    let storage = Arc::new(MemoryStorage::new());

    let check = storage
        .create_check(
            &CheckInput {
                name: "manual".to_string(),
                url: mock_server.uri(),
                interval_seconds: 3600,
                ..Default::default()
            }
            .into_check(),
        )
        .await
        .unwrap();

    // No worker installed; trigger works regardless.
    let scheduler = scheduler_for(storage.clone());

    let response = scheduler.trigger_check(check.id).await.unwrap();
    assert_eq!(response.status_code, 200);

    let latest = storage.latest_result(check.id).await.unwrap().unwrap();
    assert_eq!(latest.verdict, Verdict::Up);

    assert!(scheduler.trigger_check(999).await.is_err());
}
