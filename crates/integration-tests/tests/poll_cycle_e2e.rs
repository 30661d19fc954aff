//! End-to-end poll cycle tests
//!
//! Drives the coordinator through the scripted runner and checks the
//! published snapshot plus its classification.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use tmwatch_core::application::{PollCoordinator, StatusReport};
use tmwatch_core::domain::{HostStatus, RemoteCommand};
use tmwatch_core::port::id_provider::UuidProvider;
use tmwatch_core::port::remote_runner::mocks::{MockBehavior, MockRemoteRunner};
use tmwatch_core::port::time_provider::mocks::MockTimeProvider;
use tmwatch_core::port::TimeProvider;

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 10)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn line(host: &str, at: NaiveDateTime) -> String {
    format!(
        "/Volumes/TM Backup/Backups.backupdb/{}/{}",
        host,
        at.format("%Y-%m-%d-%H%M%S")
    )
}

fn coordinator(runner: Arc<MockRemoteRunner>, clock: Arc<MockTimeProvider>) -> PollCoordinator {
    PollCoordinator::new(
        runner,
        RemoteCommand::default(),
        clock,
        Arc::new(UuidProvider),
    )
}

fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|h| h.to_string()).collect()
}

/// alpha lists two backups, beta is refused
///
/// "Yesterday" is 25 hours back: staleness is strictly greater than the
/// threshold, so a backup exactly 24 hours old is still Ok (covered by
/// `test_exact_threshold_is_ok`).
#[tokio::test]
async fn test_alpha_stale_beta_error() {
    let yesterday = now() - chrono::Duration::hours(25);
    let three_days_ago = now() - chrono::Duration::days(3);
    let listing = format!(
        "{}\n{}\n",
        line("alpha", three_days_ago),
        line("alpha", yesterday)
    );

    let runner = Arc::new(
        MockRemoteRunner::new()
            .with_host("alpha", MockBehavior::listing(listing))
            .with_host("beta", MockBehavior::failing(1, "Permission denied")),
    );
    let clock = Arc::new(MockTimeProvider::new(now()));
    let coordinator = coordinator(runner, clock.clone());
    let order = hosts(&["alpha", "beta"]);

    let snapshot = coordinator.run_cycle_and_wait(&order).await.unwrap();

    let alpha = snapshot.get("alpha").unwrap();
    assert_eq!(alpha.backups.len(), 2);
    assert_eq!(alpha.error_message, None);
    assert_eq!(alpha.latest_backup().unwrap().timestamp, yesterday);
    assert_eq!(alpha.latest_backup().unwrap().volume_name, "TM Backup");

    let beta = snapshot.get("beta").unwrap();
    assert!(beta.backups.is_empty());
    assert_eq!(beta.error_message.as_deref(), Some("Permission denied"));

    let report = StatusReport::build(&snapshot, &order, 1, clock.now_local());
    assert_eq!(report.hosts[0].host, "alpha");
    assert_eq!(report.hosts[0].status, HostStatus::Stale);
    assert_eq!(report.hosts[1].host, "beta");
    assert_eq!(report.hosts[1].status, HostStatus::Error);
    assert!(report.needs_attention());
}

/// Exactly one threshold old is still fresh
#[tokio::test]
async fn test_exact_threshold_is_ok() {
    let listing = line("alpha", now() - chrono::Duration::days(1));
    let runner = Arc::new(MockRemoteRunner::new().with_host("alpha", MockBehavior::listing(listing)));
    let clock = Arc::new(MockTimeProvider::new(now()));
    let order = hosts(&["alpha"]);

    let snapshot = coordinator(runner, clock.clone())
        .run_cycle_and_wait(&order)
        .await
        .unwrap();
    let report = StatusReport::build(&snapshot, &order, 1, clock.now_local());

    assert_eq!(report.hosts[0].status, HostStatus::Ok);
    assert!(!report.needs_attention());
}

#[tokio::test]
async fn test_every_configured_host_appears_once() {
    let runner = Arc::new(
        MockRemoteRunner::new()
            .with_host("alpha", MockBehavior::listing(""))
            .with_host("gamma", MockBehavior::listing(line("gamma", now()))),
    );
    let clock = Arc::new(MockTimeProvider::new(now()));
    // beta is unknown to the runner: transport failure
    let order = hosts(&["alpha", "beta", "gamma", "alpha"]);

    let snapshot = coordinator(runner.clone(), clock.clone())
        .run_cycle_and_wait(&order)
        .await
        .unwrap();

    assert_eq!(snapshot.len(), 3);
    assert_eq!(runner.call_count(), 3);

    let report = StatusReport::build(&snapshot, &order, 1, clock.now_local());
    let statuses: Vec<_> = report.hosts.iter().map(|h| (h.host.as_str(), h.status)).collect();
    assert_eq!(
        statuses,
        vec![
            ("alpha", HostStatus::NoData),
            ("beta", HostStatus::Error),
            ("gamma", HostStatus::Ok),
        ]
    );
    assert!(report.hosts[1]
        .error_message
        .as_deref()
        .unwrap()
        .contains("no route to host beta"));
}

/// Completion waits for the slowest host, not the sum of all hosts
#[tokio::test(start_paused = true)]
async fn test_cycle_latency_is_slowest_host() {
    let runner = Arc::new(
        MockRemoteRunner::new()
            .with_delayed_host("fast", MockBehavior::listing(""), Duration::from_secs(1))
            .with_delayed_host("medium", MockBehavior::listing(""), Duration::from_secs(5))
            .with_delayed_host("slow", MockBehavior::listing(""), Duration::from_secs(10)),
    );
    let clock = Arc::new(MockTimeProvider::new(now()));
    let coordinator = coordinator(runner, clock);
    let mut cycle_state = coordinator.subscribe_cycle_state();

    let started = tokio::time::Instant::now();
    let task = coordinator.run_cycle(&hosts(&["fast", "medium", "slow"]), |_| {});
    assert!(coordinator.is_updating());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(coordinator.is_updating(), "slow host still running");
    assert!(coordinator.latest_snapshot().is_none());

    let snapshot = task.await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(snapshot.len(), 3);
    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed < Duration::from_secs(11));
    assert!(!coordinator.is_updating());
    assert_eq!(*cycle_state.borrow_and_update(), 0);
}

#[tokio::test]
async fn test_panicking_host_does_not_lose_the_cycle() {
    let runner = Arc::new(
        MockRemoteRunner::new()
            .with_host("alpha", MockBehavior::listing(line("alpha", now())))
            .with_host("broken", MockBehavior::Panic("runner exploded".to_string())),
    );
    let clock = Arc::new(MockTimeProvider::new(now()));
    let coordinator = coordinator(runner, clock);

    let snapshot = coordinator
        .run_cycle_and_wait(&hosts(&["alpha", "broken"]))
        .await
        .unwrap();

    assert_eq!(snapshot.get("alpha").unwrap().backups.len(), 1);
    assert!(snapshot.get("broken").unwrap().is_error());
    assert_eq!(coordinator.in_flight(), 0);
}

#[tokio::test]
async fn test_report_serializes_for_cli_json() {
    let runner = Arc::new(
        MockRemoteRunner::new().with_host("alpha", MockBehavior::listing(line("alpha", now()))),
    );
    let clock = Arc::new(MockTimeProvider::new(now()));
    let order = hosts(&["alpha"]);

    let snapshot = coordinator(runner, clock.clone())
        .run_cycle_and_wait(&order)
        .await
        .unwrap();
    let report = StatusReport::build(&snapshot, &order, 1, clock.now_local());
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["stale_after_days"], 1);
    assert_eq!(json["hosts"][0]["host"], "alpha");
    assert_eq!(json["hosts"][0]["status"], "OK");
    assert_eq!(json["hosts"][0]["latest"]["volume_name"], "TM Backup");
}
