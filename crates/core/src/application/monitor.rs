//! Monitor - the owning context for polling, scheduling and settings
//!
//! One `Monitor` is constructed per process. Its `run` loop is the single
//! control flow that owns the scheduler and the current settings; every
//! trigger (timer, wake, settings change, manual refresh) arrives as a
//! [`MonitorEvent`] on one channel.

use crate::application::coordinator::PollCoordinator;
use crate::application::scheduler::Scheduler;
use crate::application::shutdown::ShutdownToken;
use crate::application::staleness::StatusReport;
use crate::domain::{HostStatus, MonitorSettings, Snapshot};
use crate::error::Result;
use crate::port::{IdProvider, RemoteCommandRunner, TimeProvider};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Inputs to the monitor control loop
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Scheduled slot reached (ignored unless `generation` is current)
    TimerFired { generation: u64 },
    /// Host list or threshold changed
    SettingsChanged(MonitorSettings),
    /// Machine woke from sleep; timers armed before sleeping are unreliable
    SystemResumed,
    /// "Update now"
    RefreshRequested,
    /// A poll cycle finished (sent by the coordinator's completion callback)
    CycleCompleted(Arc<Snapshot>),
}

/// Cloneable handle for feeding events into a running monitor
#[derive(Clone)]
pub struct MonitorHandle {
    events: mpsc::UnboundedSender<MonitorEvent>,
}

impl MonitorHandle {
    /// Request an immediate poll cycle
    ///
    /// Returns false if the monitor has stopped.
    pub fn refresh(&self) -> bool {
        self.send(MonitorEvent::RefreshRequested)
    }

    pub fn update_settings(&self, settings: MonitorSettings) -> bool {
        self.send(MonitorEvent::SettingsChanged(settings))
    }

    pub fn system_resumed(&self) -> bool {
        self.send(MonitorEvent::SystemResumed)
    }

    pub fn send(&self, event: MonitorEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

pub struct Monitor {
    settings: MonitorSettings,
    coordinator: Arc<PollCoordinator>,
    scheduler: Scheduler,
    time_provider: Arc<dyn TimeProvider>,
    events_tx: mpsc::UnboundedSender<MonitorEvent>,
    events_rx: mpsc::UnboundedReceiver<MonitorEvent>,
    report: watch::Sender<Option<Arc<StatusReport>>>,
}

impl Monitor {
    /// Create a new monitor
    ///
    /// # Errors
    /// - AppError::Domain if `settings` fail validation
    pub fn new(
        settings: MonitorSettings,
        runner: Arc<dyn RemoteCommandRunner>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Result<Self> {
        settings.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let coordinator = Arc::new(PollCoordinator::new(
            runner,
            settings.remote_command(),
            Arc::clone(&time_provider),
            id_provider,
        ));
        let scheduler = Scheduler::new(Arc::clone(&time_provider), events_tx.clone());
        let (report, _) = watch::channel(None);

        Ok(Self {
            settings,
            coordinator,
            scheduler,
            time_provider,
            events_tx,
            events_rx,
            report,
        })
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            events: self.events_tx.clone(),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn coordinator(&self) -> Arc<PollCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.coordinator.subscribe_snapshots()
    }

    pub fn subscribe_cycle_state(&self) -> watch::Receiver<usize> {
        self.coordinator.subscribe_cycle_state()
    }

    pub fn subscribe_next_poll(&self) -> watch::Receiver<Option<NaiveDateTime>> {
        self.scheduler.subscribe_next_poll()
    }

    /// Classified view of each completed snapshot
    pub fn subscribe_reports(&self) -> watch::Receiver<Option<Arc<StatusReport>>> {
        self.report.subscribe()
    }

    /// Run the control loop until shutdown
    ///
    /// Starts with an immediate cycle and arms the scheduler.
    pub async fn run(mut self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(
            hosts = self.settings.hosts.len(),
            stale_after_days = self.settings.stale_after_days,
            "Monitor started"
        );

        self.start_cycle();
        self.rearm();

        loop {
            if shutdown.is_shutdown() {
                break;
            }

            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Monitor interrupted by shutdown");
                    break;
                }
                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                }
            }
        }

        self.scheduler.disarm();
        info!("Monitor stopped");
        Ok(())
    }

    fn handle_event(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::TimerFired { generation } => {
                if self.scheduler.accept_fire(generation) {
                    info!("Scheduled poll");
                    self.start_cycle();
                    self.rearm();
                }
            }
            MonitorEvent::SystemResumed => {
                info!("System resumed, polling and rescheduling");
                self.start_cycle();
                self.rearm();
            }
            MonitorEvent::SettingsChanged(settings) => self.apply_settings(settings),
            MonitorEvent::RefreshRequested => {
                info!("Manual refresh requested");
                self.start_cycle();
                if let Err(e) = self.scheduler.ensure_armed() {
                    error!(error = %e, "Failed to schedule next poll");
                }
            }
            MonitorEvent::CycleCompleted(snapshot) => self.publish_report(&snapshot),
        }
    }

    fn apply_settings(&mut self, settings: MonitorSettings) {
        if settings == self.settings {
            debug!("Settings unchanged, ignoring");
            return;
        }

        if let Err(e) = settings.validate() {
            warn!(error = %e, "Rejecting invalid settings, keeping previous ones");
            return;
        }

        info!(
            hosts = settings.hosts.len(),
            stale_after_days = settings.stale_after_days,
            "Settings changed"
        );
        self.coordinator.set_command(settings.remote_command());
        self.settings = settings;
        self.start_cycle();
    }

    fn start_cycle(&self) {
        let events = self.events_tx.clone();
        // Detached: completion comes back through the event channel
        let _ = self.coordinator.run_cycle(&self.settings.hosts, move |snapshot| {
            let _ = events.send(MonitorEvent::CycleCompleted(snapshot));
        });
    }

    /// A failed re-arm leaves the scheduler Idle until the next refresh,
    /// settings change or wake.
    fn rearm(&self) {
        if let Err(e) = self.scheduler.arm() {
            error!(error = %e, "Failed to schedule next poll; waiting for another trigger");
        }
    }

    /// Completion events from overlapping cycles can arrive out of
    /// publication order; only the latest published snapshot is reported.
    fn publish_report(&self, snapshot: &Snapshot) {
        if let Some(latest) = self.coordinator.latest_snapshot() {
            if latest.sequence > snapshot.sequence {
                debug!(cycle_id = %snapshot.cycle_id, "Skipping report for superseded cycle");
                return;
            }
        }

        let report = StatusReport::build(
            snapshot,
            &self.settings.hosts,
            self.settings.stale_after_days,
            self.time_provider.now_local(),
        );

        info!(
            cycle_id = %report.cycle_id,
            ok = report.count(HostStatus::Ok),
            stale = report.count(HostStatus::Stale),
            errors = report.count(HostStatus::Error),
            no_data = report.count(HostStatus::NoData),
            "Backup status updated"
        );

        self.report.send_replace(Some(Arc::new(report)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::shutdown::shutdown_channel;
    use crate::port::id_provider::UuidProvider;
    use crate::port::remote_runner::mocks::{MockBehavior, MockRemoteRunner};
    use crate::port::time_provider::mocks::MockTimeProvider;
    use chrono::NaiveDate;
    use std::time::Duration;

    const ALPHA_LISTING: &str = "/Volumes/TM/Backups.backupdb/alpha/2024-05-14-080000\n";

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 14)
            .unwrap()
            .and_hms_opt(10, 10, 0)
            .unwrap()
    }

    fn monitor(runner: Arc<MockRemoteRunner>, hosts: &[&str]) -> Monitor {
        Monitor::new(
            MonitorSettings::with_hosts(hosts.iter().copied()),
            runner,
            Arc::new(MockTimeProvider::new(now())),
            Arc::new(UuidProvider),
        )
        .unwrap()
    }

    async fn next_report(
        reports: &mut watch::Receiver<Option<Arc<StatusReport>>>,
    ) -> Arc<StatusReport> {
        tokio::time::timeout(Duration::from_secs(5), reports.changed())
            .await
            .expect("report within timeout")
            .expect("monitor alive");
        reports.borrow_and_update().clone().unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_settings() {
        let result = Monitor::new(
            MonitorSettings::with_hosts([""]),
            Arc::new(MockRemoteRunner::new()),
            Arc::new(MockTimeProvider::new(now())),
            Arc::new(UuidProvider),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_polls_immediately_and_arms() {
        let runner = Arc::new(MockRemoteRunner::new().with_host("alpha", MockBehavior::listing(ALPHA_LISTING)));
        let monitor = monitor(runner.clone(), &["alpha"]);
        let mut reports = monitor.subscribe_reports();
        let next_poll = monitor.subscribe_next_poll();
        let (shutdown_tx, shutdown_rx) = shutdown_channel();

        let task = tokio::spawn(monitor.run(shutdown_rx));
        let report = next_report(&mut reports).await;

        assert_eq!(report.hosts.len(), 1);
        assert_eq!(report.hosts[0].status, HostStatus::Ok);
        let expected = NaiveDate::from_ymd_opt(2024, 5, 14)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(*next_poll.borrow(), Some(expected));

        shutdown_tx.shutdown();
        task.await.unwrap().unwrap();
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_and_settings_change_trigger_cycles() {
        let runner = Arc::new(
            MockRemoteRunner::new()
                .with_host("alpha", MockBehavior::listing(ALPHA_LISTING))
                .with_host("beta", MockBehavior::failing(1, "Permission denied")),
        );
        let monitor = monitor(runner.clone(), &["alpha"]);
        let handle = monitor.handle();
        let mut reports = monitor.subscribe_reports();
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let task = tokio::spawn(monitor.run(shutdown_rx));

        next_report(&mut reports).await;

        assert!(handle.refresh());
        next_report(&mut reports).await;
        assert_eq!(runner.call_count(), 2);

        assert!(handle.update_settings(MonitorSettings::with_hosts(["beta", "alpha"])));
        let report = next_report(&mut reports).await;
        assert_eq!(report.hosts[0].host, "beta");
        assert_eq!(report.hosts[0].status, HostStatus::Error);
        assert_eq!(report.hosts[1].host, "alpha");

        shutdown_tx.shutdown();
        task.await.unwrap().unwrap();
        assert_eq!(runner.call_count(), 4);
    }

    #[tokio::test]
    async fn test_identical_settings_do_not_trigger_cycle() {
        let runner = Arc::new(MockRemoteRunner::new().with_host("alpha", MockBehavior::listing(ALPHA_LISTING)));
        let monitor = monitor(runner.clone(), &["alpha"]);
        let handle = monitor.handle();
        let mut reports = monitor.subscribe_reports();
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let task = tokio::spawn(monitor.run(shutdown_rx));

        next_report(&mut reports).await;
        handle.update_settings(MonitorSettings::with_hosts(["alpha"]));
        // refresh is handled after the settings event, so one more report means
        // the settings event produced no cycle of its own
        handle.refresh();
        next_report(&mut reports).await;

        shutdown_tx.shutdown();
        task.await.unwrap().unwrap();
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fire_polls_and_rearms() {
        let runner = Arc::new(MockRemoteRunner::new().with_host("alpha", MockBehavior::listing(ALPHA_LISTING)));
        let monitor = monitor(runner.clone(), &["alpha"]);
        let mut reports = monitor.subscribe_reports();
        let mut next_poll = monitor.subscribe_next_poll();
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let task = tokio::spawn(monitor.run(shutdown_rx));

        next_report(&mut reports).await;
        // 10:10 -> 10:30 slot, twenty virtual minutes later
        tokio::time::sleep(Duration::from_secs(21 * 60)).await;
        next_report(&mut reports).await;

        assert_eq!(runner.call_count(), 2);
        assert!(next_poll.borrow_and_update().is_some());

        shutdown_tx.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_system_resumed_polls_and_rearms() {
        let runner = Arc::new(MockRemoteRunner::new().with_host("alpha", MockBehavior::listing(ALPHA_LISTING)));
        let monitor = monitor(runner.clone(), &["alpha"]);
        let handle = monitor.handle();
        let coordinator = monitor.coordinator();
        let mut reports = monitor.subscribe_reports();
        let mut next_poll = monitor.subscribe_next_poll();
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let task = tokio::spawn(monitor.run(shutdown_rx));

        next_report(&mut reports).await;
        next_poll.borrow_and_update();

        handle.system_resumed();
        next_report(&mut reports).await;

        assert_eq!(runner.call_count(), 2);
        assert_eq!(coordinator.in_flight(), 0);
        assert!(next_poll.has_changed().unwrap());

        shutdown_tx.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_scheduler_disarmed_after_shutdown() {
        let runner = Arc::new(MockRemoteRunner::new());
        let monitor = monitor(runner, &[]);
        let next_poll = monitor.subscribe_next_poll();
        let (shutdown_tx, shutdown_rx) = shutdown_channel();

        shutdown_tx.shutdown();
        monitor.run(shutdown_rx).await.unwrap();

        assert_eq!(*next_poll.borrow(), None);
    }

    #[tokio::test]
    async fn test_late_completion_event_does_not_replace_newer_report() {
        let runner = Arc::new(MockRemoteRunner::new().with_host("alpha", MockBehavior::listing(ALPHA_LISTING)));
        let mut monitor = monitor(runner, &["alpha"]);
        let coordinator = monitor.coordinator();
        let reports = monitor.subscribe_reports();

        let older = coordinator.run_cycle_and_wait(&monitor.settings.hosts).await.unwrap();
        let newer = coordinator.run_cycle_and_wait(&monitor.settings.hosts).await.unwrap();

        monitor.handle_event(MonitorEvent::CycleCompleted(Arc::clone(&newer)));
        monitor.handle_event(MonitorEvent::CycleCompleted(older));

        let report = reports.borrow().clone().unwrap();
        assert_eq!(report.cycle_id, newer.cycle_id);
    }
}
