//! tmwatchd - Time Machine backup monitor
//! Polls every configured host on a schedule and logs each host's freshness

mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use tmwatch_core::application::constants::{
    SETTINGS_POLL_INTERVAL, WAKE_CHECK_INTERVAL, WAKE_DRIFT_TOLERANCE,
};
use tmwatch_core::application::{shutdown_channel, Monitor, StatusReport};
use tmwatch_core::domain::HostStatus;
use tmwatch_core::port::id_provider::UuidProvider;
use tmwatch_core::port::time_provider::SystemTimeProvider;
use tmwatch_core::port::TimeProvider;
use tmwatch_infra_system::{
    resolve_config_path, SettingsLoader, SettingsWatcher, SshCommandRunner, WakeDetector,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LOG_FILE_PREFIX: &str = "tmwatchd.log";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (guard must outlive main for file output)
    let _log_guard = init_tracing()?;

    info!("tmwatch v{} starting...", VERSION);

    // 2. Load settings
    let loader = SettingsLoader::new(resolve_config_path(None));
    match loader.path() {
        Some(path) => info!(path = %path.display(), "Loading settings"),
        None => warn!("No config directory found, using defaults and environment"),
    }
    let settings = loader.load().context("Failed to load settings")?;

    if settings.hosts.is_empty() {
        warn!("No hosts configured; cycles will produce empty snapshots");
    }

    // 3. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let runner = Arc::new(SshCommandRunner::new(
        settings.ssh_program.clone(),
        settings.ssh_options.clone(),
        Arc::clone(&time_provider),
    ));

    let monitor = Monitor::new(
        settings,
        runner,
        Arc::clone(&time_provider),
        Arc::new(UuidProvider),
    )
    .context("Failed to create monitor")?;

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let handle = monitor.handle();

    // 4. Report logger: one line per host after each cycle
    let mut reports = monitor.subscribe_reports();
    tokio::spawn(async move {
        while reports.changed().await.is_ok() {
            let report = reports.borrow_and_update().clone();
            if let Some(report) = report {
                log_report(&report);
            }
        }
    });

    // 5. Background watchers
    let watcher = SettingsWatcher::new(loader, SETTINGS_POLL_INTERVAL);
    tokio::spawn(watcher.run(handle.clone(), shutdown_rx.clone()));

    let detector = WakeDetector::new(
        Arc::clone(&time_provider),
        WAKE_CHECK_INTERVAL,
        WAKE_DRIFT_TOLERANCE,
    );
    tokio::spawn(detector.run(handle, shutdown_rx.clone()));

    // 6. Start the monitor loop
    let mut monitor_handle = tokio::spawn(monitor.run(shutdown_rx));

    info!("Monitor running. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal (or an unexpected monitor exit)
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Shutdown signal received. Exiting gracefully...");
        }
        result = &mut monitor_handle => {
            match result {
                Ok(Ok(())) => warn!("Monitor exited unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "Monitor failed"),
                Err(e) => error!(error = %e, "Monitor task panicked"),
            }
            shutdown_tx.shutdown();
            return Ok(());
        }
    }

    // 8. Graceful shutdown
    shutdown_tx.shutdown();
    if tokio::time::timeout(SHUTDOWN_GRACE, monitor_handle)
        .await
        .is_err()
    {
        warn!("Monitor did not stop within the grace period");
    }

    info!("Shutdown complete.");

    Ok(())
}

/// Install the global subscriber
///
/// `TMWATCH_LOG_FORMAT=json` selects JSON output, anything else pretty.
/// `TMWATCH_LOG_DIR` redirects output to a daily rolling file.
fn init_tracing() -> Result<Option<WorkerGuard>> {
    let json = std::env::var("TMWATCH_LOG_FORMAT")
        .map(|f| f == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("tmwatch=info"))
        .context("Failed to create env filter")?;

    let (writer, guard) = match std::env::var("TMWATCH_LOG_DIR") {
        Ok(dir) => {
            let dir = shellexpand::tilde(&dir).into_owned();
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        Err(_) => (None, None),
    };

    let fmt_layer = match (json, writer) {
        // Production: JSON structured logging
        (true, Some(writer)) => fmt::layer().json().with_writer(writer).boxed(),
        (true, None) => fmt::layer().json().boxed(),
        (false, Some(writer)) => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
        // Development: pretty formatting with colors
        (false, None) => fmt::layer().pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(telemetry::layer())
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn log_report(report: &StatusReport) {
    for row in &report.hosts {
        let latest = row
            .latest
            .as_ref()
            .map(|b| b.timestamp.to_string())
            .unwrap_or_default();
        let volume = row
            .latest
            .as_ref()
            .map(|b| b.volume_name.as_str())
            .unwrap_or_default();

        match row.status {
            HostStatus::Ok => {
                info!(host = %row.host, latest = %latest, volume = %volume, "Backup is current")
            }
            HostStatus::Stale => warn!(
                host = %row.host,
                latest = %latest,
                volume = %volume,
                stale_after_days = report.stale_after_days,
                "Backup is stale"
            ),
            HostStatus::NoData => warn!(host = %row.host, "Host reported no backups"),
            HostStatus::Error => warn!(
                host = %row.host,
                error = %row.error_message.as_deref().unwrap_or_default().trim(),
                "Host could not be polled"
            ),
        }
    }
}
