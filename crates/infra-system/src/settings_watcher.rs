// Settings file watcher
// Emits SettingsChanged when the settings file is modified
use std::time::{Duration, SystemTime};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::settings_loader::SettingsLoader;
use tmwatch_core::application::{MonitorHandle, ShutdownToken};
use tmwatch_core::domain::MonitorSettings;

/// Polls the settings file's modification time and reloads on change
///
/// Invalid files are reported and skipped; the monitor keeps its previous
/// settings until a valid file appears.
pub struct SettingsWatcher {
    loader: SettingsLoader,
    poll_interval: Duration,
    last_modified: Option<SystemTime>,
}

impl SettingsWatcher {
    pub fn new(loader: SettingsLoader, poll_interval: Duration) -> Self {
        let last_modified = modified_time(&loader);
        Self {
            loader,
            poll_interval,
            last_modified,
        }
    }

    /// Reload if the file changed since the last check
    pub fn check_once(&mut self) -> Option<MonitorSettings> {
        let current = modified_time(&self.loader);
        if current == self.last_modified {
            return None;
        }
        self.last_modified = current;

        match self.loader.load() {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!(error = %e, "Ignoring invalid settings file");
                None
            }
        }
    }

    /// Watch loop (background task)
    ///
    /// Returns when shutdown is signalled or the monitor has stopped.
    pub async fn run(mut self, handle: MonitorHandle, mut shutdown: ShutdownToken) {
        let Some(path) = self.loader.path().map(|p| p.to_path_buf()) else {
            info!("No settings file configured, settings watcher disabled");
            return;
        };

        info!(path = %path.display(), interval_secs = self.poll_interval.as_secs(), "Settings watcher started");

        let mut tick = interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.wait() => break,
            }

            if let Some(settings) = self.check_once() {
                info!(path = %path.display(), "Settings file changed");
                if !handle.update_settings(settings) {
                    break;
                }
            }
        }

        info!("Settings watcher stopped");
    }
}

fn modified_time(loader: &SettingsLoader) -> Option<SystemTime> {
    loader
        .path()
        .and_then(|p| std::fs::metadata(p).ok())
        .and_then(|m| m.modified().ok())
}
