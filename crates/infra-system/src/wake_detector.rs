// Sleep/wake detection
// Monotonic time does not advance while the machine sleeps; wall-clock time does
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use tmwatch_core::application::{MonitorHandle, ShutdownToken};
use tmwatch_core::port::TimeProvider;

/// Detects system resume by comparing wall-clock and monotonic progress
///
/// A forward wall-clock jump (sleep, or a manual clock change) larger than
/// `tolerance` reports a resume, which makes the monitor poll and
/// recompute its schedule.
pub struct WakeDetector {
    time_provider: Arc<dyn TimeProvider>,
    check_interval: Duration,
    tolerance: Duration,
    last_wall_millis: i64,
    last_mono: Instant,
}

impl WakeDetector {
    pub fn new(
        time_provider: Arc<dyn TimeProvider>,
        check_interval: Duration,
        tolerance: Duration,
    ) -> Self {
        let last_wall_millis = time_provider.now_millis();
        Self {
            time_provider,
            check_interval,
            tolerance,
            last_wall_millis,
            last_mono: Instant::now(),
        }
    }

    /// Record a sample; returns true if a sleep happened since the last one
    pub fn observe(&mut self, wall_millis: i64, mono: Instant) -> bool {
        let wall_elapsed = wall_millis - self.last_wall_millis;
        let mono_elapsed = mono.saturating_duration_since(self.last_mono);

        self.last_wall_millis = wall_millis;
        self.last_mono = mono;

        let drift_millis = wall_elapsed - mono_elapsed.as_millis() as i64;
        if drift_millis > self.tolerance.as_millis() as i64 {
            info!(drift_secs = drift_millis / 1000, "Wall clock jumped ahead, assuming system resumed");
            true
        } else {
            debug!(drift_millis = drift_millis, "No resume detected");
            false
        }
    }

    /// Detection loop (background task)
    pub async fn run(mut self, handle: MonitorHandle, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.check_interval.as_secs(),
            tolerance_secs = self.tolerance.as_secs(),
            "Wake detector started"
        );

        let mut tick = interval(self.check_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.wait() => break,
            }

            let wall = self.time_provider.now_millis();
            if self.observe(wall, Instant::now()) && !handle.system_resumed() {
                break;
            }
        }

        info!("Wake detector stopped");
    }
}
