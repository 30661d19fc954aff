//! Scheduler - wall-clock aligned poll timer
//!
//! Two states: `Idle` and `Armed`. Arming computes the next minute-30 slot
//! from the current local time and replaces any previously armed timer. When
//! the timer fires the monitor runs a cycle and arms again, always relative
//! to "now", so a long cycle or a missed tick never skips a slot
//! permanently.

use crate::application::constants::{ROLLOVER_MINUTE, SCHEDULE_MINUTE};
use crate::application::monitor::MonitorEvent;
use crate::port::TimeProvider;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Timelike};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("Cannot compute next poll time after {0}")]
    TargetOutOfRange(NaiveDateTime),

    #[error("Next poll time {0} does not exist in the local calendar or has already passed")]
    UnresolvableTarget(NaiveDateTime),
}

/// Next firing time strictly derived from `now`
///
/// Minute 30 of the current hour when the current minute is before 29,
/// otherwise minute 30 of the next hour (minute 29 itself rolls over).
pub fn next_fire_time(now: NaiveDateTime) -> Result<NaiveDateTime, SchedulingError> {
    let hour_start = now
        .date()
        .and_hms_opt(now.hour(), 0, 0)
        .ok_or(SchedulingError::TargetOutOfRange(now))?;

    let hours_ahead = if now.minute() < ROLLOVER_MINUTE { 0 } else { 1 };

    hour_start
        .checked_add_signed(ChronoDuration::hours(hours_ahead))
        .and_then(|t| t.checked_add_signed(ChronoDuration::minutes(i64::from(SCHEDULE_MINUTE))))
        .ok_or(SchedulingError::TargetOutOfRange(now))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed {
        target: NaiveDateTime,
        generation: u64,
    },
}

struct TimerSlot {
    state: SchedulerState,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

/// Scheduler owns at most one pending timer
///
/// Each arm bumps a generation number; the timer task reports its generation
/// when it fires and the scheduler only accepts the current one. A timer
/// that was replaced but had already fired therefore cannot start a second
/// cycle.
pub struct Scheduler {
    time_provider: Arc<dyn TimeProvider>,
    events: mpsc::UnboundedSender<MonitorEvent>,
    slot: Mutex<TimerSlot>,
    next_poll: watch::Sender<Option<NaiveDateTime>>,
}

impl Scheduler {
    pub fn new(
        time_provider: Arc<dyn TimeProvider>,
        events: mpsc::UnboundedSender<MonitorEvent>,
    ) -> Self {
        let (next_poll, _) = watch::channel(None);
        Self {
            time_provider,
            events,
            slot: Mutex::new(TimerSlot {
                state: SchedulerState::Idle,
                timer: None,
                generation: 0,
            }),
            next_poll,
        }
    }

    /// Compute the next slot and arm a one-shot timer for it
    ///
    /// Any previously armed timer is cancelled. On error the scheduler is
    /// left Idle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn arm(&self) -> Result<NaiveDateTime, SchedulingError> {
        let now = self.time_provider.now_local();
        let armed = next_fire_time(now).and_then(|target| {
            self.time_provider
                .duration_until(target)
                .map(|delay| (target, delay))
                .ok_or(SchedulingError::UnresolvableTarget(target))
        });

        let (target, delay) = match armed {
            Ok(armed) => armed,
            Err(e) => {
                self.disarm();
                return Err(e);
            }
        };

        let mut slot = self.lock_slot();
        if let Some(previous) = slot.timer.take() {
            previous.abort();
        }
        slot.generation += 1;
        let generation = slot.generation;

        let events = self.events.clone();
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(MonitorEvent::TimerFired { generation });
        }));
        slot.state = SchedulerState::Armed { target, generation };
        self.next_poll.send_replace(Some(target));

        info!(
            target = %target,
            delay_secs = delay.as_secs(),
            generation = generation,
            "Next poll scheduled"
        );
        Ok(target)
    }

    /// Arm only if no timer is pending
    pub fn ensure_armed(&self) -> Result<Option<NaiveDateTime>, SchedulingError> {
        if self.state() == SchedulerState::Idle {
            self.arm().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Consume a timer fire
    ///
    /// Returns true if `generation` is the currently armed timer; the
    /// scheduler moves to Idle. Fires from replaced timers return false.
    pub fn accept_fire(&self, generation: u64) -> bool {
        let mut slot = self.lock_slot();
        match slot.state {
            SchedulerState::Armed {
                generation: current,
                ..
            } if current == generation => {
                slot.state = SchedulerState::Idle;
                slot.timer = None;
                true
            }
            _ => {
                debug!(generation = generation, "Ignoring fire from a replaced timer");
                false
            }
        }
    }

    /// Cancel the pending timer, if any
    pub fn disarm(&self) {
        let mut slot = self.lock_slot();
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        slot.state = SchedulerState::Idle;
        self.next_poll.send_replace(None);
    }

    pub fn state(&self) -> SchedulerState {
        self.lock_slot().state
    }

    pub fn next_poll(&self) -> Option<NaiveDateTime> {
        *self.next_poll.borrow()
    }

    pub fn subscribe_next_poll(&self) -> watch::Receiver<Option<NaiveDateTime>> {
        self.next_poll.subscribe()
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, TimerSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.lock_slot().timer.take() {
            timer.abort();
        }
    }
}
