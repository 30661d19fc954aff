// Time Provider Port (for testability)

use chrono::{Local, NaiveDateTime, TimeZone};
use std::time::Duration;

/// Time provider interface (allows mocking in tests)
pub trait TimeProvider: Send + Sync {
    /// Get current time in milliseconds since epoch
    fn now_millis(&self) -> i64;

    /// Current local wall-clock time
    fn now_local(&self) -> NaiveDateTime;

    /// Real time remaining until the local wall-clock instant `target`
    ///
    /// Returns None if `target` is in the past or does not exist in the
    /// local calendar.
    fn duration_until(&self, target: NaiveDateTime) -> Option<Duration> {
        (target - self.now_local()).to_std().ok()
    }
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn now_local(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn duration_until(&self, target: NaiveDateTime) -> Option<Duration> {
        // Wall-clock targets inside a DST gap have no instant
        let target = Local.from_local_datetime(&target).earliest()?;
        target.signed_duration_since(Local::now()).to_std().ok()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Manually driven clock; local time is treated as UTC for `now_millis`
    pub struct MockTimeProvider {
        now: Mutex<NaiveDateTime>,
    }

    impl MockTimeProvider {
        pub fn new(now: NaiveDateTime) -> Self {
            Self {
                now: Mutex::new(now),
            }
        }

        pub fn set(&self, now: NaiveDateTime) {
            *self.now.lock().unwrap() = now;
        }

        pub fn advance(&self, by: chrono::Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl TimeProvider for MockTimeProvider {
        fn now_millis(&self) -> i64 {
            self.now.lock().unwrap().and_utc().timestamp_millis()
        }

        fn now_local(&self) -> NaiveDateTime {
            *self.now.lock().unwrap()
        }
    }
}
