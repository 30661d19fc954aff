// Monitor constants (No magic values)
use std::time::Duration;

/// Minute of the hour at which scheduled polls fire
pub const SCHEDULE_MINUTE: u32 = 30;

/// From this minute on, the current hour's slot is skipped and the next
/// hour's slot is used
pub const ROLLOVER_MINUTE: u32 = 29;

/// How often the wake detector compares wall-clock and monotonic time (30s)
pub const WAKE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Wall-clock drift beyond the check interval that counts as a sleep/wake (60s)
pub const WAKE_DRIFT_TOLERANCE: Duration = Duration::from_secs(60);

/// How often the settings file is checked for modification (5s)
pub const SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(5);
