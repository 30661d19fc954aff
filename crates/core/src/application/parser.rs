//! Backup listing parser
//!
//! Turns `tmutil listbackups` output into [`BackupRecord`]s. Each line is an
//! absolute backup path such as
//! `/Volumes/Drive/Backups.backupdb/studio/2016-11-15-164402`.

use crate::domain::BackupRecord;
use chrono::{NaiveDate, NaiveDateTime};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Volume name is the first path segment after `/Volumes/`; the date-time is
/// `YYYY-MM-DD-HHMMSS` with no separators between the time fields.
static BACKUP_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/Volumes/(.*?)/.*/(\d{4})-(\d{2})-(\d{2})-(\d{2})(\d{2})(\d{2})")
        .expect("BACKUP_LINE_REGEX is a valid regex pattern")
});

/// A line that did not yield a record
///
/// Never reported to end users: the parser logs it and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseAnomaly {
    #[error("Unknown line: {0}")]
    UnrecognizedLine(String),

    #[error("Invalid date-time in line: {0}")]
    InvalidDateTime(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BackupListingParser;

impl BackupListingParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a full listing
    ///
    /// Empty lines are skipped. Lines that fail to parse are dropped and
    /// logged. Records keep input line order.
    pub fn parse(&self, listing: &str) -> Vec<BackupRecord> {
        let mut records = Vec::new();

        for line in listing.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }

            match self.parse_line(line) {
                Ok(record) => records.push(record),
                Err(anomaly) => warn!(anomaly = %anomaly, "Dropping unparsable backup listing line"),
            }
        }

        debug!(records = records.len(), "Parsed backup listing");
        records
    }

    /// Parse one non-empty line
    pub fn parse_line(&self, line: &str) -> Result<BackupRecord, ParseAnomaly> {
        let caps = BACKUP_LINE_REGEX
            .captures(line)
            .ok_or_else(|| ParseAnomaly::UnrecognizedLine(line.to_string()))?;

        let timestamp = decode_timestamp(&caps)
            .ok_or_else(|| ParseAnomaly::InvalidDateTime(line.to_string()))?;

        Ok(BackupRecord::new(&caps[1], timestamp))
    }
}

/// Build a wall-clock timestamp from capture groups 2..=7
///
/// Returns None for impossible calendar values; nothing is clamped or defaulted.
fn decode_timestamp(caps: &Captures<'_>) -> Option<NaiveDateTime> {
    let field = |i: usize| caps[i].parse::<u32>().ok();

    let year = caps[2].parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(3)?, field(4)?)?;
    date.and_hms_opt(field(5)?, field(6)?, field(7)?)
}
