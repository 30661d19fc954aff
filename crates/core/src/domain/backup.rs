// Backup Domain Model

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Host identifier (ssh destination, e.g. `admin@studio.local`)
pub type HostId = String;

/// A single backup found in a host's listing
///
/// `timestamp` is the wall-clock value encoded in the backup path. It is not
/// converted to any timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub volume_name: String,
    pub timestamp: NaiveDateTime,
}

impl BackupRecord {
    pub fn new(volume_name: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            volume_name: volume_name.into(),
            timestamp,
        }
    }
}

/// Outcome of polling one host in one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResult {
    pub host: HostId,
    /// Records in listing order (not sorted by recency)
    pub backups: Vec<BackupRecord>,
    /// Set when the transport failed or the remote command exited non-zero.
    /// May be an empty string (remote wrote nothing to stderr).
    pub error_message: Option<String>,
}

impl HostResult {
    /// Successful listing (possibly empty)
    pub fn success(host: impl Into<HostId>, backups: Vec<BackupRecord>) -> Self {
        Self {
            host: host.into(),
            backups,
            error_message: None,
        }
    }

    /// Failed poll: never carries backups
    pub fn failure(host: impl Into<HostId>, message: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            backups: Vec::new(),
            error_message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }

    /// Most recent backup by timestamp (ties resolved arbitrarily)
    pub fn latest_backup(&self) -> Option<&BackupRecord> {
        self.backups.iter().max_by_key(|b| b.timestamp)
    }
}

/// Complete result of one poll cycle
///
/// Published as `Arc<Snapshot>` and never mutated after publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub cycle_id: String,
    /// Publication order, starting at 1; 0 until published
    #[serde(default)]
    pub sequence: u64,
    pub completed_at: i64, // epoch ms
    pub hosts: HashMap<HostId, HostResult>,
}

impl Snapshot {
    pub fn new(cycle_id: impl Into<String>, completed_at: i64, results: Vec<HostResult>) -> Self {
        Self {
            cycle_id: cycle_id.into(),
            sequence: 0,
            completed_at,
            hosts: results.into_iter().map(|r| (r.host.clone(), r)).collect(),
        }
    }

    pub fn get(&self, host: &str) -> Option<&HostResult> {
        self.hosts.get(host)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Results in display order
    ///
    /// Hosts are sorted by their index in `host_order`. Hosts missing from
    /// `host_order` (e.g. removed since the cycle started) sort last, by name.
    pub fn ordered<'a>(&'a self, host_order: &[HostId]) -> Vec<&'a HostResult> {
        let mut results: Vec<&HostResult> = self.hosts.values().collect();
        results.sort_by(|a, b| {
            let rank = |host: &str| {
                host_order
                    .iter()
                    .position(|h| h == host)
                    .unwrap_or(usize::MAX)
            };
            rank(&a.host)
                .cmp(&rank(&b.host))
                .then_with(|| a.host.cmp(&b.host))
        });
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_latest_backup_picks_max_timestamp() {
        let result = HostResult::success(
            "alpha",
            vec![
                BackupRecord::new("Drive", at(2, 10)),
                BackupRecord::new("Drive", at(5, 9)),
                BackupRecord::new("Other", at(4, 23)),
            ],
        );

        let latest = result.latest_backup().unwrap();
        assert_eq!(latest.timestamp, at(5, 9));
        assert_eq!(latest.volume_name, "Drive");
    }

    #[test]
    fn test_failure_has_no_backups() {
        let result = HostResult::failure("beta", "");
        assert!(result.is_error());
        assert!(result.backups.is_empty());
        assert_eq!(result.error_message.as_deref(), Some(""));
        assert!(result.latest_backup().is_none());
    }

    #[test]
    fn test_ordered_follows_host_config_with_unknown_last() {
        let snapshot = Snapshot::new(
            "cycle",
            0,
            vec![
                HostResult::success("zulu", vec![]),
                HostResult::success("removed-b", vec![]),
                HostResult::success("alpha", vec![]),
                HostResult::success("removed-a", vec![]),
            ],
        );
        let order = vec!["zulu".to_string(), "alpha".to_string()];

        let hosts: Vec<&str> = snapshot
            .ordered(&order)
            .iter()
            .map(|r| r.host.as_str())
            .collect();

        assert_eq!(hosts, vec!["zulu", "alpha", "removed-a", "removed-b"]);
    }
}
