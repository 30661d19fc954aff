// Staleness Evaluator - classifies hosts for presentation

use crate::domain::{BackupRecord, HostId, HostResult, HostStatus, Snapshot};
use chrono::NaiveDateTime;
use serde::Serialize;

const SECONDS_PER_DAY: i64 = 86_400;

/// Classify one host result
///
/// - Error: the poll failed (regardless of any backup ages)
/// - NoData: the poll succeeded but listed no backups
/// - Stale: `now - newest backup > threshold_days` (strictly greater)
/// - Ok: otherwise
pub fn classify(result: &HostResult, threshold_days: u32, now: NaiveDateTime) -> HostStatus {
    if result.is_error() {
        return HostStatus::Error;
    }

    let Some(latest) = result.latest_backup() else {
        return HostStatus::NoData;
    };

    let age_secs = (now - latest.timestamp).num_seconds();
    if age_secs > i64::from(threshold_days) * SECONDS_PER_DAY {
        HostStatus::Stale
    } else {
        HostStatus::Ok
    }
}

/// One presentation row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostReport {
    pub host: HostId,
    pub status: HostStatus,
    pub latest: Option<BackupRecord>,
    pub error_message: Option<String>,
}

/// Classifies every host of a snapshot against a fixed threshold
#[derive(Debug, Clone, Copy)]
pub struct StalenessEvaluator {
    threshold_days: u32,
}

impl StalenessEvaluator {
    pub fn new(threshold_days: u32) -> Self {
        Self { threshold_days }
    }

    pub fn threshold_days(&self) -> u32 {
        self.threshold_days
    }

    pub fn classify(&self, result: &HostResult, now: NaiveDateTime) -> HostStatus {
        classify(result, self.threshold_days, now)
    }

    /// Rows for every host in `snapshot`, in `host_order` display order
    pub fn evaluate(
        &self,
        snapshot: &Snapshot,
        host_order: &[HostId],
        now: NaiveDateTime,
    ) -> Vec<HostReport> {
        snapshot
            .ordered(host_order)
            .into_iter()
            .map(|result| HostReport {
                host: result.host.clone(),
                status: self.classify(result, now),
                latest: result.latest_backup().cloned(),
                error_message: result.error_message.clone(),
            })
            .collect()
    }
}

/// Presentation-ready view of one snapshot
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub cycle_id: String,
    pub completed_at: i64, // epoch ms
    pub stale_after_days: u32,
    pub hosts: Vec<HostReport>,
}

impl StatusReport {
    pub fn build(
        snapshot: &Snapshot,
        host_order: &[HostId],
        stale_after_days: u32,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            cycle_id: snapshot.cycle_id.clone(),
            completed_at: snapshot.completed_at,
            stale_after_days,
            hosts: StalenessEvaluator::new(stale_after_days).evaluate(snapshot, host_order, now),
        }
    }

    /// Count of hosts in the given status
    pub fn count(&self, status: HostStatus) -> usize {
        self.hosts.iter().filter(|h| h.status == status).count()
    }

    pub fn needs_attention(&self) -> bool {
        self.hosts.iter().any(|h| h.status.needs_attention())
    }
}
