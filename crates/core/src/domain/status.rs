// Host freshness classification

use serde::{Deserialize, Serialize};

/// Freshness of a host's newest backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostStatus {
    /// Newest backup is within the threshold
    Ok,
    /// Newest backup is older than the threshold
    Stale,
    /// Poll failed (transport or remote command)
    Error,
    /// Poll succeeded but the host reported no backups
    NoData,
}

impl HostStatus {
    /// Whether an operator should look at this host
    ///
    /// NoData counts: a host that has never backed up is as unprotected as a
    /// stale one.
    pub fn needs_attention(&self) -> bool {
        !matches!(self, HostStatus::Ok)
    }
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostStatus::Ok => write!(f, "OK"),
            HostStatus::Stale => write!(f, "STALE"),
            HostStatus::Error => write!(f, "ERROR"),
            HostStatus::NoData => write!(f, "NO_DATA"),
        }
    }
}
