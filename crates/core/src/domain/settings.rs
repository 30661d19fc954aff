// Monitor settings (input configuration)

use super::backup::HostId;
use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Default staleness threshold (days)
pub const DEFAULT_STALE_AFTER_DAYS: u32 = 1;

/// Default remote-shell transport program
pub const DEFAULT_SSH_PROGRAM: &str = "ssh";

/// Default backup listing command run on each host
pub const DEFAULT_REMOTE_PROGRAM: &str = "tmutil";
pub const DEFAULT_REMOTE_ARGS: &[&str] = &["listbackups"];

/// Command executed on every host, after the transport has connected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for RemoteCommand {
    fn default() -> Self {
        Self {
            program: DEFAULT_REMOTE_PROGRAM.to_string(),
            args: DEFAULT_REMOTE_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Monitor configuration
///
/// `hosts` defines both which hosts are polled and their display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub hosts: Vec<HostId>,

    /// Newest backup older than this many days is stale
    pub stale_after_days: u32,

    /// Transport program (`ssh` on PATH by default)
    pub ssh_program: String,

    /// Extra transport options placed before the host, e.g. `["-o", "BatchMode=yes"]`
    pub ssh_options: Vec<String>,

    pub remote_program: String,
    pub remote_args: Vec<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let command = RemoteCommand::default();
        Self {
            hosts: Vec::new(),
            stale_after_days: DEFAULT_STALE_AFTER_DAYS,
            ssh_program: DEFAULT_SSH_PROGRAM.to_string(),
            ssh_options: Vec::new(),
            remote_program: command.program,
            remote_args: command.args,
        }
    }
}

impl MonitorSettings {
    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<HostId>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn remote_command(&self) -> RemoteCommand {
        RemoteCommand {
            program: self.remote_program.clone(),
            args: self.remote_args.clone(),
        }
    }

    /// Validate settings before they are handed to the monitor
    ///
    /// An empty host list is valid (the cycle produces an empty snapshot).
    pub fn validate(&self) -> Result<()> {
        for (index, host) in self.hosts.iter().enumerate() {
            if host.trim().is_empty() {
                return Err(DomainError::InvalidHost {
                    index,
                    reason: "host is blank".to_string(),
                });
            }
            if host.chars().any(char::is_whitespace) {
                return Err(DomainError::InvalidHost {
                    index,
                    reason: format!("'{}' contains whitespace", host),
                });
            }
        }

        if self.stale_after_days == 0 {
            return Err(DomainError::InvalidThreshold(self.stale_after_days));
        }

        if self.ssh_program.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "ssh_program must not be empty".to_string(),
            ));
        }

        if self.remote_program.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "remote_program must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
