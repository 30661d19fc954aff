// Host Poller - one remote listing per host per cycle

use crate::application::parser::BackupListingParser;
use crate::domain::{HostResult, RemoteCommand};
use crate::port::RemoteCommandRunner;
use std::sync::Arc;
use tracing::{info, warn};

/// Polls a single host for its backup listing
///
/// Transport failures and non-zero exits end here as a per-host error
/// string; they never propagate to the cycle.
#[derive(Clone)]
pub struct HostPoller {
    runner: Arc<dyn RemoteCommandRunner>,
    parser: BackupListingParser,
    command: RemoteCommand,
}

impl HostPoller {
    pub fn new(runner: Arc<dyn RemoteCommandRunner>, command: RemoteCommand) -> Self {
        Self {
            runner,
            parser: BackupListingParser::new(),
            command,
        }
    }

    pub fn command(&self) -> &RemoteCommand {
        &self.command
    }

    pub fn runner(&self) -> Arc<dyn RemoteCommandRunner> {
        Arc::clone(&self.runner)
    }

    /// Poll `host` once
    pub async fn poll(&self, host: &str) -> HostResult {
        let output = match self
            .runner
            .run(host, &self.command.program, &self.command.args)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(host = %host, error = %e, "Remote shell transport failed");
                return HostResult::failure(host, e.to_string());
            }
        };

        if !output.success() {
            warn!(
                host = %host,
                exit_status = output.exit_status,
                stderr = %output.stderr.trim(),
                "Backup listing command failed"
            );
            return HostResult::failure(host, output.stderr);
        }

        let backups = self.parser.parse(&output.stdout);
        info!(host = %host, backups = backups.len(), "Host polled");
        HostResult::success(host, backups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::remote_runner::MockRemoteCommandRunner;
    use crate::port::{CommandOutput, TransportError};

    fn poller(runner: MockRemoteCommandRunner) -> HostPoller {
        HostPoller::new(Arc::new(runner), RemoteCommand::default())
    }

    fn exit(status: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_status: status,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[tokio::test]
    async fn test_runs_fixed_listbackups_command() {
        let mut runner = MockRemoteCommandRunner::new();
        runner
            .expect_run()
            .withf(|host, command, args| {
                host == "alpha" && command == "tmutil" && args.len() == 1 && args[0] == "listbackups"
            })
            .times(1)
            .returning(|_, _, _| Ok(exit(0, "", "")));

        let result = poller(runner).poll("alpha").await;
        assert_eq!(result.host, "alpha");
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr_and_ignores_stdout() {
        let mut runner = MockRemoteCommandRunner::new();
        runner.expect_run().returning(|_, _, _| {
            Ok(exit(
                255,
                "/Volumes/TM/db/h/2020-01-02-030405\n",
                "Permission denied (publickey).",
            ))
        });

        let result = poller(runner).poll("beta").await;

        assert!(result.backups.is_empty());
        assert_eq!(
            result.error_message.as_deref(),
            Some("Permission denied (publickey).")
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_with_empty_stderr_is_still_error() {
        let mut runner = MockRemoteCommandRunner::new();
        runner.expect_run().returning(|_, _, _| Ok(exit(1, "", "")));

        let result = poller(runner).poll("beta").await;

        assert!(result.is_error());
        assert_eq!(result.error_message.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_success_with_empty_listing_is_not_error() {
        let mut runner = MockRemoteCommandRunner::new();
        runner.expect_run().returning(|_, _, _| Ok(exit(0, "", "")));

        let result = poller(runner).poll("gamma").await;

        assert!(!result.is_error());
        assert!(result.backups.is_empty());
    }

    #[tokio::test]
    async fn test_success_parses_stdout() {
        let mut runner = MockRemoteCommandRunner::new();
        runner.expect_run().returning(|_, _, _| {
            Ok(exit(
                0,
                "/Volumes/TM/db/h/2020-01-02-030405\n/Volumes/TM/db/h/2020-01-03-030405\n",
                "some ssh banner",
            ))
        });

        let result = poller(runner).poll("alpha").await;

        assert_eq!(result.error_message, None);
        assert_eq!(result.backups.len(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_host_error() {
        let mut runner = MockRemoteCommandRunner::new();
        runner.expect_run().returning(|_, _, _| {
            Err(TransportError::LaunchFailed {
                program: "ssh".to_string(),
                message: "No such file or directory (os error 2)".to_string(),
            })
        });

        let result = poller(runner).poll("delta").await;

        assert!(result.backups.is_empty());
        let message = result.error_message.unwrap();
        assert!(message.contains("Failed to launch ssh"));
        assert!(message.contains("No such file or directory"));
    }
}
