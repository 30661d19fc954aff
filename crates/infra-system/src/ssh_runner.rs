// SSH command runner
// reason: tokio for async process management
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use tmwatch_core::port::remote_runner::{CommandOutput, RemoteCommandRunner, TransportError};
use tmwatch_core::port::TimeProvider;

/// Runs commands on remote hosts through the `ssh` client
///
/// Invocation: `<program> [options...] <host> <command> <args...>`.
/// Authentication is whatever the local ssh configuration provides; nothing
/// here prompts or supplies credentials.
pub struct SshCommandRunner {
    program: String,
    options: Vec<String>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SshCommandRunner {
    /// Create a new ssh runner
    ///
    /// # Arguments
    /// * `program` - Transport executable (`ssh`, or an absolute path)
    /// * `options` - Arguments placed before the host (e.g. `-o BatchMode=yes`)
    /// * `time_provider` - Time provider for duration tracking
    ///
    /// # Example
    /// ```ignore
    /// let runner = SshCommandRunner::new("ssh", vec![], Arc::new(SystemTimeProvider));
    /// ```
    pub fn new(
        program: impl Into<String>,
        options: Vec<String>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            program: program.into(),
            options,
            time_provider,
        }
    }

    /// Spawn the transport and collect both streams
    ///
    /// `wait_with_output` drains stdout and stderr concurrently with waiting
    /// for exit, so a chatty remote cannot fill a pipe and stall.
    async fn spawn_and_wait(
        &self,
        host: &str,
        command: &str,
        args: &[String],
    ) -> Result<std::process::Output, TransportError> {
        let child = Command::new(&self.program)
            .args(&self.options)
            .arg(host)
            .arg(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TransportError::LaunchFailed {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        child
            .wait_with_output()
            .await
            .map_err(|e| TransportError::Io {
                program: self.program.clone(),
                message: e.to_string(),
            })
    }

    /// Build command output from process output
    fn build_output(output: std::process::Output) -> CommandOutput {
        CommandOutput {
            // None means the transport was killed by a signal
            exit_status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

#[async_trait]
impl RemoteCommandRunner for SshCommandRunner {
    async fn run(
        &self,
        host: &str,
        command: &str,
        args: &[String],
    ) -> Result<CommandOutput, TransportError> {
        let start_time = self.time_provider.now_millis();

        debug!(
            program = %self.program,
            host = %host,
            command = %command,
            args = ?args,
            "Starting remote command"
        );

        let output = Self::build_output(self.spawn_and_wait(host, command, args).await?);

        info!(
            host = %host,
            duration_ms = self.time_provider.now_millis() - start_time,
            exit_status = output.exit_status,
            stdout_bytes = output.stdout.len(),
            "Remote command completed"
        );

        Ok(output)
    }
}
