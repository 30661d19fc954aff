// Remote Command Runner Port
// Abstraction for running a command on a remote host over a shell transport

use async_trait::async_trait;
use thiserror::Error;

/// Captured result of a remote command that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status of the transport process (`-1` when killed by a signal)
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// The transport itself failed: nothing ran on the remote side
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to launch {program}: {message}")]
    LaunchFailed { program: String, message: String },

    #[error("IO error while running {program}: {message}")]
    Io { program: String, message: String },
}

/// Remote Command Runner trait
///
/// Implementations:
/// - SshCommandRunner (infra-system): spawns `ssh <host> <command> <args...>`
/// - mocks::MockRemoteRunner: scripted per-host responses for tests
///
/// `run` resolves only once the remote process has exited (or failed to
/// launch). There is no timeout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteCommandRunner: Send + Sync {
    /// Run `command args...` on `host`
    ///
    /// # Errors
    /// - TransportError::LaunchFailed if the transport program cannot be started
    /// - TransportError::Io if collecting the output fails
    async fn run(
        &self,
        host: &str,
        command: &str,
        args: &[String],
    ) -> Result<CommandOutput, TransportError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Scripted response for one host
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Remote command ran and exited with this status
        Exit {
            status: i32,
            stdout: String,
            stderr: String,
        },
        /// Transport could not be launched
        TransportFailure(String),
        /// Panic inside the runner (for isolation testing)
        Panic(String),
    }

    impl MockBehavior {
        /// Exit 0 with the given listing on stdout
        pub fn listing(stdout: impl Into<String>) -> Self {
            MockBehavior::Exit {
                status: 0,
                stdout: stdout.into(),
                stderr: String::new(),
            }
        }

        /// Non-zero exit with the given stderr
        pub fn failing(status: i32, stderr: impl Into<String>) -> Self {
            MockBehavior::Exit {
                status,
                stdout: String::new(),
                stderr: stderr.into(),
            }
        }
    }

    /// Mock runner with per-host behavior and latency
    #[derive(Default)]
    pub struct MockRemoteRunner {
        behaviors: Mutex<HashMap<String, (MockBehavior, Duration)>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockRemoteRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_host(self, host: impl Into<String>, behavior: MockBehavior) -> Self {
            self.with_delayed_host(host, behavior, Duration::ZERO)
        }

        pub fn with_delayed_host(
            self,
            host: impl Into<String>,
            behavior: MockBehavior,
            delay: Duration,
        ) -> Self {
            self.set_behavior(host, behavior, delay);
            self
        }

        /// Replace a host's behavior between cycles
        pub fn set_behavior(&self, host: impl Into<String>, behavior: MockBehavior, delay: Duration) {
            self.behaviors
                .lock()
                .unwrap()
                .insert(host.into(), (behavior, delay));
        }

        /// Hosts in the order `run` was called
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RemoteCommandRunner for MockRemoteRunner {
        async fn run(
            &self,
            host: &str,
            command: &str,
            _args: &[String],
        ) -> Result<CommandOutput, TransportError> {
            self.calls.lock().unwrap().push(host.to_string());

            let scripted = self.behaviors.lock().unwrap().get(host).cloned();
            let (behavior, delay) = scripted.unwrap_or_else(|| {
                (
                    MockBehavior::TransportFailure(format!("no route to host {}", host)),
                    Duration::ZERO,
                )
            });

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match behavior {
                MockBehavior::Exit {
                    status,
                    stdout,
                    stderr,
                } => Ok(CommandOutput {
                    exit_status: status,
                    stdout,
                    stderr,
                }),
                MockBehavior::TransportFailure(message) => Err(TransportError::LaunchFailed {
                    program: command.to_string(),
                    message,
                }),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for isolation testing
                }
            }
        }
    }
}
