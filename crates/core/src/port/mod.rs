// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod remote_runner;
pub mod time_provider;

// Re-exports
pub use id_provider::{IdProvider, UuidProvider};
pub use remote_runner::{CommandOutput, RemoteCommandRunner, TransportError};
pub use time_provider::TimeProvider;
