// Domain Layer - Pure business logic and entities

pub mod backup;
pub mod error;
pub mod settings;
pub mod status;

// Re-exports
pub use backup::{BackupRecord, HostId, HostResult, Snapshot};
pub use error::DomainError;
pub use settings::{MonitorSettings, RemoteCommand};
pub use status::HostStatus;
