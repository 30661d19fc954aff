// Application Layer - Use Cases and Business Logic

pub mod constants;
pub mod coordinator;
pub mod host_poller;
pub mod monitor;
pub mod parser;
pub mod scheduler;
pub mod shutdown;
pub mod staleness;

// Re-exports
pub use coordinator::PollCoordinator;
pub use host_poller::HostPoller;
pub use monitor::{Monitor, MonitorEvent, MonitorHandle};
pub use parser::{BackupListingParser, ParseAnomaly};
pub use scheduler::{next_fire_time, Scheduler, SchedulerState, SchedulingError};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use staleness::{classify, HostReport, StalenessEvaluator, StatusReport};
