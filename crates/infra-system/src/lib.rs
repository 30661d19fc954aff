// tmwatch Infrastructure - System Adapters
// Implements: RemoteCommandRunner (ssh), settings loading/watching, wake detection

pub mod settings_loader;
pub mod settings_watcher;
pub mod ssh_runner;
pub mod wake_detector;

pub use settings_loader::{default_config_path, resolve_config_path, SettingsLoader};
pub use settings_watcher::SettingsWatcher;
pub use ssh_runner::SshCommandRunner;
pub use wake_detector::WakeDetector;
