// Settings loader
// reason: config crate layers TOML file + TMWATCH_* environment overrides
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use tmwatch_core::domain::MonitorSettings;
use tmwatch_core::error::{AppError, Result};

/// Environment variable naming an explicit settings file
pub const CONFIG_PATH_ENV: &str = "TMWATCH_CONFIG";

/// Prefix for per-key overrides (`TMWATCH_HOSTS=a,b`, `TMWATCH_STALE_AFTER_DAYS=3`)
pub const ENV_PREFIX: &str = "TMWATCH";

const LIST_KEYS: &[&str] = &["hosts", "ssh_options", "remote_args"];

/// `<platform config dir>/tmwatch/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "tmwatch").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Explicit path, then `TMWATCH_CONFIG`, then the platform default
///
/// `~` is expanded in user-supplied paths.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .map(|p| PathBuf::from(shellexpand::tilde(&p).into_owned()))
        .or_else(default_config_path)
}

/// Loads and validates [`MonitorSettings`]
///
/// Layers, lowest precedence first: built-in defaults, the TOML file (if it
/// exists), `TMWATCH_*` environment variables.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    path: Option<PathBuf>,
    env_override: Option<HashMap<String, String>>,
}

impl SettingsLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            env_override: None,
        }
    }

    /// Read overrides from `vars` instead of the process environment
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env_override = Some(vars);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> Result<MonitorSettings> {
        let mut builder = Config::builder();

        if let Some(path) = &self.path {
            if path.exists() {
                debug!(path = %path.display(), "Reading settings file");
            } else {
                info!(path = %path.display(), "Settings file not found, using defaults");
            }
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml).required(false));
        }

        let mut env = Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }
        if let Some(vars) = &self.env_override {
            env = env.source(Some(vars.clone()));
        }

        let settings: MonitorSettings = builder
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AppError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }
}
