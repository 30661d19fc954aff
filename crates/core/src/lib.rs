// tmwatch Core - Domain Logic & Ports
// NO infrastructure dependencies (process spawning and config files live in infra crates)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};
