// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid host entry at position {index}: {reason}")]
    InvalidHost { index: usize, reason: String },

    #[error("Invalid staleness threshold: {0} days (must be at least 1)")]
    InvalidThreshold(u32),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
