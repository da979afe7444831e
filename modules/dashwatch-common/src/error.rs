use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashwatchError {
    #[error("Another run holds the lock ({age_secs}s old)")]
    LockHeld { age_secs: u64 },

    #[error("Dashboard session invalid: {0}")]
    SessionInvalid(String),

    #[error("Dedup log unavailable at {}: {reason}", path.display())]
    PersistenceUnavailable { path: PathBuf, reason: String },

    #[error("Dispatch failed on batch {batch} after {attempts} attempt(s): {reason}")]
    DispatchFailure {
        batch: usize,
        attempts: u32,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl DashwatchError {
    /// Short label used as the headline of a fatal alert.
    pub fn kind(&self) -> &'static str {
        match self {
            DashwatchError::LockHeld { .. } => "lock held",
            DashwatchError::SessionInvalid(_) => "session invalid",
            DashwatchError::PersistenceUnavailable { .. } => "persistence unavailable",
            DashwatchError::DispatchFailure { .. } => "dispatch failure",
            DashwatchError::Config(_) => "configuration",
            DashwatchError::Capture(_) => "capture",
            DashwatchError::Anyhow(_) => "unexpected error",
        }
    }
}
