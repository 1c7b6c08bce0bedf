use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] sheet_sync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to read {path}: {reason}")]
    InvalidFile { path: String, reason: String },
    #[error("Script references unknown client '{0}'")]
    UnknownClient(String),
    #[error("Script declares client '{0}' more than once")]
    DuplicateClient(String),
    #[error("Script step {step}: {reason}")]
    InvalidStep { step: usize, reason: String },
    #[error("Configuration error: {0}")]
    Config(String),
}
