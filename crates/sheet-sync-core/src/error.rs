//! Error types for sheet-sync-core

use thiserror::Error;

use crate::models::{DocumentId, FieldPath};

/// Result type alias using sheet-sync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sheet-sync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Update is not newer than the stored document version
    #[error("Stale update: version {incoming} is not newer than {current}")]
    StaleUpdate { incoming: u64, current: u64 },

    /// Edit attempted while no document is open
    #[error("No document is open")]
    NoActiveDocument,

    /// Edit attempted while the transport is unavailable
    #[error("Not connected to the sheet server")]
    NotConnected,

    /// Transport accepted the call but the authority rejected it
    #[error("Edit submission failed: {0}")]
    SubmissionFailed(String),

    /// Sheet is not hosted by the server
    #[error("Sheet not found: {0}")]
    DocumentNotFound(DocumentId),

    /// Path does not resolve against the open document
    #[error("Field not found: {0}")]
    FieldNotFound(FieldPath),

    /// Value shape does not match the field's type tag
    #[error("Invalid value for {path}: {reason}")]
    InvalidValue { path: FieldPath, reason: String },

    /// Locked field edited without the privileged role
    #[error("Field is locked: {0}")]
    FieldLocked(FieldPath),

    /// Malformed field path text
    #[error("Invalid field path: {0}")]
    InvalidFieldPath(String),

    /// Resolution requested with no matching open conflict
    #[error("No open conflict to resolve")]
    NoConflict,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the user can retry the action that produced this error.
    ///
    /// Stale updates are swallowed rather than shown, so they are not
    /// considered recoverable user-facing errors.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::SubmissionFailed(_) | Self::NoConflict
        )
    }
}
