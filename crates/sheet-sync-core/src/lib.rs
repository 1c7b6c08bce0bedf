//! sheet-sync-core - Core library for sheet-sync
//!
//! This crate contains the character sheet model, the field-level sync and
//! conflict handling used by every client, and an in-memory sheet server
//! for tests and simulations.

pub mod authority;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod sync;
pub mod util;

pub use config::{ResubmitPolicy, SyncConfig};
pub use error::{Error, Result};
pub use models::{Conflict, Document, DocumentId, FieldPath, FieldValue, IncomingUpdate};
pub use state::ConnectionState;
pub use sync::{SyncClient, Transport};
