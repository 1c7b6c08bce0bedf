//! Data models for sheet-sync

mod conflict;
mod document;
mod field;
mod field_path;
mod update;
mod user;

pub use conflict::{Conflict, ServerConflict};
pub use document::{Document, DocumentId, Section};
pub use field::{Field, FieldType, FieldValue};
pub use field_path::FieldPath;
pub use update::{EditEvent, EditRequest, IncomingUpdate};
pub use user::{Role, User};
