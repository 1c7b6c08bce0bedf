//! Canonical in-memory copy of the open sheet.

use crate::error::{Error, Result};
use crate::models::{Document, EditEvent, Field, FieldPath, IncomingUpdate};

/// Owns the open document and guards its version counter.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    document: Document,
}

impl DocumentStore {
    pub const fn new(document: Document) -> Self {
        Self { document }
    }

    pub const fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    /// Baseline for staleness checks.
    pub const fn current_version(&self) -> u64 {
        self.document.version
    }

    pub fn field(&self, path: FieldPath) -> Option<&Field> {
        self.document.field(path)
    }

    /// Apply a confirmed update from the server.
    ///
    /// Updates whose version is not newer than the stored one are rejected
    /// with [`Error::StaleUpdate`] and leave the document untouched.
    pub fn apply_confirmed(&mut self, update: &IncomingUpdate) -> Result<EditEvent> {
        let current = self.current_version();
        if update.version <= current {
            return Err(Error::StaleUpdate {
                incoming: update.version,
                current,
            });
        }
        if update.version > current + 1 {
            tracing::warn!(
                document = %self.document.id,
                current,
                incoming = update.version,
                "Version gap in confirmed updates; intermediate writes were not delivered"
            );
        }

        self.write(update, update.version)
    }

    /// Apply the incoming side of a resolved conflict.
    ///
    /// Other fields may have advanced the version while the conflict was
    /// open, so the version never moves backwards here.
    pub fn apply_resolved(&mut self, update: &IncomingUpdate) -> Result<EditEvent> {
        let version = update.version.max(self.current_version());
        self.write(update, version)
    }

    fn write(&mut self, update: &IncomingUpdate, version: u64) -> Result<EditEvent> {
        let field = self
            .document
            .field_mut(update.path)
            .ok_or(Error::FieldNotFound(update.path))?;
        field
            .check_value(&update.value)
            .map_err(|reason| Error::InvalidValue {
                path: update.path,
                reason,
            })?;

        let old_value = std::mem::replace(&mut field.value, update.value.clone());
        field.last_edited_by = Some(update.edited_by.clone());
        field.last_edited_at = Some(update.edited_at);

        self.document.version = version;
        self.document.last_edited_by = Some(update.edited_by.clone());
        self.document.updated_at = update.edited_at;

        Ok(EditEvent {
            path: update.path,
            old_value,
            new_value: update.value.clone(),
            edited_by: update.edited_by.clone(),
            edited_at: update.edited_at,
            version,
        })
    }
}
