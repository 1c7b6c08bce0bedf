//! Edit conflict model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DocumentId, FieldPath, FieldValue, IncomingUpdate};

/// Collision between an unconfirmed local edit and a confirmed remote edit
/// to the same field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    #[serde(alias = "field")]
    pub path: FieldPath,
    pub incoming_value: FieldValue,
    #[serde(alias = "incomingUser")]
    pub incoming_editor: String,
    pub incoming_version: u64,
    pub incoming_at: DateTime<Utc>,
    pub local_value: FieldValue,
    /// Document version when the conflict was detected
    pub local_version: u64,
}

impl Conflict {
    pub fn from_update(update: &IncomingUpdate, local_value: FieldValue, local_version: u64) -> Self {
        Self {
            path: update.path,
            incoming_value: update.value.clone(),
            incoming_editor: update.edited_by.clone(),
            incoming_version: update.version,
            incoming_at: update.edited_at,
            local_value,
            local_version,
        }
    }

    /// Newer remote write to the same field replaces the incoming side.
    pub fn refresh_incoming(&mut self, update: &IncomingUpdate) {
        self.incoming_value = update.value.clone();
        self.incoming_editor = update.edited_by.clone();
        self.incoming_version = update.version;
        self.incoming_at = update.edited_at;
    }

    /// The incoming side as an update that can be applied to the sheet.
    pub fn incoming_update(&self, document_id: DocumentId) -> IncomingUpdate {
        IncomingUpdate {
            document_id,
            path: self.path,
            value: self.incoming_value.clone(),
            edited_by: self.incoming_editor.clone(),
            edited_at: self.incoming_at,
            version: self.incoming_version,
        }
    }
}

/// Conflict reported by the server when it refused a conditional edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConflict {
    pub document_id: DocumentId,
    pub path: FieldPath,
    /// Value currently stored on the server
    pub current_value: FieldValue,
    pub current_editor: String,
    /// Document version at which the field last changed
    pub current_version: u64,
    pub changed_at: DateTime<Utc>,
    /// The refused value
    pub rejected_value: FieldValue,
}

impl ServerConflict {
    pub fn as_update(&self) -> IncomingUpdate {
        IncomingUpdate {
            document_id: self.document_id,
            path: self.path,
            value: self.current_value.clone(),
            edited_by: self.current_editor.clone(),
            edited_at: self.changed_at,
            version: self.current_version,
        }
    }
}
