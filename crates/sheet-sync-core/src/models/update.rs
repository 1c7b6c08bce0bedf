//! Edit and update messages exchanged with the sheet server

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DocumentId, FieldPath, FieldValue};

/// Confirmed, versioned change broadcast by the server to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingUpdate {
    #[serde(alias = "sheetId")]
    pub document_id: DocumentId,
    #[serde(alias = "fieldPath")]
    pub path: FieldPath,
    pub value: FieldValue,
    pub edited_by: String,
    pub edited_at: DateTime<Utc>,
    /// Document version after this write
    pub version: u64,
}

/// Request to write one field, sent by a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub document_id: DocumentId,
    pub path: FieldPath,
    pub value: FieldValue,
    pub editor: String,
    /// When set, the server rejects the write if the field changed after
    /// this version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

/// Applied edit, kept in the session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditEvent {
    pub path: FieldPath,
    pub old_value: FieldValue,
    pub new_value: FieldValue,
    pub edited_by: String,
    pub edited_at: DateTime<Utc>,
    pub version: u64,
}
