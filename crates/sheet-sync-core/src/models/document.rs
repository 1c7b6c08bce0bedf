//! Character sheet document model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Field, FieldPath};
use crate::error::{Error, Result};

/// A unique identifier for a sheet, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Create a new unique document ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Titled group of fields; order is display-significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Section {
    pub fn new(id: impl Into<String>, title: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            fields,
        }
    }
}

/// A character sheet shared between clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Unique identifier
    pub id: DocumentId,
    /// Owning user
    #[serde(alias = "userId")]
    pub owner_id: String,
    #[serde(default)]
    pub character_name: String,
    #[serde(default)]
    pub character_class: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub sections: Vec<Section>,
    /// Advanced by the server once per accepted field write
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_by: Option<String>,
}

impl Document {
    /// Create an empty sheet at version 0
    #[must_use]
    pub fn new(owner_id: impl Into<String>, character_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::new(),
            owner_id: owner_id.into(),
            character_name: character_name.into(),
            character_class: String::new(),
            level: 1,
            sections: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            last_edited_by: None,
        }
    }

    #[must_use]
    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    #[must_use]
    pub const fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn field(&self, path: FieldPath) -> Option<&Field> {
        self.sections.get(path.section)?.fields.get(path.field)
    }

    pub fn field_mut(&mut self, path: FieldPath) -> Option<&mut Field> {
        self.sections
            .get_mut(path.section)?
            .fields
            .get_mut(path.field)
    }

    /// Find the path of the field with the given id.
    pub fn path_of(&self, field_id: &str) -> Option<FieldPath> {
        self.sections
            .iter()
            .enumerate()
            .find_map(|(section_index, section)| {
                section
                    .fields
                    .iter()
                    .position(|field| field.id == field_id)
                    .map(|field_index| FieldPath::new(section_index, field_index))
            })
    }

    /// Iterate every field together with its path, in display order.
    pub fn fields(&self) -> impl Iterator<Item = (FieldPath, &Field)> {
        self.sections
            .iter()
            .enumerate()
            .flat_map(|(section_index, section)| {
                section
                    .fields
                    .iter()
                    .enumerate()
                    .map(move |(field_index, field)| {
                        (FieldPath::new(section_index, field_index), field)
                    })
            })
    }

    /// Check that every field's value matches its type tag.
    pub fn validate(&self) -> Result<()> {
        for (path, field) in self.fields() {
            field
                .check_value(&field.value)
                .map_err(|reason| Error::InvalidValue { path, reason })?;
        }
        Ok(())
    }
}
