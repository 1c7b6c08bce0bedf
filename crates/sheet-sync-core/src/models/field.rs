//! Field model

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type tag of a field; decides the shape its value must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    Text,
    #[serde(alias = "textarea")]
    MultilineText,
    Number,
    #[serde(alias = "dropdown")]
    EnumChoice,
    #[serde(alias = "checkbox-array")]
    MultiChoice,
}

impl FieldType {
    /// Check that `value` has the runtime shape this tag requires.
    ///
    /// Choice types are additionally checked against `options` when the
    /// field declares any.
    pub fn accepts(self, value: &FieldValue, options: Option<&[String]>) -> Result<(), String> {
        match (self, value) {
            (Self::Text | Self::MultilineText, FieldValue::Text(_)) => Ok(()),
            (Self::Number, FieldValue::Number(number)) if number.is_finite() => Ok(()),
            (Self::Number, FieldValue::Number(_)) => Err("number must be finite".to_string()),
            (Self::EnumChoice, FieldValue::Text(choice)) => match options {
                Some(options) if !options.contains(choice) => {
                    Err(format!("'{choice}' is not one of the allowed options"))
                }
                _ => Ok(()),
            },
            (Self::MultiChoice, FieldValue::Choices(choices)) => {
                let Some(options) = options else {
                    return Ok(());
                };
                match choices.iter().find(|choice| !options.contains(*choice)) {
                    Some(unknown) => Err(format!("'{unknown}' is not one of the allowed options")),
                    None => Ok(()),
                }
            }
            (field_type, value) => Err(format!(
                "{} field cannot hold a {} value",
                field_type.as_str(),
                value.kind()
            )),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::MultilineText => "multiline-text",
            Self::Number => "number",
            Self::EnumChoice => "enum-choice",
            Self::MultiChoice => "multi-choice",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value held by a field. Untagged on the wire: string, number, or array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Choices(BTreeSet<String>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn choices<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Choices(values.into_iter().map(Into::into).collect())
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Number(_) => "number",
            Self::Choices(_) => "choice-set",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
            Self::Choices(choices) => {
                let joined = choices.iter().map(String::as_str).collect::<Vec<_>>();
                f.write_str(&joined.join(", "))
            }
        }
    }
}

/// Smallest editable unit of a sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub value: FieldValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Only the Dungeon Master may edit locked fields
    #[serde(default, alias = "isLocked")]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_at: Option<DateTime<Utc>>,
}

impl Field {
    pub fn new(id: impl Into<String>, field_type: FieldType, value: FieldValue) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            field_type,
            value,
            options: None,
            locked: false,
            last_edited_by: None,
            last_edited_at: None,
        }
    }

    #[must_use]
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = Some(options.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub const fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Check a candidate value against this field's type and options.
    pub fn check_value(&self, value: &FieldValue) -> Result<(), String> {
        self.field_type.accepts(value, self.options.as_deref())
    }
}
