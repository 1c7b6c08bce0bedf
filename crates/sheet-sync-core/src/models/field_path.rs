//! Typed locator for a single field value

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Position of one field within a sheet: `(section index, field index)`.
///
/// The wire form is `sections[i].fields[j].value`. Paths stay valid as long
/// as the sheet's section/field layout does not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    pub section: usize,
    pub field: usize,
}

impl FieldPath {
    pub const fn new(section: usize, field: usize) -> Self {
        Self { section, field }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sections[{}].fields[{}].value", self.section, self.field)
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidFieldPath(s.to_string());

        let rest = s.trim().strip_prefix("sections[").ok_or_else(invalid)?;
        let (section, rest) = rest.split_once(']').ok_or_else(invalid)?;
        let rest = rest.strip_prefix(".fields[").ok_or_else(invalid)?;
        let (field, rest) = rest.split_once(']').ok_or_else(invalid)?;
        if rest != ".value" {
            return Err(invalid());
        }

        Ok(Self {
            section: parse_index(section).ok_or_else(invalid)?,
            field: parse_index(field).ok_or_else(invalid)?,
        })
    }
}

fn parse_index(raw: &str) -> Option<usize> {
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

impl TryFrom<String> for FieldPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}
