//! Local edits the server has not confirmed yet.

use std::collections::BTreeMap;

use crate::models::{FieldPath, FieldValue};

/// Field path to the most recent locally entered, unconfirmed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingChanges {
    changes: BTreeMap<FieldPath, FieldValue>,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the value for `path`, replacing any earlier pending value.
    pub fn record(&mut self, path: FieldPath, value: FieldValue) -> Option<FieldValue> {
        self.changes.insert(path, value)
    }

    /// Pending value for `path`, or `None` when nothing is in flight.
    pub fn peek(&self, path: FieldPath) -> Option<&FieldValue> {
        self.changes.get(&path)
    }

    pub fn clear(&mut self, path: FieldPath) -> Option<FieldValue> {
        self.changes.remove(&path)
    }

    pub fn contains(&self, path: FieldPath) -> bool {
        self.changes.contains_key(&path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldPath, &FieldValue)> {
        self.changes.iter().map(|(path, value)| (*path, value))
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
