//! Open conflicts, at most one per field.

use crate::models::{Conflict, FieldPath};

/// Per-field conflict slots, kept in detection order.
///
/// Conflicts on different fields are independent. UIs that show a single
/// conflict at a time use [`ConflictSet::active`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConflictSet {
    conflicts: Vec<Conflict>,
}

impl ConflictSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a conflict. Returns `false` if the field already has one, in
    /// which case the existing conflict is kept.
    pub fn raise(&mut self, conflict: Conflict) -> bool {
        if self.contains(conflict.path) {
            return false;
        }
        self.conflicts.push(conflict);
        true
    }

    /// Oldest open conflict.
    pub fn active(&self) -> Option<&Conflict> {
        self.conflicts.first()
    }

    pub fn get(&self, path: FieldPath) -> Option<&Conflict> {
        self.conflicts.iter().find(|conflict| conflict.path == path)
    }

    pub fn get_mut(&mut self, path: FieldPath) -> Option<&mut Conflict> {
        self.conflicts.iter_mut().find(|conflict| conflict.path == path)
    }

    pub fn contains(&self, path: FieldPath) -> bool {
        self.get(path).is_some()
    }

    pub fn remove(&mut self, path: FieldPath) -> Option<Conflict> {
        let index = self
            .conflicts
            .iter()
            .position(|conflict| conflict.path == path)?;
        Some(self.conflicts.remove(index))
    }

    pub fn as_slice(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}
