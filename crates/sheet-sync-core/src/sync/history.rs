//! Bounded log of edits applied to the open sheet.

use std::collections::VecDeque;

use crate::models::{EditEvent, FieldPath};

#[derive(Debug, Clone)]
pub struct EditHistory {
    events: VecDeque<EditEvent>,
    limit: usize,
}

impl EditHistory {
    /// A `limit` of zero disables history.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(limit.min(64)),
            limit,
        }
    }

    pub fn push(&mut self, event: EditEvent) {
        if self.limit == 0 {
            return;
        }
        while self.events.len() >= self.limit {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &EditEvent> {
        self.events.iter()
    }

    pub fn for_field(&self, path: FieldPath) -> impl Iterator<Item = &EditEvent> {
        self.events.iter().filter(move |event| event.path == path)
    }

    pub fn latest(&self) -> Option<&EditEvent> {
        self.events.back()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
