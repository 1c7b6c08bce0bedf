//! Per-document editing session: the update applier and conflict detector.

use chrono::{DateTime, Utc};

use super::conflicts::ConflictSet;
use super::history::EditHistory;
use super::pending::PendingChanges;
use super::store::DocumentStore;
use crate::error::{Error, Result};
use crate::models::{
    Conflict, Document, DocumentId, EditEvent, FieldPath, FieldValue, IncomingUpdate, Role,
    ServerConflict,
};

/// What happened to an incoming update or server conflict report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Written to the sheet
    Applied {
        path: FieldPath,
        version: u64,
        cleared_pending: bool,
    },
    /// Held back as a new conflict; the sheet is unchanged
    ConflictRaised(FieldPath),
    /// Newer remote value replaced the incoming side of an open conflict
    ConflictRefreshed(FieldPath),
    /// Own write landed after the field was already in conflict; the
    /// conflict is settled in favour of the local value
    ConflictSettled(FieldPath),
    /// Not newer than the stored version
    Ignored { incoming: u64, current: u64 },
    /// Meant for a different (or no) document
    Discarded,
}

/// Exclusive owner of one open sheet, its pending edits, and its conflicts.
///
/// Dropping the session tears all of that down; a new document gets a new
/// session.
#[derive(Debug, Clone)]
pub struct SheetSession {
    editor: String,
    store: DocumentStore,
    pending: PendingChanges,
    conflicts: ConflictSet,
    history: EditHistory,
    last_applied_at: Option<DateTime<Utc>>,
}

impl SheetSession {
    pub fn open(document: Document, editor: impl Into<String>, history_limit: usize) -> Self {
        Self {
            editor: editor.into(),
            store: DocumentStore::new(document),
            pending: PendingChanges::new(),
            conflicts: ConflictSet::new(),
            history: EditHistory::with_limit(history_limit),
            last_applied_at: None,
        }
    }

    pub fn editor(&self) -> &str {
        &self.editor
    }

    pub const fn document(&self) -> &Document {
        self.store.document()
    }

    pub const fn document_id(&self) -> DocumentId {
        self.store.document().id
    }

    pub const fn current_version(&self) -> u64 {
        self.store.current_version()
    }

    pub const fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub const fn pending(&self) -> &PendingChanges {
        &self.pending
    }

    pub const fn conflicts(&self) -> &ConflictSet {
        &self.conflicts
    }

    pub const fn history(&self) -> &EditHistory {
        &self.history
    }

    pub const fn last_applied_at(&self) -> Option<DateTime<Utc>> {
        self.last_applied_at
    }

    pub fn into_document(self) -> Document {
        self.store.into_document()
    }

    /// Value to display for `path`: the pending local value shadows the
    /// stored one.
    pub fn display_value(&self, path: FieldPath) -> Option<&FieldValue> {
        self.pending
            .peek(path)
            .or_else(|| self.store.field(path).map(|field| &field.value))
    }

    /// Validate a local edit before anything is sent.
    pub fn check_edit(&self, path: FieldPath, value: &FieldValue, role: Role) -> Result<()> {
        let field = self.store.field(path).ok_or(Error::FieldNotFound(path))?;
        if field.locked && !role.can_edit_locked() {
            return Err(Error::FieldLocked(path));
        }
        field
            .check_value(value)
            .map_err(|reason| Error::InvalidValue { path, reason })
    }

    /// Track a submitted local edit.
    ///
    /// If the field has an open conflict, the new value replaces the local
    /// side of that conflict and `true` is returned.
    pub fn record_pending(&mut self, path: FieldPath, value: FieldValue) -> bool {
        let replaced_conflict = match self.conflicts.get_mut(path) {
            Some(conflict) => {
                conflict.local_value = value.clone();
                true
            }
            None => false,
        };
        self.pending.record(path, value);
        replaced_conflict
    }

    /// Handle a confirmed update broadcast by the server.
    pub fn apply_incoming(&mut self, update: &IncomingUpdate) -> Result<UpdateOutcome> {
        if update.document_id != self.document_id() {
            tracing::debug!(
                document = %update.document_id,
                open = %self.document_id(),
                "Discarding update for a document that is not open"
            );
            return Ok(UpdateOutcome::Discarded);
        }

        let current = self.current_version();
        if update.version <= current {
            tracing::debug!(
                path = %update.path,
                incoming = update.version,
                current,
                "Ignoring stale update"
            );
            return Ok(UpdateOutcome::Ignored {
                incoming: update.version,
                current,
            });
        }

        let own_write = update.edited_by == self.editor;

        if let Some(conflict) = self.conflicts.get_mut(update.path) {
            // anything older than the held incoming side was already
            // superseded at the server, own writes included
            if update.version <= conflict.incoming_version {
                tracing::debug!(
                    path = %update.path,
                    incoming = update.version,
                    held = conflict.incoming_version,
                    "Ignoring update older than open conflict"
                );
                return Ok(UpdateOutcome::Ignored {
                    incoming: update.version,
                    current: conflict.incoming_version,
                });
            }
            if !own_write {
                conflict.refresh_incoming(update);
                tracing::info!(
                    path = %update.path,
                    editor = %update.edited_by,
                    version = update.version,
                    "Refreshed open conflict with newer remote value"
                );
                return Ok(UpdateOutcome::ConflictRefreshed(update.path));
            }
            if conflict.local_value == update.value {
                self.apply(update)?;
                self.conflicts.remove(update.path);
                self.pending.clear(update.path);
                return Ok(UpdateOutcome::ConflictSettled(update.path));
            }
        }

        let Some(local_value) = self.pending.peek(update.path) else {
            return self.apply(update).map(|version| UpdateOutcome::Applied {
                path: update.path,
                version,
                cleared_pending: false,
            });
        };

        // pending holds only the latest local value. An echo of an earlier
        // write leaves it in flight until its own echo arrives.
        if own_write {
            let cleared_pending = *local_value == update.value;
            let version = self.apply(update)?;
            if cleared_pending {
                self.pending.clear(update.path);
            }
            return Ok(UpdateOutcome::Applied {
                path: update.path,
                version,
                cleared_pending,
            });
        }

        let local_value = local_value.clone();
        self.raise_conflict(Conflict::from_update(update, local_value, current));
        Ok(UpdateOutcome::ConflictRaised(update.path))
    }

    /// Handle a conflict the server reported after refusing a conditional
    /// edit from this client.
    pub fn apply_server_conflict(&mut self, report: &ServerConflict) -> Result<UpdateOutcome> {
        if report.document_id != self.document_id() {
            return Ok(UpdateOutcome::Discarded);
        }

        let update = report.as_update();
        if let Some(conflict) = self.conflicts.get_mut(report.path) {
            if update.version > conflict.incoming_version {
                conflict.refresh_incoming(&update);
            }
            return Ok(UpdateOutcome::ConflictRefreshed(report.path));
        }

        let Some(local_value) = self.pending.peek(report.path).cloned() else {
            tracing::debug!(
                path = %report.path,
                "Server conflict for a field with no pending edit"
            );
            return Ok(UpdateOutcome::Discarded);
        };

        let conflict = Conflict::from_update(&update, local_value, self.current_version());
        self.raise_conflict(conflict);
        Ok(UpdateOutcome::ConflictRaised(report.path))
    }

    /// Resolve the conflict at `path` by taking the remote value.
    pub fn accept_incoming(&mut self, path: FieldPath) -> Result<EditEvent> {
        let conflict = self.conflicts.get(path).ok_or(Error::NoConflict)?;
        let update = conflict.incoming_update(self.document_id());

        let event = self.store.apply_resolved(&update)?;
        self.conflicts.remove(path);
        self.pending.clear(path);
        self.record_applied(event.clone());
        tracing::info!(
            path = %path,
            version = event.version,
            "Conflict resolved by accepting incoming value"
        );
        Ok(event)
    }

    /// Close the conflict at `path` after its local value was resubmitted.
    ///
    /// The local value goes back to pending so that the server's echo of the
    /// resubmission clears it through the normal update path.
    pub fn finish_keep_local(&mut self, path: FieldPath) -> Result<FieldValue> {
        let conflict = self.conflicts.remove(path).ok_or(Error::NoConflict)?;
        self.pending.record(path, conflict.local_value.clone());
        tracing::info!(path = %path, "Conflict resolved by keeping local value");
        Ok(conflict.local_value)
    }

    fn raise_conflict(&mut self, conflict: Conflict) {
        tracing::warn!(
            path = %conflict.path,
            incoming_editor = %conflict.incoming_editor,
            incoming_version = conflict.incoming_version,
            local_version = conflict.local_version,
            "Edit conflict detected"
        );
        let path = conflict.path;
        if self.conflicts.raise(conflict) {
            self.pending.clear(path);
        }
    }

    fn apply(&mut self, update: &IncomingUpdate) -> Result<u64> {
        let event = self.store.apply_confirmed(update)?;
        let version = event.version;
        self.record_applied(event);
        Ok(version)
    }

    fn record_applied(&mut self, event: EditEvent) {
        self.last_applied_at = Some(Utc::now());
        self.history.push(event);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{Field, FieldType, Section};

    const STR: FieldPath = FieldPath::new(0, 0);
    const DEX: FieldPath = FieldPath::new(0, 1);
    const NOTES: FieldPath = FieldPath::new(1, 0);

    fn session() -> SheetSession {
        let document = Document::new("player-1", "Brom")
            .with_section(Section::new(
                "abilities",
                "Abilities",
                vec![
                    Field::new("str", FieldType::Text, FieldValue::text("10")),
                    Field::new("dex", FieldType::Number, FieldValue::Number(12.0)),
                ],
            ))
            .with_section(Section::new(
                "notes",
                "Notes",
                vec![Field::new("notes", FieldType::MultilineText, FieldValue::text("")).locked()],
            ))
            .with_version(5);
        SheetSession::open(document, "player-1", 16)
    }

    fn update(session: &SheetSession, path: FieldPath, value: FieldValue, version: u64, editor: &str) -> IncomingUpdate {
        IncomingUpdate {
            document_id: session.document_id(),
            path,
            value,
            edited_by: editor.to_string(),
            edited_at: Utc::now(),
            version,
        }
    }

    fn stored(session: &SheetSession, path: FieldPath) -> FieldValue {
        session.store().field(path).unwrap().value.clone()
    }

    #[test]
    fn direct_apply_without_pending() {
        let mut session = session();
        let outcome = session
            .apply_incoming(&update(&session, STR, FieldValue::text("14"), 6, "dm1"))
            .unwrap();

        assert_eq!(
            outcome,
            UpdateOutcome::Applied {
                path: STR,
                version: 6,
                cleared_pending: false
            }
        );
        assert_eq!(stored(&session, STR), FieldValue::text("14"));
        assert_eq!(session.current_version(), 6);
        assert_eq!(session.history().len(), 1);
        assert!(session.last_applied_at().is_some());
    }

    #[test]
    fn remote_write_to_pending_field_raises_conflict() {
        let mut session = session();
        session.record_pending(STR, FieldValue::text("12"));

        let outcome = session
            .apply_incoming(&update(&session, STR, FieldValue::text("14"), 6, "dm1"))
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::ConflictRaised(STR));
        let conflict = session.conflicts().active().unwrap();
        assert_eq!(conflict.incoming_value, FieldValue::text("14"));
        assert_eq!(conflict.local_value, FieldValue::text("12"));
        assert_eq!(conflict.incoming_version, 6);
        assert_eq!(conflict.local_version, 5);
        assert_eq!(conflict.incoming_editor, "dm1");

        assert_eq!(stored(&session, STR), FieldValue::text("10"));
        assert_eq!(session.current_version(), 5);
        assert_eq!(session.pending().peek(STR), None);
    }

    #[test]
    fn accept_incoming_applies_remote_value() {
        let mut session = session();
        session.record_pending(STR, FieldValue::text("12"));
        session
            .apply_incoming(&update(&session, STR, FieldValue::text("14"), 6, "dm1"))
            .unwrap();

        let event = session.accept_incoming(STR).unwrap();

        assert_eq!(event.new_value, FieldValue::text("14"));
        assert_eq!(stored(&session, STR), FieldValue::text("14"));
        assert_eq!(session.current_version(), 6);
        assert!(session.conflicts().is_empty());
        assert_eq!(session.pending().peek(STR), None);
        assert_eq!(
            session.store().field(STR).unwrap().last_edited_by.as_deref(),
            Some("dm1")
        );
    }

    #[test]
    fn own_echo_clears_pending() {
        let mut session = session();
        session.record_pending(STR, FieldValue::text("12"));

        let outcome = session
            .apply_incoming(&update(&session, STR, FieldValue::text("12"), 6, "player-1"))
            .unwrap();

        assert_eq!(
            outcome,
            UpdateOutcome::Applied {
                path: STR,
                version: 6,
                cleared_pending: true
            }
        );
        assert!(session.pending().is_empty());
        assert!(session.conflicts().is_empty());
    }

    #[test]
    fn older_own_echo_keeps_newer_pending_value() {
        let mut session = session();
        session.record_pending(STR, FieldValue::text("11"));
        session.record_pending(STR, FieldValue::text("12"));

        session
            .apply_incoming(&update(&session, STR, FieldValue::text("11"), 6, "player-1"))
            .unwrap();

        assert_eq!(stored(&session, STR), FieldValue::text("11"));
        assert_eq!(session.pending().peek(STR), Some(&FieldValue::text("12")));
        assert_eq!(session.display_value(STR), Some(&FieldValue::text("12")));

        let outcome = session
            .apply_incoming(&update(&session, STR, FieldValue::text("12"), 7, "player-1"))
            .unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome::Applied {
                path: STR,
                version: 7,
                cleared_pending: true,
            }
        );
        assert!(session.pending().is_empty());
    }

    #[test]
    fn stale_and_foreign_updates_change_nothing() {
        let mut session = session();
        session.record_pending(STR, FieldValue::text("12"));

        let stale = session
            .apply_incoming(&update(&session, STR, FieldValue::text("1"), 5, "dm1"))
            .unwrap();
        assert_eq!(stale, UpdateOutcome::Ignored { incoming: 5, current: 5 });

        let mut foreign = update(&session, STR, FieldValue::text("2"), 9, "dm1");
        foreign.document_id = DocumentId::new();
        assert_eq!(session.apply_incoming(&foreign).unwrap(), UpdateOutcome::Discarded);

        assert_eq!(stored(&session, STR), FieldValue::text("10"));
        assert_eq!(session.current_version(), 5);
        assert_eq!(session.pending().peek(STR), Some(&FieldValue::text("12")));
        assert!(session.conflicts().is_empty());
    }

    #[test]
    fn conflicts_on_different_fields_are_independent() {
        let mut session = session();
        session.record_pending(STR, FieldValue::text("12"));
        session.record_pending(DEX, FieldValue::Number(16.0));

        session
            .apply_incoming(&update(&session, STR, FieldValue::text("14"), 6, "dm1"))
            .unwrap();
        session
            .apply_incoming(&update(&session, DEX, FieldValue::Number(8.0), 7, "dm1"))
            .unwrap();

        assert_eq!(session.conflicts().len(), 2);
        assert_eq!(session.conflicts().active().unwrap().path, STR);

        session.accept_incoming(DEX).unwrap();
        assert_eq!(session.current_version(), 7);
        assert_eq!(session.conflicts().active().unwrap().path, STR);
        assert_eq!(stored(&session, STR), FieldValue::text("10"));
    }

    #[test]
    fn newer_remote_write_refreshes_open_conflict() {
        let mut session = session();
        session.record_pending(STR, FieldValue::text("12"));
        session
            .apply_incoming(&update(&session, STR, FieldValue::text("14"), 6, "dm1"))
            .unwrap();

        // another field moves the sheet forward meanwhile
        session
            .apply_incoming(&update(&session, DEX, FieldValue::Number(9.0), 7, "dm1"))
            .unwrap();
        let outcome = session
            .apply_incoming(&update(&session, STR, FieldValue::text("18"), 8, "other"))
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::ConflictRefreshed(STR));
        let conflict = session.conflicts().get(STR).unwrap();
        assert_eq!(conflict.incoming_value, FieldValue::text("18"));
        assert_eq!(conflict.incoming_editor, "other");
        assert_eq!(conflict.local_version, 5);
        assert_eq!(session.current_version(), 7);

        session.accept_incoming(STR).unwrap();
        assert_eq!(session.current_version(), 8);
        assert_eq!(stored(&session, STR), FieldValue::text("18"));
    }

    #[test]
    fn late_older_write_does_not_wind_back_conflict() {
        let mut session = session();
        session.record_pending(STR, FieldValue::text("12"));
        session
            .apply_incoming(&update(&session, STR, FieldValue::text("18"), 8, "dm1"))
            .unwrap();

        let late = session
            .apply_incoming(&update(&session, STR, FieldValue::text("14"), 6, "dm1"))
            .unwrap();
        assert_eq!(late, UpdateOutcome::Ignored { incoming: 6, current: 8 });

        let own_late = session
            .apply_incoming(&update(&session, STR, FieldValue::text("12"), 7, "player-1"))
            .unwrap();
        assert_eq!(own_late, UpdateOutcome::Ignored { incoming: 7, current: 8 });

        let conflict = session.conflicts().get(STR).unwrap();
        assert_eq!(conflict.incoming_value, FieldValue::text("18"));
        assert_eq!(conflict.incoming_version, 8);

        session.accept_incoming(STR).unwrap();
        assert_eq!(stored(&session, STR), FieldValue::text("18"));
        assert_eq!(session.current_version(), 8);
    }

    #[test]
    fn keep_local_restores_pending_until_echo() {
        let mut session = session();
        session.record_pending(STR, FieldValue::text("12"));
        session
            .apply_incoming(&update(&session, STR, FieldValue::text("14"), 6, "dm1"))
            .unwrap();

        let local = session.finish_keep_local(STR).unwrap();
        assert_eq!(local, FieldValue::text("12"));
        assert!(session.conflicts().is_empty());
        assert_eq!(stored(&session, STR), FieldValue::text("10"));
        assert_eq!(session.pending().peek(STR), Some(&FieldValue::text("12")));

        session
            .apply_incoming(&update(&session, STR, FieldValue::text("12"), 7, "player-1"))
            .unwrap();
        assert_eq!(stored(&session, STR), FieldValue::text("12"));
        assert_eq!(session.current_version(), 7);
        assert!(session.pending().is_empty());
    }

    #[test]
    fn editing_conflicted_field_replaces_local_side() {
        let mut session = session();
        session.record_pending(STR, FieldValue::text("12"));
        session
            .apply_incoming(&update(&session, STR, FieldValue::text("14"), 6, "dm1"))
            .unwrap();

        assert!(session.record_pending(STR, FieldValue::text("13")));
        assert_eq!(
            session.conflicts().get(STR).unwrap().local_value,
            FieldValue::text("13")
        );

        let outcome = session
            .apply_incoming(&update(&session, STR, FieldValue::text("13"), 7, "player-1"))
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::ConflictSettled(STR));
        assert!(session.conflicts().is_empty());
        assert!(session.pending().is_empty());
        assert_eq!(stored(&session, STR), FieldValue::text("13"));
    }

    #[test]
    fn server_conflict_needs_pending_edit() {
        let mut session = session();
        let report = ServerConflict {
            document_id: session.document_id(),
            path: STR,
            current_value: FieldValue::text("14"),
            current_editor: "dm1".to_string(),
            current_version: 6,
            changed_at: Utc::now(),
            rejected_value: FieldValue::text("12"),
        };

        assert_eq!(
            session.apply_server_conflict(&report).unwrap(),
            UpdateOutcome::Discarded
        );

        session.record_pending(STR, FieldValue::text("12"));
        assert_eq!(
            session.apply_server_conflict(&report).unwrap(),
            UpdateOutcome::ConflictRaised(STR)
        );
        assert_eq!(
            session.conflicts().get(STR).unwrap().local_value,
            FieldValue::text("12")
        );
    }

    #[test]
    fn check_edit_enforces_lock_and_shape() {
        let session = session();

        assert!(matches!(
            session.check_edit(NOTES, &FieldValue::text("x"), Role::Player),
            Err(Error::FieldLocked(_))
        ));
        assert!(session
            .check_edit(NOTES, &FieldValue::text("x"), Role::DungeonMaster)
            .is_ok());
        assert!(matches!(
            session.check_edit(DEX, &FieldValue::text("x"), Role::Player),
            Err(Error::InvalidValue { .. })
        ));
        assert!(matches!(
            session.check_edit(FieldPath::new(4, 0), &FieldValue::text("x"), Role::Player),
            Err(Error::FieldNotFound(_))
        ));
    }

    #[test]
    fn accept_without_conflict_fails() {
        let mut session = session();
        assert!(matches!(session.accept_incoming(STR), Err(Error::NoConflict)));
        assert!(matches!(session.finish_keep_local(STR), Err(Error::NoConflict)));
    }
}
