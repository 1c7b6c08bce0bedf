//! Collaborator-facing sync client for one user.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::session::{SheetSession, UpdateOutcome};
use super::transport::{ServerEvent, SubmitError, Transport};
use super::PendingChanges;
use crate::config::{ResubmitPolicy, SyncConfig};
use crate::error::{Error, Result};
use crate::models::{
    Conflict, Document, EditEvent, EditRequest, FieldPath, FieldValue, IncomingUpdate,
    ServerConflict,
};
use crate::state::ConnectionState;

/// Result of a successful [`SyncClient::submit_field_edit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditReceipt {
    pub path: FieldPath,
    pub expected_version: Option<u64>,
    /// The field had an open conflict whose local side was replaced
    pub replaced_conflict: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// Local value sent again; the sheet changes when its echo arrives
    Resubmitted {
        path: FieldPath,
        expected_version: Option<u64>,
    },
    /// Remote value written to the sheet
    AcceptedIncoming(EditEvent),
}

/// Snapshot for sync indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub connection: ConnectionState,
    pub version: Option<u64>,
    pub pending: usize,
    pub conflicts: usize,
    pub last_applied_at: Option<DateTime<Utc>>,
}

/// Drives one user's editing of at most one open sheet.
///
/// All mutation goes through `&mut self`, so events are handled strictly
/// one at a time in the order the caller delivers them.
pub struct SyncClient<T: Transport> {
    transport: T,
    config: SyncConfig,
    session: Option<SheetSession>,
}

impl<T: Transport> SyncClient<T> {
    pub const fn new(transport: T, config: SyncConfig) -> Self {
        Self {
            transport,
            config,
            session: None,
        }
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Open `document`, replacing whatever was open.
    ///
    /// Pending edits and conflicts of the previous sheet are dropped with
    /// its session.
    pub fn load_document(&mut self, document: Document) -> Result<()> {
        document.validate()?;

        if let Some(previous) = self.session.take() {
            tracing::info!(
                document = %previous.document_id(),
                dropped_pending = previous.pending().len(),
                dropped_conflicts = previous.conflicts().len(),
                "Closing sheet"
            );
        }
        tracing::info!(
            document = %document.id,
            version = document.version,
            editor = %self.config.editor,
            "Opened sheet"
        );
        self.session = Some(SheetSession::open(
            document,
            self.config.editor.clone(),
            self.config.history_limit,
        ));
        Ok(())
    }

    pub fn close_document(&mut self) -> Option<Document> {
        self.session.take().map(SheetSession::into_document)
    }

    pub const fn session(&self) -> Option<&SheetSession> {
        self.session.as_ref()
    }

    pub fn document(&self) -> Option<&Document> {
        self.session.as_ref().map(SheetSession::document)
    }

    /// Conflict to show when only one can be displayed.
    pub fn conflict(&self) -> Option<&Conflict> {
        self.session
            .as_ref()
            .and_then(|session| session.conflicts().active())
    }

    pub fn conflicts(&self) -> &[Conflict] {
        self.session
            .as_ref()
            .map(|session| session.conflicts().as_slice())
            .unwrap_or_default()
    }

    pub fn pending(&self) -> Option<&PendingChanges> {
        self.session.as_ref().map(SheetSession::pending)
    }

    pub fn history(&self) -> impl Iterator<Item = &EditEvent> {
        self.session
            .iter()
            .flat_map(|session| session.history().iter())
    }

    pub fn status(&self) -> SyncStatus {
        let session = self.session.as_ref();
        SyncStatus {
            connection: self.transport.connection_state(),
            version: session.map(SheetSession::current_version),
            pending: session.map_or(0, |session| session.pending().len()),
            conflicts: session.map_or(0, |session| session.conflicts().len()),
            last_applied_at: session.and_then(SheetSession::last_applied_at),
        }
    }

    pub fn handle_event(&mut self, event: &ServerEvent) -> Result<UpdateOutcome> {
        match event {
            ServerEvent::Updated(update) => self.apply_incoming(update),
            ServerEvent::Conflict(report) => self.apply_server_conflict(report),
        }
    }

    pub fn apply_incoming(&mut self, update: &IncomingUpdate) -> Result<UpdateOutcome> {
        match self.session.as_mut() {
            Some(session) => session.apply_incoming(update),
            None => {
                tracing::debug!(document = %update.document_id, "Discarding update; no sheet open");
                Ok(UpdateOutcome::Discarded)
            }
        }
    }

    pub fn apply_server_conflict(&mut self, report: &ServerConflict) -> Result<UpdateOutcome> {
        match self.session.as_mut() {
            Some(session) => session.apply_server_conflict(report),
            None => Ok(UpdateOutcome::Discarded),
        }
    }

    /// Send a local edit to the server and track it as pending.
    ///
    /// Nothing is recorded when the transport is down. When the server
    /// refuses the edit the pending value is kept so it can be retried.
    pub async fn submit_field_edit(
        &mut self,
        path: FieldPath,
        value: FieldValue,
    ) -> Result<EditReceipt> {
        let session = self.session.as_mut().ok_or(Error::NoActiveDocument)?;
        session.check_edit(path, &value, self.config.role)?;

        if !self.transport.is_connected() {
            tracing::warn!(path = %path, "Edit rejected; transport not connected");
            return Err(Error::NotConnected);
        }

        let expected_version = self
            .config
            .send_expected_version
            .then(|| session.current_version());
        let request = EditRequest {
            document_id: session.document_id(),
            path,
            value: value.clone(),
            editor: self.config.editor.clone(),
            expected_version,
        };

        let submitted = self.transport.submit_edit(&request).await;
        if let Err(SubmitError::NotConnected) = submitted {
            tracing::warn!(path = %path, "Edit rejected; transport dropped during submit");
            return Err(Error::NotConnected);
        }

        let replaced_conflict = session.record_pending(path, value);
        if replaced_conflict {
            tracing::info!(path = %path, "Edit replaced local value of open conflict");
        }

        match submitted {
            Ok(()) => Ok(EditReceipt {
                path,
                expected_version,
                replaced_conflict,
            }),
            Err(error) => {
                tracing::warn!(path = %path, %error, "Edit submission failed; keeping pending value");
                Err(error.into())
            }
        }
    }

    /// Resolve the conflict shown by [`SyncClient::conflict`].
    pub async fn resolve_conflict(&mut self, keep_local: bool) -> Result<ResolveOutcome> {
        let path = self.conflict().ok_or(Error::NoConflict)?.path;
        self.resolve_conflict_at(path, keep_local).await
    }

    /// Resolve the conflict on `path`.
    ///
    /// Keeping the local value resubmits it; if that fails the conflict
    /// stays open and can be resolved again.
    pub async fn resolve_conflict_at(
        &mut self,
        path: FieldPath,
        keep_local: bool,
    ) -> Result<ResolveOutcome> {
        let session = self.session.as_mut().ok_or(Error::NoActiveDocument)?;

        if !keep_local {
            return session
                .accept_incoming(path)
                .map(ResolveOutcome::AcceptedIncoming);
        }

        let conflict = session.conflicts().get(path).ok_or(Error::NoConflict)?;
        if !self.transport.is_connected() {
            tracing::warn!(path = %path, "Cannot keep local value; transport not connected");
            return Err(Error::NotConnected);
        }

        let expected_version = match self.config.resubmit_policy {
            ResubmitPolicy::Override => None,
            ResubmitPolicy::Chained => Some(conflict.incoming_version),
        };
        let request = EditRequest {
            document_id: session.document_id(),
            path,
            value: conflict.local_value.clone(),
            editor: self.config.editor.clone(),
            expected_version,
        };

        if let Err(error) = self.transport.submit_edit(&request).await {
            tracing::warn!(path = %path, %error, "Resubmitting local value failed; conflict stays open");
            return Err(error.into());
        }

        session.finish_keep_local(path)?;
        Ok(ResolveOutcome::Resubmitted {
            path,
            expected_version,
        })
    }
}
