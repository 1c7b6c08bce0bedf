//! In-memory sheet server.
//!
//! Hosts sheets, validates edits, assigns versions, and broadcasts
//! confirmed updates to subscribers. Used by tests and by the CLI's
//! simulation mode in place of a networked server.

mod loopback;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};

use crate::error::{Error, Result};
use crate::models::{
    Document, DocumentId, EditRequest, FieldPath, IncomingUpdate, ServerConflict, User,
};
use crate::sync::{ServerEvent, SubmitError};

pub use loopback::LoopbackTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// What the server did with an edit it received.
#[derive(Debug, Clone, PartialEq)]
pub enum EditVerdict {
    /// Written and broadcast at this version
    Accepted { version: u64 },
    /// Precondition failed; the originator was sent a conflict report
    Refused(ServerConflict),
}

struct HostedSheet {
    document: Document,
    /// Version at which each field last changed on this server
    field_versions: HashMap<FieldPath, u64>,
    subscribers: BTreeSet<SubscriberId>,
}

struct Subscriber {
    user: User,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

/// Server-side state. Wrap in [`SharedAuthority`] to share between clients.
pub struct Authority {
    sheets: HashMap<DocumentId, HostedSheet>,
    subscribers: HashMap<SubscriberId, Subscriber>,
    next_subscriber: u64,
    enforce_preconditions: bool,
}

impl Default for Authority {
    fn default() -> Self {
        Self::new()
    }
}

impl Authority {
    pub fn new() -> Self {
        Self {
            sheets: HashMap::new(),
            subscribers: HashMap::new(),
            next_subscriber: 1,
            enforce_preconditions: true,
        }
    }

    /// Whether `expected_version` on edits is honoured (on by default).
    #[must_use]
    pub const fn with_preconditions(mut self, enforce: bool) -> Self {
        self.enforce_preconditions = enforce;
        self
    }

    pub fn host(&mut self, document: Document) -> Result<DocumentId> {
        document.validate()?;
        let id = document.id;
        tracing::info!(document = %id, version = document.version, "Hosting sheet");
        self.sheets.insert(
            id,
            HostedSheet {
                document,
                field_versions: HashMap::new(),
                subscribers: BTreeSet::new(),
            },
        );
        Ok(id)
    }

    pub fn fetch(&self, id: DocumentId) -> Result<Document> {
        self.sheets
            .get(&id)
            .map(|sheet| sheet.document.clone())
            .ok_or(Error::DocumentNotFound(id))
    }

    pub fn connect(&mut self, user: User) -> (SubscriberId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        tracing::debug!(subscriber = %id, user = %user.username, "Client connected");
        self.subscribers.insert(id, Subscriber { user, sender });
        (id, receiver)
    }

    pub fn disconnect(&mut self, id: SubscriberId) {
        self.subscribers.remove(&id);
        for sheet in self.sheets.values_mut() {
            sheet.subscribers.remove(&id);
        }
    }

    /// Subscribe to live updates and return the current snapshot.
    pub fn subscribe(&mut self, id: SubscriberId, document_id: DocumentId) -> Result<Document> {
        if !self.subscribers.contains_key(&id) {
            return Err(Error::NotConnected);
        }
        let sheet = self
            .sheets
            .get_mut(&document_id)
            .ok_or(Error::DocumentNotFound(document_id))?;
        sheet.subscribers.insert(id);
        Ok(sheet.document.clone())
    }

    pub fn unsubscribe(&mut self, id: SubscriberId, document_id: DocumentId) {
        if let Some(sheet) = self.sheets.get_mut(&document_id) {
            sheet.subscribers.remove(&id);
        }
    }

    /// Validate and apply one edit from `origin`.
    ///
    /// The editor recorded on the update is the connected user's name, not
    /// whatever the request claims.
    pub fn submit(
        &mut self,
        origin: SubscriberId,
        request: &EditRequest,
    ) -> std::result::Result<EditVerdict, SubmitError> {
        let user = self
            .subscribers
            .get(&origin)
            .map(|subscriber| subscriber.user.clone())
            .ok_or(SubmitError::NotConnected)?;
        let sheet = self
            .sheets
            .get_mut(&request.document_id)
            .ok_or_else(|| SubmitError::Rejected(format!("unknown sheet {}", request.document_id)))?;
        let field = sheet
            .document
            .field(request.path)
            .ok_or_else(|| SubmitError::Rejected(format!("unknown field {}", request.path)))?;

        if field.locked && !user.role.can_edit_locked() {
            return Err(SubmitError::Rejected(format!(
                "{} is locked by the Dungeon Master",
                request.path
            )));
        }
        field
            .check_value(&request.value)
            .map_err(SubmitError::Rejected)?;

        let changed_at = sheet.field_versions.get(&request.path).copied().unwrap_or(0);
        if let Some(expected) = request.expected_version {
            if self.enforce_preconditions && changed_at > expected {
                let report = ServerConflict {
                    document_id: request.document_id,
                    path: request.path,
                    current_value: field.value.clone(),
                    current_editor: field.last_edited_by.clone().unwrap_or_default(),
                    current_version: changed_at,
                    changed_at: field.last_edited_at.unwrap_or(sheet.document.updated_at),
                    rejected_value: request.value.clone(),
                };
                tracing::warn!(
                    document = %request.document_id,
                    path = %request.path,
                    expected,
                    changed_at,
                    editor = %user.username,
                    "Refused conditional edit"
                );
                self.send_to(origin, ServerEvent::Conflict(report.clone()));
                return Ok(EditVerdict::Refused(report));
            }
        }

        let version = sheet.document.version + 1;
        let edited_at = Utc::now();
        if let Some(field) = sheet.document.field_mut(request.path) {
            field.value = request.value.clone();
            field.last_edited_by = Some(user.username.clone());
            field.last_edited_at = Some(edited_at);
        }
        sheet.document.version = version;
        sheet.document.last_edited_by = Some(user.username.clone());
        sheet.document.updated_at = edited_at;
        sheet.field_versions.insert(request.path, version);

        let update = IncomingUpdate {
            document_id: request.document_id,
            path: request.path,
            value: request.value.clone(),
            edited_by: user.username,
            edited_at,
            version,
        };
        tracing::info!(
            document = %update.document_id,
            path = %update.path,
            version,
            editor = %update.edited_by,
            "Accepted edit"
        );

        let recipients = sheet.subscribers.iter().copied().collect::<Vec<_>>();
        for recipient in recipients {
            self.send_to(recipient, ServerEvent::Updated(update.clone()));
        }
        Ok(EditVerdict::Accepted { version })
    }

    fn send_to(&mut self, id: SubscriberId, event: ServerEvent) {
        let delivered = self
            .subscribers
            .get(&id)
            .is_some_and(|subscriber| subscriber.sender.send(event).is_ok());
        if !delivered {
            tracing::debug!(subscriber = %id, "Dropping closed subscriber");
            self.disconnect(id);
        }
    }
}

/// Cloneable handle to an [`Authority`] shared by several clients.
#[derive(Clone, Default)]
pub struct SharedAuthority {
    inner: Arc<Mutex<Authority>>,
}

impl SharedAuthority {
    pub fn new(authority: Authority) -> Self {
        Self {
            inner: Arc::new(Mutex::new(authority)),
        }
    }

    pub async fn host(&self, document: Document) -> Result<DocumentId> {
        self.inner.lock().await.host(document)
    }

    pub async fn fetch(&self, id: DocumentId) -> Result<Document> {
        self.inner.lock().await.fetch(id)
    }

    /// Connect `user` and return its transport plus the inbound event
    /// stream the caller must feed to the user's sync client.
    pub async fn connect(
        &self,
        user: User,
    ) -> (LoopbackTransport, mpsc::UnboundedReceiver<ServerEvent>) {
        let (id, receiver) = self.inner.lock().await.connect(user);
        (LoopbackTransport::new(self.clone(), id), receiver)
    }

    pub(crate) async fn subscribe(&self, id: SubscriberId, document_id: DocumentId) -> Result<Document> {
        self.inner.lock().await.subscribe(id, document_id)
    }

    pub(crate) async fn unsubscribe(&self, id: SubscriberId, document_id: DocumentId) {
        self.inner.lock().await.unsubscribe(id, document_id);
    }

    pub(crate) async fn submit(
        &self,
        origin: SubscriberId,
        request: &EditRequest,
    ) -> std::result::Result<EditVerdict, SubmitError> {
        self.inner.lock().await.submit(origin, request)
    }
}
