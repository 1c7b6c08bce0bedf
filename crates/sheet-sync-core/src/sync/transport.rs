//! Seam between the sync core and whatever carries edits to the server.

use thiserror::Error;

use crate::models::{EditRequest, IncomingUpdate, ServerConflict};
use crate::state::ConnectionState;

/// Why an edit could not be handed to the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("server rejected edit: {0}")]
    Rejected(String),
}

impl From<SubmitError> for crate::Error {
    fn from(error: SubmitError) -> Self {
        match error {
            SubmitError::NotConnected => Self::NotConnected,
            SubmitError::Rejected(reason) => Self::SubmissionFailed(reason),
        }
    }
}

/// Events pushed by the server to subscribed clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Updated(IncomingUpdate),
    Conflict(ServerConflict),
}

/// Outbound half of a connection to the sheet server.
///
/// Implementations own reconnect and timeout policy. Inbound
/// [`ServerEvent`]s are delivered to [`super::SyncClient::handle_event`] by
/// whoever drives the connection.
#[allow(async_fn_in_trait)]
pub trait Transport {
    fn connection_state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Send one field edit. `Ok` means the server accepted the call; the
    /// confirmed update arrives later as a [`ServerEvent`].
    async fn submit_edit(&mut self, request: &EditRequest) -> Result<(), SubmitError>;
}
