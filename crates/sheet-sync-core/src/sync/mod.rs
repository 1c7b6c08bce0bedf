//! Field-level optimistic-concurrency sync for an open sheet.
//!
//! Local edits are tracked as pending until the server's confirmed update
//! for the same field arrives. A confirmed update from someone else that
//! lands on a field with a pending local edit becomes a [`Conflict`] and is
//! held back until the user picks a side.
//!
//! [`Conflict`]: crate::models::Conflict

mod client;
mod conflicts;
mod history;
mod pending;
mod session;
mod store;
mod transport;

pub use client::{EditReceipt, ResolveOutcome, SyncClient, SyncStatus};
pub use conflicts::ConflictSet;
pub use history::EditHistory;
pub use pending::PendingChanges;
pub use session::{SheetSession, UpdateOutcome};
pub use store::DocumentStore;
pub use transport::{ServerEvent, SubmitError, Transport};
