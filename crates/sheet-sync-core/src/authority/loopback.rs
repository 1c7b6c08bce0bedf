//! Transport that talks to a [`SharedAuthority`] in the same process.

use super::{SharedAuthority, SubscriberId};
use crate::error::Result;
use crate::models::{Document, DocumentId, EditRequest};
use crate::state::ConnectionState;
use crate::sync::{SubmitError, Transport};

pub struct LoopbackTransport {
    authority: SharedAuthority,
    subscriber: SubscriberId,
    state: ConnectionState,
}

impl LoopbackTransport {
    pub(super) const fn new(authority: SharedAuthority, subscriber: SubscriberId) -> Self {
        Self {
            authority,
            subscriber,
            state: ConnectionState::Connected,
        }
    }

    pub const fn subscriber_id(&self) -> SubscriberId {
        self.subscriber
    }

    /// Simulate the link going up or down. Only outbound edits are
    /// affected.
    pub fn set_connection_state(&mut self, state: ConnectionState) {
        tracing::debug!(subscriber = %self.subscriber, state = state.label(), "Connection state changed");
        self.state = state;
    }

    /// Start receiving updates for a sheet and fetch its current snapshot.
    pub async fn open(&self, document_id: DocumentId) -> Result<Document> {
        self.authority.subscribe(self.subscriber, document_id).await
    }

    pub async fn close(&self, document_id: DocumentId) {
        self.authority
            .unsubscribe(self.subscriber, document_id)
            .await;
    }
}

impl Transport for LoopbackTransport {
    fn connection_state(&self) -> ConnectionState {
        self.state
    }

    async fn submit_edit(&mut self, request: &EditRequest) -> std::result::Result<(), SubmitError> {
        if self.state != ConnectionState::Connected {
            return Err(SubmitError::NotConnected);
        }
        self.authority
            .submit(self.subscriber, request)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::authority::Authority;
    use crate::config::{ResubmitPolicy, SyncConfig};
    use crate::models::{Field, FieldPath, FieldType, FieldValue, IncomingUpdate, Role, Section, User};
    use crate::sync::{ResolveOutcome, ServerEvent, SyncClient, UpdateOutcome};
    use crate::Error;

    const STR: FieldPath = FieldPath::new(0, 0);
    const NOTES: FieldPath = FieldPath::new(0, 1);

    type Client = SyncClient<LoopbackTransport>;

    fn sheet() -> Document {
        Document::new("player-1", "Brom")
            .with_section(Section::new(
                "abilities",
                "Abilities",
                vec![
                    Field::new("str", FieldType::Text, FieldValue::text("10")),
                    Field::new("notes", FieldType::MultilineText, FieldValue::text("")),
                ],
            ))
            .with_version(5)
    }

    async fn join(
        authority: &SharedAuthority,
        document_id: DocumentId,
        config: SyncConfig,
    ) -> (Client, UnboundedReceiver<ServerEvent>) {
        let user = User::new(config.editor.clone(), config.role);
        let (transport, events) = authority.connect(user).await;
        let snapshot = transport.open(document_id).await.unwrap();
        let mut client = SyncClient::new(transport, config);
        client.load_document(snapshot).unwrap();
        (client, events)
    }

    fn deliver(client: &mut Client, events: &mut UnboundedReceiver<ServerEvent>) -> Vec<UpdateOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(event) = events.try_recv() {
            outcomes.push(client.handle_event(&event).unwrap());
        }
        outcomes
    }

    fn stored(client: &Client, path: FieldPath) -> FieldValue {
        client.document().unwrap().field(path).unwrap().value.clone()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn last_writer_settles_conflict_without_preconditions() {
        let authority = SharedAuthority::new(Authority::new().with_preconditions(false));
        let doc = authority.host(sheet()).await.unwrap();
        let (mut player, mut player_rx) =
            join(&authority, doc, SyncConfig::for_editor("player-1", Role::Player)).await;
        let (mut dm, mut dm_rx) =
            join(&authority, doc, SyncConfig::for_editor("dm1", Role::DungeonMaster)).await;

        dm.submit_field_edit(STR, FieldValue::text("14")).await.unwrap();
        player
            .submit_field_edit(STR, FieldValue::text("12"))
            .await
            .unwrap();

        // dm's write first raises a conflict, then the player's own write
        // lands on top of it
        let outcomes = deliver(&mut player, &mut player_rx);
        assert_eq!(
            outcomes,
            vec![
                UpdateOutcome::ConflictRaised(STR),
                UpdateOutcome::ConflictSettled(STR)
            ]
        );
        assert_eq!(stored(&player, STR), FieldValue::text("12"));
        assert!(player.conflicts().is_empty());

        deliver(&mut dm, &mut dm_rx);
        assert_eq!(stored(&dm, STR), FieldValue::text("12"));
        assert_eq!(dm.status().version, Some(7));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn worked_example_accept_incoming() {
        let authority = SharedAuthority::default();
        let doc = authority.host(sheet()).await.unwrap();
        let (mut player, mut player_rx) =
            join(&authority, doc, SyncConfig::for_editor("player-1", Role::Player)).await;

        player
            .submit_field_edit(STR, FieldValue::text("12"))
            .await
            .unwrap();
        // a dm write reaching the player before its own echo
        let update = IncomingUpdate {
            document_id: doc,
            path: STR,
            value: FieldValue::text("14"),
            edited_by: "dm1".to_string(),
            edited_at: Utc::now(),
            version: 6,
        };
        assert_eq!(
            player.apply_incoming(&update).unwrap(),
            UpdateOutcome::ConflictRaised(STR)
        );
        assert_eq!(stored(&player, STR), FieldValue::text("10"));
        assert_eq!(player.status().version, Some(5));

        player.resolve_conflict(false).await.unwrap();
        assert_eq!(stored(&player, STR), FieldValue::text("14"));
        assert_eq!(player.status().version, Some(6));
        assert!(player.conflict().is_none());
        assert_eq!(player.pending().unwrap().peek(STR), None);

        // the player's own write echoes back at version 6 and is stale now
        let outcomes = deliver(&mut player, &mut player_rx);
        assert!(matches!(outcomes[..], [UpdateOutcome::Ignored { .. }]));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn keep_local_wins_after_round_trip() {
        let authority = SharedAuthority::default();
        let doc = authority.host(sheet()).await.unwrap();
        let (mut player, mut player_rx) =
            join(&authority, doc, SyncConfig::for_editor("player-1", Role::Player)).await;
        let (mut dm, mut dm_rx) =
            join(&authority, doc, SyncConfig::for_editor("dm1", Role::DungeonMaster)).await;

        dm.submit_field_edit(STR, FieldValue::text("14")).await.unwrap();
        // refused by the server: str changed at 6 after the player's 5
        player
            .submit_field_edit(STR, FieldValue::text("12"))
            .await
            .unwrap();

        let outcomes = deliver(&mut player, &mut player_rx);
        assert_eq!(
            outcomes,
            vec![
                UpdateOutcome::ConflictRaised(STR),
                UpdateOutcome::ConflictRefreshed(STR)
            ]
        );

        player.resolve_conflict(true).await.unwrap();
        assert_eq!(stored(&player, STR), FieldValue::text("10"));

        deliver(&mut player, &mut player_rx);
        deliver(&mut dm, &mut dm_rx);
        assert_eq!(stored(&player, STR), FieldValue::text("12"));
        assert_eq!(stored(&dm, STR), FieldValue::text("12"));
        assert_eq!(player.status().version, Some(7));
        assert_eq!(dm.status().version, Some(7));
        assert!(player.pending().unwrap().is_empty());
        assert_eq!(authority.fetch(doc).await.unwrap().version, 7);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn chained_resubmit_collides_with_third_writer() {
        let authority = SharedAuthority::default();
        let doc = authority.host(sheet()).await.unwrap();
        let chained = SyncConfig {
            resubmit_policy: ResubmitPolicy::Chained,
            ..SyncConfig::for_editor("player-1", Role::Player)
        };
        let unconditional = |editor: &str, role| SyncConfig {
            send_expected_version: false,
            ..SyncConfig::for_editor(editor, role)
        };
        let (mut player, mut player_rx) = join(&authority, doc, chained).await;
        let (mut dm, _dm_rx) = join(&authority, doc, unconditional("dm1", Role::DungeonMaster)).await;
        let (mut bard, _bard_rx) = join(&authority, doc, unconditional("bard", Role::Player)).await;

        dm.submit_field_edit(STR, FieldValue::text("14")).await.unwrap();
        player
            .submit_field_edit(STR, FieldValue::text("12"))
            .await
            .unwrap();
        deliver(&mut player, &mut player_rx);
        assert_eq!(player.conflict().unwrap().incoming_version, 6);

        // a third writer gets in before the player decides
        bard.submit_field_edit(STR, FieldValue::text("16")).await.unwrap();
        let outcome = player.resolve_conflict(true).await.unwrap();
        assert_eq!(
            outcome,
            ResolveOutcome::Resubmitted {
                path: STR,
                expected_version: Some(6)
            }
        );

        let outcomes = deliver(&mut player, &mut player_rx);
        assert_eq!(
            outcomes,
            vec![
                UpdateOutcome::ConflictRaised(STR),
                UpdateOutcome::ConflictRefreshed(STR)
            ]
        );
        let conflict = player.conflict().unwrap();
        assert_eq!(conflict.incoming_editor, "bard");
        assert_eq!(conflict.incoming_value, FieldValue::text("16"));
        assert_eq!(conflict.local_value, FieldValue::text("12"));
        assert_eq!(authority.fetch(doc).await.unwrap().version, 7);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn disconnected_client_cannot_edit() {
        let authority = SharedAuthority::default();
        let doc = authority.host(sheet()).await.unwrap();
        let (mut player, _rx) =
            join(&authority, doc, SyncConfig::for_editor("player-1", Role::Player)).await;

        player
            .transport_mut()
            .set_connection_state(ConnectionState::Disconnected);
        let result = player.submit_field_edit(NOTES, FieldValue::text("hi")).await;

        assert!(matches!(result, Err(Error::NotConnected)));
        assert!(player.pending().unwrap().is_empty());
        assert_eq!(player.status().connection, ConnectionState::Disconnected);
        assert_eq!(authority.fetch(doc).await.unwrap().version, 5);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn closed_sheet_stops_receiving_updates() {
        let authority = SharedAuthority::default();
        let doc = authority.host(sheet()).await.unwrap();
        let (player, mut player_rx) =
            join(&authority, doc, SyncConfig::for_editor("player-1", Role::Player)).await;
        let (mut dm, _dm_rx) =
            join(&authority, doc, SyncConfig::for_editor("dm1", Role::DungeonMaster)).await;

        player.transport().close(doc).await;
        dm.submit_field_edit(NOTES, FieldValue::text("ambush"))
            .await
            .unwrap();

        assert!(player_rx.try_recv().is_err());
    }
}
