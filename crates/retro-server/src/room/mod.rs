//! Per-session room coordinator.
//!
//! One coordinator task owns one retrospective's mutable state. Inbound
//! messages arrive through an mpsc inbox and are handled one at a time to
//! completion; handlers are synchronous (blocking store access), so a
//! budget check and its vote insert can never interleave with another
//! message for the same room.

mod grouping;
mod typing;
mod views;
mod voting;

use std::sync::Arc;

use tokio::sync::mpsc;

use retro_core::ids::{RetroId, VisitorId};
use retro_core::model::{Attachment, Column, Item, Participant, DEFAULT_RETRO_NAME};
use retro_core::phase::Phase;
use retro_core::protocol::{ClientMessage, ServerMessage};

use retro_store::items::ItemRepo;
use retro_store::retros::{RetroRepo, RetroRow};
use retro_store::Database;

use crate::client::{ClientId, ClientRegistry};
use crate::error::RoomError;

/// Events delivered to a room's inbox.
#[derive(Debug)]
pub enum RoomEvent {
    /// A raw text frame from a connection.
    Inbound { client: ClientId, text: String },
    /// The connection closed.
    Disconnected { client: ClientId },
}

/// Whether the coordinator keeps running after handling an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Shutdown,
}

pub struct RoomCoordinator {
    retro_id: RetroId,
    db: Database,
    registry: Arc<ClientRegistry>,
}

impl RoomCoordinator {
    pub fn new(retro_id: RetroId, db: Database, registry: Arc<ClientRegistry>) -> Self {
        Self {
            retro_id,
            db,
            registry,
        }
    }

    /// Drain the inbox until shutdown (session deletion) or until every
    /// sender is gone.
    pub async fn run(self, mut inbox: mpsc::Receiver<RoomEvent>) {
        while let Some(event) = inbox.recv().await {
            if self.handle(event) == Flow::Shutdown {
                break;
            }
        }
        tracing::debug!(retro_id = %self.retro_id, "room coordinator retired");
    }

    /// Handle one event to completion.
    pub(crate) fn handle(&self, event: RoomEvent) -> Flow {
        match event {
            RoomEvent::Inbound { client, text } => {
                let message = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => message,
                    Err(error) => {
                        tracing::debug!(retro_id = %self.retro_id, client_id = %client, %error, "undecodable message");
                        self.send(
                            &client,
                            &ServerMessage::Error {
                                message: "Invalid message format".into(),
                            },
                        );
                        return Flow::Continue;
                    }
                };

                match self.dispatch(&client, message) {
                    Ok(flow) => flow,
                    Err(error) => {
                        tracing::debug!(
                            retro_id = %self.retro_id,
                            client_id = %client,
                            kind = error.kind(),
                            %error,
                            "operation rejected"
                        );
                        self.send(
                            &client,
                            &ServerMessage::Error {
                                message: error.to_string(),
                            },
                        );
                        Flow::Continue
                    }
                }
            }
            RoomEvent::Disconnected { client } => {
                self.handle_leave(&client);
                Flow::Continue
            }
        }
    }

    fn dispatch(&self, client: &ClientId, message: ClientMessage) -> Result<Flow, RoomError> {
        match message {
            ClientMessage::Join {
                name,
                visitor_id,
                retro_name,
            } => self.handle_join(client, name, visitor_id, retro_name)?,
            ClientMessage::AddItem { column, text } => self.handle_add_item(client, column, text)?,
            ClientMessage::Vote { item_id } => self.handle_vote(client, item_id)?,
            ClientMessage::Unvote { item_id } => self.handle_unvote(client, item_id)?,
            ClientMessage::VoteGroup { group_id } => self.handle_vote_group(client, group_id)?,
            ClientMessage::UnvoteGroup { group_id } => {
                self.handle_unvote_group(client, group_id)?
            }
            ClientMessage::SetPhase { phase } => self.handle_set_phase(client, phase)?,
            ClientMessage::UpdateRetroName { name } => self.handle_rename(client, name)?,
            ClientMessage::DeleteRetro => {
                self.handle_delete(client)?;
                return Ok(Flow::Shutdown);
            }
            ClientMessage::GroupItems { item_ids, title } => {
                self.handle_group_items(client, item_ids, title)?
            }
            ClientMessage::Ungroup { group_id } => self.handle_ungroup(client, group_id)?,
            ClientMessage::UpdateGroupTitle { group_id, title } => {
                self.handle_update_group_title(client, group_id, title)?
            }
            ClientMessage::Typing { column, is_typing } => {
                self.handle_typing(client, column, is_typing)?
            }
        }
        Ok(Flow::Continue)
    }

    // ── Join / leave ──

    fn handle_join(
        &self,
        client: &ClientId,
        name: String,
        visitor_id: Option<VisitorId>,
        retro_name: Option<String>,
    ) -> Result<(), RoomError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(RoomError::Validation("Display name is required".into()));
        }

        let retros = RetroRepo::new(self.db.clone());
        // Keep the supplied identity on reconnect, otherwise mint one.
        let visitor_id = visitor_id.unwrap_or_default();
        let mut is_facilitator = false;

        let retro = match retros.find(&self.retro_id)? {
            Some(mut retro) => {
                if retro.facilitator_id == visitor_id.as_str() {
                    // Reconnecting as the facilitator
                    is_facilitator = true;
                } else if retro.facilitator_id.is_empty() {
                    // First joiner after front-door creation
                    is_facilitator = true;
                    retros.set_facilitator(&self.retro_id, visitor_id.as_str())?;
                    retro.facilitator_id = visitor_id.as_str().to_string();
                }
                retro
            }
            None => {
                // Fallback: direct URL access without the front door
                is_facilitator = true;
                let retro_name = retro_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .unwrap_or(DEFAULT_RETRO_NAME);
                retros.create_with_facilitator(&self.retro_id, retro_name, visitor_id.as_str())?
            }
        };

        self.registry.attach(
            client,
            Attachment {
                visitor_id: visitor_id.clone(),
                visitor_name: name.clone(),
                is_facilitator,
                typing_in: None,
                retro_id: self.retro_id.clone(),
            },
        );

        let participants = self.registry.participants(&self.retro_id);
        let items = self.items_for(&retro, &visitor_id)?;
        let groups = self.groups_for(&retro, &visitor_id)?;
        let votes_remaining = self.votes_remaining(&visitor_id)?;

        self.send(
            client,
            &ServerMessage::State {
                retro: views::retro_view(&retro),
                participants,
                items,
                groups,
                visitor_id: visitor_id.clone(),
                votes_remaining,
            },
        );

        self.broadcast(
            &ServerMessage::ParticipantJoined {
                participant: Participant {
                    id: visitor_id,
                    name,
                    is_facilitator,
                    is_connected: true,
                },
            },
            Some(client),
        );

        tracing::info!(retro_id = %self.retro_id, client_id = %client, "participant joined");
        Ok(())
    }

    fn handle_leave(&self, client: &ClientId) {
        let attachment = self.registry.attachment(client);
        self.registry.unregister(client);

        if let Some(attachment) = attachment {
            // Typing indicators first, so boards update before the roster does
            if attachment.typing_in.is_some() {
                let activity = self.registry.typing_activity(&self.retro_id);
                self.broadcast(&ServerMessage::TypingActivity { activity }, None);
            }
            self.broadcast(
                &ServerMessage::ParticipantLeft {
                    visitor_id: attachment.visitor_id,
                },
                None,
            );
        }
        tracing::debug!(retro_id = %self.retro_id, client_id = %client, "connection closed");
    }

    // ── Items ──

    fn handle_add_item(
        &self,
        client: &ClientId,
        column: Column,
        text: String,
    ) -> Result<(), RoomError> {
        let _attachment = self.attachment(client)?;
        let retro = self.retro()?;
        self.require_phase(&retro, Phase::Adding, "Cannot add items in current phase")?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(RoomError::Validation("Item text is required".into()));
        }

        let row = ItemRepo::new(self.db.clone()).insert(&self.retro_id, column, &text)?;

        let item = Item {
            id: row.id,
            retro_id: row.retro_id,
            column: row.column,
            text: row.text,
            votes: 0,
            voted_by_me: false,
            created_at: row.created_at,
            group_id: None,
        };
        self.broadcast(&ServerMessage::ItemAdded { item }, None);
        Ok(())
    }

    // ── Session lifecycle ──

    fn handle_set_phase(&self, client: &ClientId, phase: Phase) -> Result<(), RoomError> {
        self.require_facilitator(client, "Only facilitator can change phase")?;
        let retro = self.retro()?;

        if !retro.phase.can_advance(phase) {
            return Err(RoomError::StateViolation("Invalid phase transition"));
        }

        RetroRepo::new(self.db.clone()).set_phase(&self.retro_id, phase)?;

        if phase != Phase::Adding {
            self.clear_typing_on_phase_exit();
        }

        let (items, groups) = if phase.reveals_board() {
            (self.board_items()?, self.board_groups()?)
        } else {
            (Vec::new(), Vec::new())
        };
        self.broadcast(&ServerMessage::PhaseChanged { phase, items, groups }, None);

        tracing::info!(retro_id = %self.retro_id, phase = %phase, "phase changed");
        Ok(())
    }

    fn handle_rename(&self, client: &ClientId, name: String) -> Result<(), RoomError> {
        self.require_facilitator(client, "Only facilitator can rename retro")?;
        let _retro = self.retro()?;

        let name = {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                DEFAULT_RETRO_NAME.to_string()
            } else {
                trimmed.to_string()
            }
        };

        RetroRepo::new(self.db.clone()).set_name(&self.retro_id, &name)?;
        self.broadcast(&ServerMessage::RetroNameUpdated { name }, None);
        Ok(())
    }

    fn handle_delete(&self, client: &ClientId) -> Result<(), RoomError> {
        self.require_facilitator(client, "Only facilitator can delete retro")?;
        let _retro = self.retro()?;

        RetroRepo::new(self.db.clone()).delete(&self.retro_id)?;

        // Queue the notice on every connection before closing them, so
        // clients can tell deletion from a network error.
        self.broadcast(&ServerMessage::RetroDeleted, None);
        let closed = self.registry.close_room(&self.retro_id);

        tracing::info!(retro_id = %self.retro_id, closed = closed, "retro deleted");
        Ok(())
    }

    // ── Shared helpers ──

    fn send(&self, client: &ClientId, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(json) => {
                self.registry.send_to(client, json);
            }
            Err(error) => {
                tracing::error!(retro_id = %self.retro_id, %error, "failed to encode outbound message");
            }
        }
    }

    fn broadcast(&self, message: &ServerMessage, exclude: Option<&ClientId>) {
        match serde_json::to_string(message) {
            Ok(json) => self.registry.broadcast(&self.retro_id, &json, exclude),
            Err(error) => {
                tracing::error!(retro_id = %self.retro_id, %error, "failed to encode broadcast");
            }
        }
    }

    fn attachment(&self, client: &ClientId) -> Result<Attachment, RoomError> {
        self.registry.attachment(client).ok_or(RoomError::NotJoined)
    }

    fn require_facilitator(
        &self,
        client: &ClientId,
        denial: &'static str,
    ) -> Result<Attachment, RoomError> {
        let attachment = self.attachment(client)?;
        if attachment.is_facilitator {
            Ok(attachment)
        } else {
            Err(RoomError::Unauthorized(denial))
        }
    }

    fn retro(&self) -> Result<RetroRow, RoomError> {
        RetroRepo::new(self.db.clone())
            .find(&self.retro_id)?
            .ok_or(RoomError::NotFound("Retro not found"))
    }

    fn require_phase(
        &self,
        retro: &RetroRow,
        phase: Phase,
        denial: &'static str,
    ) -> Result<(), RoomError> {
        if retro.phase == phase {
            Ok(())
        } else {
            Err(RoomError::StateViolation(denial))
        }
    }
}
