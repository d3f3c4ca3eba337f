//! Typing aggregation: each connection carries at most one typing column;
//! every change rebroadcasts the per-column counts for the room.

use retro_core::model::{Column, TypingActivity};
use retro_core::protocol::ServerMessage;

use crate::client::ClientId;
use crate::error::RoomError;
use crate::room::RoomCoordinator;

impl RoomCoordinator {
    pub(crate) fn handle_typing(
        &self,
        client: &ClientId,
        column: Column,
        is_typing: bool,
    ) -> Result<(), RoomError> {
        let _attachment = self.attachment(client)?;

        let typing_in = is_typing.then_some(column);
        if !self.registry.set_typing(client, typing_in) {
            // No change, nothing to rebroadcast
            return Ok(());
        }

        let activity = self.registry.typing_activity(&self.retro_id);
        self.broadcast(&ServerMessage::TypingActivity { activity }, None);
        Ok(())
    }

    /// Drive all typing indicators to zero when the session leaves `adding`.
    pub(crate) fn clear_typing_on_phase_exit(&self) {
        if self.registry.clear_typing(&self.retro_id) {
            self.broadcast(
                &ServerMessage::TypingActivity {
                    activity: TypingActivity::default(),
                },
                None,
            );
        }
    }
}
