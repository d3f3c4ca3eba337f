//! Wire protocol for the room WebSocket: tagged unions with kebab-case
//! `type` discriminators and camelCase payload fields.

use serde::{Deserialize, Serialize};

use crate::ids::{GroupId, ItemId, VisitorId};
use crate::model::{Column, Item, ItemGroup, Participant, Retro, TypingActivity};
use crate::phase::Phase;

/// Client -> server messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Join {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        visitor_id: Option<VisitorId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retro_name: Option<String>,
    },
    AddItem {
        column: Column,
        text: String,
    },
    Vote {
        item_id: ItemId,
    },
    Unvote {
        item_id: ItemId,
    },
    VoteGroup {
        group_id: GroupId,
    },
    UnvoteGroup {
        group_id: GroupId,
    },
    SetPhase {
        phase: Phase,
    },
    UpdateRetroName {
        name: String,
    },
    DeleteRetro,
    GroupItems {
        item_ids: Vec<ItemId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Ungroup {
        group_id: GroupId,
    },
    UpdateGroupTitle {
        group_id: GroupId,
        title: String,
    },
    Typing {
        column: Column,
        is_typing: bool,
    },
}

/// Server -> client messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full snapshot, sent once to the joining connection.
    State {
        retro: Retro,
        participants: Vec<Participant>,
        items: Vec<Item>,
        groups: Vec<ItemGroup>,
        visitor_id: VisitorId,
        votes_remaining: u32,
    },
    ParticipantJoined {
        participant: Participant,
    },
    ParticipantLeft {
        visitor_id: VisitorId,
    },
    ItemAdded {
        item: Item,
    },
    VoteUpdated {
        item_id: ItemId,
        votes: u32,
        voted_by_me: bool,
        votes_remaining: u32,
    },
    GroupVoteUpdated {
        group_id: GroupId,
        votes: u32,
        voted_by_me: bool,
        votes_remaining: u32,
    },
    PhaseChanged {
        phase: Phase,
        items: Vec<Item>,
        groups: Vec<ItemGroup>,
    },
    RetroNameUpdated {
        name: String,
    },
    RetroDeleted,
    ItemsGrouped {
        group: ItemGroup,
    },
    ItemsUngrouped {
        group_id: GroupId,
        items: Vec<Item>,
    },
    GroupTitleUpdated {
        group_id: GroupId,
        title: String,
    },
    TypingActivity {
        activity: TypingActivity,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    /// Tag string, handy for logs and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::State { .. } => "state",
            Self::ParticipantJoined { .. } => "participant-joined",
            Self::ParticipantLeft { .. } => "participant-left",
            Self::ItemAdded { .. } => "item-added",
            Self::VoteUpdated { .. } => "vote-updated",
            Self::GroupVoteUpdated { .. } => "group-vote-updated",
            Self::PhaseChanged { .. } => "phase-changed",
            Self::RetroNameUpdated { .. } => "retro-name-updated",
            Self::RetroDeleted => "retro-deleted",
            Self::ItemsGrouped { .. } => "items-grouped",
            Self::ItemsUngrouped { .. } => "items-ungrouped",
            Self::GroupTitleUpdated { .. } => "group-title-updated",
            Self::TypingActivity { .. } => "typing-activity",
            Self::Error { .. } => "error",
        }
    }
}
