//! Item grouping: create/extend groups, ungroup, retitle.
//!
//! Invariants maintained here: every item belongs to at most one group, and
//! no group row survives with zero members (emptied groups are deleted along
//! with their ballot votes).

use std::collections::HashSet;

use retro_core::ids::{GroupId, ItemId};
use retro_core::model::{Item, DEFAULT_GROUP_TITLE};
use retro_core::phase::Phase;
use retro_core::protocol::ServerMessage;

use retro_store::groups::GroupRepo;
use retro_store::items::{ItemRepo, ItemRow};
use retro_store::votes::VoteRepo;

use crate::client::ClientId;
use crate::error::RoomError;
use crate::room::RoomCoordinator;

impl RoomCoordinator {
    pub(crate) fn handle_group_items(
        &self,
        client: &ClientId,
        item_ids: Vec<ItemId>,
        title: Option<String>,
    ) -> Result<(), RoomError> {
        self.require_facilitator(client, "Only facilitator can group items")?;
        let retro = self.retro()?;
        self.require_phase(&retro, Phase::Grouping, "Can only group items in Grouping phase")?;

        // Dedupe while keeping the client's order; the first id decides
        // column and create-vs-extend.
        let mut seen = HashSet::new();
        let item_ids: Vec<ItemId> = item_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        if item_ids.len() < 2 {
            return Err(RoomError::Validation("Need at least 2 items to group".into()));
        }

        let items_repo = ItemRepo::new(self.db.clone());
        let mut rows = Vec::with_capacity(item_ids.len());
        for id in &item_ids {
            let row = items_repo
                .find(id, &self.retro_id)?
                .ok_or(RoomError::NotFound("Item not found"))?;
            rows.push(row);
        }

        let column = rows[0].column;
        if rows.iter().any(|row| row.column != column) {
            return Err(RoomError::Validation("Items must be in the same column".into()));
        }

        let title = title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let groups_repo = GroupRepo::new(self.db.clone());
        let old_groups: HashSet<GroupId> =
            rows.iter().filter_map(|row| row.group_id.clone()).collect();

        // A supplied title alongside an already-grouped first item means
        // "extend that group"; everything else creates a fresh one.
        let group_id = match (&rows[0].group_id, &title) {
            (Some(existing), Some(title)) => {
                groups_repo.set_title(existing, title)?;
                existing.clone()
            }
            _ => {
                let title = title.as_deref().unwrap_or(DEFAULT_GROUP_TITLE);
                groups_repo.insert(&self.retro_id, column, title)?.id
            }
        };

        items_repo.assign_group(&item_ids, &group_id, &self.retro_id)?;
        self.reap_empty_groups(old_groups.iter().filter(|g| **g != group_id))?;

        let group = self.group_view(&group_id)?;
        self.broadcast(&ServerMessage::ItemsGrouped { group }, None);
        Ok(())
    }

    pub(crate) fn handle_ungroup(
        &self,
        client: &ClientId,
        group_id: GroupId,
    ) -> Result<(), RoomError> {
        self.require_facilitator(client, "Only facilitator can ungroup items")?;
        let retro = self.retro()?;
        self.require_phase(&retro, Phase::Grouping, "Can only ungroup items in Grouping phase")?;

        let groups_repo = GroupRepo::new(self.db.clone());
        // A second ungroup of the same id lands here: not-found, state intact.
        groups_repo
            .find(&group_id, &self.retro_id)?
            .ok_or(RoomError::NotFound("Group not found"))?;

        let items_repo = ItemRepo::new(self.db.clone());
        let members = items_repo.list_group(&group_id)?;

        items_repo.clear_group(&group_id)?;
        VoteRepo::new(self.db.clone()).delete_for_target(group_id.as_str())?;
        groups_repo.delete(&group_id)?;

        // Member votes are untouched; the items are standalone again.
        let items = members
            .into_iter()
            .map(|row| self.standalone_view(row))
            .collect::<Result<Vec<_>, _>>()?;

        self.broadcast(&ServerMessage::ItemsUngrouped { group_id, items }, None);
        Ok(())
    }

    pub(crate) fn handle_update_group_title(
        &self,
        client: &ClientId,
        group_id: GroupId,
        title: String,
    ) -> Result<(), RoomError> {
        self.require_facilitator(client, "Only facilitator can rename groups")?;

        let groups_repo = GroupRepo::new(self.db.clone());
        groups_repo
            .find(&group_id, &self.retro_id)?
            .ok_or(RoomError::NotFound("Group not found"))?;

        let title = {
            let trimmed = title.trim();
            if trimmed.is_empty() {
                DEFAULT_GROUP_TITLE.to_string()
            } else {
                trimmed.to_string()
            }
        };

        groups_repo.set_title(&group_id, &title)?;
        self.broadcast(&ServerMessage::GroupTitleUpdated { group_id, title }, None);
        Ok(())
    }

    /// Delete every listed group that ended up with zero members, ballot
    /// votes included.
    fn reap_empty_groups<'a>(
        &self,
        candidates: impl Iterator<Item = &'a GroupId>,
    ) -> Result<(), RoomError> {
        let items_repo = ItemRepo::new(self.db.clone());
        let groups_repo = GroupRepo::new(self.db.clone());
        let votes_repo = VoteRepo::new(self.db.clone());

        for group_id in candidates {
            if items_repo.member_count(group_id)? == 0 {
                votes_repo.delete_for_target(group_id.as_str())?;
                groups_repo.delete(group_id)?;
                tracing::debug!(retro_id = %self.retro_id, group_id = %group_id, "reaped empty group");
            }
        }
        Ok(())
    }

    fn standalone_view(&self, row: ItemRow) -> Result<Item, RoomError> {
        let votes = VoteRepo::new(self.db.clone()).count(row.id.as_str())?;
        Ok(Item {
            id: row.id,
            retro_id: row.retro_id,
            column: row.column,
            text: row.text,
            votes,
            voted_by_me: false,
            created_at: row.created_at,
            group_id: None,
        })
    }
}
