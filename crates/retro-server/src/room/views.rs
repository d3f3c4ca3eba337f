//! Derived item/group views.
//!
//! Vote counts are always recomputed from vote rows; nothing aggregate is
//! stored. During the `voting` phase a participant's snapshot hides other
//! people's counts (they read as zero) while `votedByMe` stays truthful.
//! Room-wide board views carry real counts sorted descending.

use retro_core::ids::{GroupId, VisitorId};
use retro_core::model::{Item, ItemGroup, Retro, VOTE_BUDGET};
use retro_core::phase::Phase;

use retro_store::groups::{GroupRepo, GroupRow};
use retro_store::items::{ItemRepo, ItemRow};
use retro_store::retros::RetroRow;
use retro_store::votes::VoteRepo;

use crate::error::RoomError;
use crate::room::RoomCoordinator;

pub(crate) fn retro_view(row: &RetroRow) -> Retro {
    Retro {
        id: row.id.clone(),
        name: row.name.clone(),
        created_at: row.created_at.clone(),
        facilitator_id: row.facilitator_id.clone(),
        phase: row.phase,
    }
}

impl RoomCoordinator {
    fn item_view(
        &self,
        row: ItemRow,
        viewer: Option<&VisitorId>,
        hide_votes: bool,
    ) -> Result<Item, RoomError> {
        let votes_repo = VoteRepo::new(self.db.clone());
        let votes = if hide_votes {
            0
        } else {
            votes_repo.count(row.id.as_str())?
        };
        let voted_by_me = match viewer {
            Some(viewer) => votes_repo.count_by(row.id.as_str(), viewer.as_str())? > 0,
            None => false,
        };

        Ok(Item {
            id: row.id,
            retro_id: row.retro_id,
            column: row.column,
            text: row.text,
            votes,
            voted_by_me,
            created_at: row.created_at,
            group_id: row.group_id,
        })
    }

    fn group_view_with(
        &self,
        row: GroupRow,
        viewer: Option<&VisitorId>,
        hide_votes: bool,
    ) -> Result<ItemGroup, RoomError> {
        let members = ItemRepo::new(self.db.clone()).list_group(&row.id)?;
        let mut items = Vec::with_capacity(members.len());
        for member in members {
            items.push(self.item_view(member, viewer, hide_votes)?);
        }

        let votes_repo = VoteRepo::new(self.db.clone());
        let votes = if hide_votes {
            0
        } else {
            // Ballot votes plus member item votes, derived every time
            votes_repo.count(row.id.as_str())? + items.iter().map(|i| i.votes).sum::<u32>()
        };
        let voted_by_me = match viewer {
            Some(viewer) => votes_repo.count_by(row.id.as_str(), viewer.as_str())? > 0,
            None => false,
        };

        Ok(ItemGroup {
            id: row.id,
            retro_id: row.retro_id,
            column: row.column,
            title: row.title,
            items,
            votes,
            voted_by_me,
            created_at: row.created_at,
        })
    }

    /// Items as the joining participant sees them.
    pub(crate) fn items_for(
        &self,
        retro: &RetroRow,
        viewer: &VisitorId,
    ) -> Result<Vec<Item>, RoomError> {
        let hide_votes = retro.phase == Phase::Voting;
        ItemRepo::new(self.db.clone())
            .list(&self.retro_id)?
            .into_iter()
            .map(|row| self.item_view(row, Some(viewer), hide_votes))
            .collect()
    }

    /// Groups as the joining participant sees them.
    pub(crate) fn groups_for(
        &self,
        retro: &RetroRow,
        viewer: &VisitorId,
    ) -> Result<Vec<ItemGroup>, RoomError> {
        let hide_votes = retro.phase == Phase::Voting;
        GroupRepo::new(self.db.clone())
            .list(&self.retro_id)?
            .into_iter()
            .map(|row| self.group_view_with(row, Some(viewer), hide_votes))
            .collect()
    }

    /// Room-wide item list with real counts, highest-voted first.
    /// The stable sort keeps creation order among ties.
    pub(crate) fn board_items(&self) -> Result<Vec<Item>, RoomError> {
        let mut items: Vec<Item> = ItemRepo::new(self.db.clone())
            .list(&self.retro_id)?
            .into_iter()
            .map(|row| self.item_view(row, None, false))
            .collect::<Result<_, _>>()?;
        items.sort_by(|a, b| b.votes.cmp(&a.votes));
        Ok(items)
    }

    /// Room-wide group list with derived sums, highest-voted first.
    pub(crate) fn board_groups(&self) -> Result<Vec<ItemGroup>, RoomError> {
        let mut groups: Vec<ItemGroup> = GroupRepo::new(self.db.clone())
            .list(&self.retro_id)?
            .into_iter()
            .map(|row| self.group_view_with(row, None, false))
            .collect::<Result<_, _>>()?;
        groups.sort_by(|a, b| b.votes.cmp(&a.votes));
        Ok(groups)
    }

    /// Full room-wide view of one group.
    pub(crate) fn group_view(&self, group_id: &GroupId) -> Result<ItemGroup, RoomError> {
        let row = GroupRepo::new(self.db.clone())
            .find(group_id, &self.retro_id)?
            .ok_or(RoomError::NotFound("Group not found"))?;
        self.group_view_with(row, None, false)
    }

    /// Derived vote aggregate for a group: ballot votes + member item votes.
    pub(crate) fn group_votes(&self, group_id: &GroupId) -> Result<u32, RoomError> {
        let votes_repo = VoteRepo::new(self.db.clone());
        let mut total = votes_repo.count(group_id.as_str())?;
        for member in ItemRepo::new(self.db.clone()).list_group(group_id)? {
            total += votes_repo.count(member.id.as_str())?;
        }
        Ok(total)
    }

    pub(crate) fn votes_remaining(&self, visitor: &VisitorId) -> Result<u32, RoomError> {
        let used = VoteRepo::new(self.db.clone()).used(&self.retro_id, visitor.as_str())?;
        Ok(VOTE_BUDGET.saturating_sub(used))
    }
}
