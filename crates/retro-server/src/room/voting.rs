//! Voting engine: a fixed budget of 3 per participant per session, spent on
//! standalone items or group ballots. The budget read and the vote insert
//! run back to back inside one synchronous handler, so two votes from the
//! same participant can never both observe a non-exhausted budget.

use retro_core::ids::{GroupId, ItemId};
use retro_core::model::VOTE_BUDGET;
use retro_core::phase::Phase;
use retro_core::protocol::ServerMessage;

use retro_store::groups::GroupRepo;
use retro_store::items::ItemRepo;
use retro_store::votes::VoteRepo;

use crate::client::ClientId;
use crate::error::RoomError;
use crate::room::RoomCoordinator;

impl RoomCoordinator {
    pub(crate) fn handle_vote(&self, client: &ClientId, item_id: ItemId) -> Result<(), RoomError> {
        let attachment = self.attachment(client)?;
        let retro = self.retro()?;
        self.require_phase(&retro, Phase::Voting, "Cannot vote in current phase")?;

        let item = ItemRepo::new(self.db.clone())
            .find(&item_id, &self.retro_id)?
            .ok_or(RoomError::NotFound("Item not found"))?;
        if item.group_id.is_some() {
            // Grouped items are only votable through their group's ballot
            return Err(RoomError::StateViolation("Vote for the group, not its items"));
        }

        let votes_repo = VoteRepo::new(self.db.clone());
        let used = votes_repo.used(&self.retro_id, attachment.visitor_id.as_str())?;
        if used >= VOTE_BUDGET {
            return Err(RoomError::BudgetExceeded);
        }

        votes_repo.insert(item_id.as_str(), attachment.visitor_id.as_str())?;
        let votes = votes_repo.count(item_id.as_str())?;

        self.send(
            client,
            &ServerMessage::VoteUpdated {
                item_id,
                votes,
                voted_by_me: true,
                votes_remaining: VOTE_BUDGET - used - 1,
            },
        );
        Ok(())
    }

    pub(crate) fn handle_unvote(&self, client: &ClientId, item_id: ItemId) -> Result<(), RoomError> {
        let attachment = self.attachment(client)?;
        let retro = self.retro()?;
        self.require_phase(&retro, Phase::Voting, "Cannot unvote in current phase")?;

        let votes_repo = VoteRepo::new(self.db.clone());
        let removed = votes_repo.remove_one(item_id.as_str(), attachment.visitor_id.as_str())?;
        if !removed {
            return Err(RoomError::NotFound("No vote to remove"));
        }

        let votes = votes_repo.count(item_id.as_str())?;
        let mine = votes_repo.count_by(item_id.as_str(), attachment.visitor_id.as_str())?;
        let used = votes_repo.used(&self.retro_id, attachment.visitor_id.as_str())?;

        self.send(
            client,
            &ServerMessage::VoteUpdated {
                item_id,
                votes,
                voted_by_me: mine > 0,
                votes_remaining: VOTE_BUDGET.saturating_sub(used),
            },
        );
        Ok(())
    }

    pub(crate) fn handle_vote_group(
        &self,
        client: &ClientId,
        group_id: GroupId,
    ) -> Result<(), RoomError> {
        let attachment = self.attachment(client)?;
        let retro = self.retro()?;
        self.require_phase(&retro, Phase::Voting, "Cannot vote in current phase")?;

        GroupRepo::new(self.db.clone())
            .find(&group_id, &self.retro_id)?
            .ok_or(RoomError::NotFound("Group not found"))?;

        let votes_repo = VoteRepo::new(self.db.clone());
        let used = votes_repo.used(&self.retro_id, attachment.visitor_id.as_str())?;
        if used >= VOTE_BUDGET {
            return Err(RoomError::BudgetExceeded);
        }

        // The group's id doubles as its ballot target
        votes_repo.insert(group_id.as_str(), attachment.visitor_id.as_str())?;
        let votes = self.group_votes(&group_id)?;

        self.send(
            client,
            &ServerMessage::GroupVoteUpdated {
                group_id,
                votes,
                voted_by_me: true,
                votes_remaining: VOTE_BUDGET - used - 1,
            },
        );
        Ok(())
    }

    pub(crate) fn handle_unvote_group(
        &self,
        client: &ClientId,
        group_id: GroupId,
    ) -> Result<(), RoomError> {
        let attachment = self.attachment(client)?;
        let retro = self.retro()?;
        self.require_phase(&retro, Phase::Voting, "Cannot unvote in current phase")?;

        let votes_repo = VoteRepo::new(self.db.clone());
        let removed = votes_repo.remove_one(group_id.as_str(), attachment.visitor_id.as_str())?;
        if !removed {
            return Err(RoomError::NotFound("No vote to remove"));
        }

        let votes = self.group_votes(&group_id)?;
        let mine = votes_repo.count_by(group_id.as_str(), attachment.visitor_id.as_str())?;
        let used = votes_repo.used(&self.retro_id, attachment.visitor_id.as_str())?;

        self.send(
            client,
            &ServerMessage::GroupVoteUpdated {
                group_id,
                votes,
                voted_by_me: mine > 0,
                votes_remaining: VOTE_BUDGET.saturating_sub(used),
            },
        );
        Ok(())
    }
}
