use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use retro_core::ids::{RetroId, VoteId};

use crate::database::Database;
use crate::error::StoreError;

/// A single (target, participant) vote association. The target is either an
/// item id or a group id (the group's ballot).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoteRow {
    pub id: VoteId,
    pub item_id: String,
    pub participant_id: String,
    pub created_at: String,
}

pub struct VoteRepo {
    db: Database,
}

impl VoteRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(target = %target, participant = %participant))]
    pub fn insert(&self, target: &str, participant: &str) -> Result<VoteRow, StoreError> {
        let id = VoteId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO votes (id, item_id, participant_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id.as_str(), target, participant, now],
            )?;

            Ok(VoteRow {
                id,
                item_id: target.to_string(),
                participant_id: participant.to_string(),
                created_at: now.clone(),
            })
        })
    }

    /// Remove exactly one of this participant's votes on a target.
    /// Returns false when no such association exists.
    #[instrument(skip(self), fields(target = %target, participant = %participant))]
    pub fn remove_one(&self, target: &str, participant: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM votes WHERE id IN (
                    SELECT id FROM votes WHERE item_id = ?1 AND participant_id = ?2 LIMIT 1
                 )",
                rusqlite::params![target, participant],
            )?;
            Ok(removed > 0)
        })
    }

    /// Total votes on a target, across all participants.
    pub fn count(&self, target: &str) -> Result<u32, StoreError> {
        self.db.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM votes WHERE item_id = ?1",
                [target],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// This participant's votes on a target.
    pub fn count_by(&self, target: &str, participant: &str) -> Result<u32, StoreError> {
        self.db.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM votes WHERE item_id = ?1 AND participant_id = ?2",
                [target, participant],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Budget already spent by a participant in a session: vote rows whose
    /// target is one of the session's items or one of its group ballots.
    pub fn used(&self, retro_id: &RetroId, participant: &str) -> Result<u32, StoreError> {
        self.db.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM votes v
                 WHERE v.participant_id = ?1
                   AND (v.item_id IN (SELECT id FROM items WHERE retro_id = ?2)
                     OR v.item_id IN (SELECT id FROM item_groups WHERE retro_id = ?2))",
                rusqlite::params![participant, retro_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Drop all votes on a target (used when a group ballot dies with its group).
    #[instrument(skip(self), fields(target = %target))]
    pub fn delete_for_target(&self, target: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM votes WHERE item_id = ?1", [target])?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_core::model::Column;

    fn setup() -> (Database, RetroId) {
        let db = Database::in_memory().unwrap();
        let retro_id = RetroId::new();
        crate::retros::RetroRepo::new(db.clone())
            .create(&retro_id, "Test")
            .unwrap();
        (db, retro_id)
    }

    #[test]
    fn insert_and_count() {
        let (db, retro_id) = setup();
        let items = crate::items::ItemRepo::new(db.clone());
        let item = items.insert(&retro_id, Column::Start, "x").unwrap();

        let votes = VoteRepo::new(db);
        votes.insert(item.id.as_str(), "visitor_a").unwrap();
        votes.insert(item.id.as_str(), "visitor_b").unwrap();

        assert_eq!(votes.count(item.id.as_str()).unwrap(), 2);
        assert_eq!(votes.count_by(item.id.as_str(), "visitor_a").unwrap(), 1);
        assert_eq!(votes.count_by(item.id.as_str(), "visitor_c").unwrap(), 0);
    }

    #[test]
    fn remove_one_deletes_exactly_one() {
        let (db, retro_id) = setup();
        let items = crate::items::ItemRepo::new(db.clone());
        let item = items.insert(&retro_id, Column::Start, "x").unwrap();

        let votes = VoteRepo::new(db);
        votes.insert(item.id.as_str(), "visitor_a").unwrap();
        votes.insert(item.id.as_str(), "visitor_a").unwrap();

        assert!(votes.remove_one(item.id.as_str(), "visitor_a").unwrap());
        assert_eq!(votes.count(item.id.as_str()).unwrap(), 1);
    }

    #[test]
    fn remove_one_without_vote_returns_false() {
        let (db, retro_id) = setup();
        let items = crate::items::ItemRepo::new(db.clone());
        let item = items.insert(&retro_id, Column::Start, "x").unwrap();

        let votes = VoteRepo::new(db);
        assert!(!votes.remove_one(item.id.as_str(), "visitor_a").unwrap());
    }

    #[test]
    fn used_spans_items_and_group_ballots() {
        let (db, retro_id) = setup();
        let items = crate::items::ItemRepo::new(db.clone());
        let groups = crate::groups::GroupRepo::new(db.clone());
        let item = items.insert(&retro_id, Column::Start, "x").unwrap();
        let group = groups.insert(&retro_id, Column::Stop, "G").unwrap();

        let votes = VoteRepo::new(db);
        votes.insert(item.id.as_str(), "visitor_a").unwrap();
        votes.insert(group.id.as_str(), "visitor_a").unwrap();

        assert_eq!(votes.used(&retro_id, "visitor_a").unwrap(), 2);
        assert_eq!(votes.used(&retro_id, "visitor_b").unwrap(), 0);
    }

    #[test]
    fn used_ignores_other_sessions() {
        let (db, retro_id) = setup();
        let other = RetroId::new();
        crate::retros::RetroRepo::new(db.clone())
            .create(&other, "Other")
            .unwrap();

        let items = crate::items::ItemRepo::new(db.clone());
        let mine = items.insert(&retro_id, Column::Start, "x").unwrap();
        let theirs = items.insert(&other, Column::Start, "y").unwrap();

        let votes = VoteRepo::new(db);
        votes.insert(mine.id.as_str(), "visitor_a").unwrap();
        votes.insert(theirs.id.as_str(), "visitor_a").unwrap();

        assert_eq!(votes.used(&retro_id, "visitor_a").unwrap(), 1);
    }

    #[test]
    fn delete_for_target_clears_ballot() {
        let (db, retro_id) = setup();
        let groups = crate::groups::GroupRepo::new(db.clone());
        let group = groups.insert(&retro_id, Column::Start, "G").unwrap();

        let votes = VoteRepo::new(db);
        votes.insert(group.id.as_str(), "visitor_a").unwrap();
        votes.insert(group.id.as_str(), "visitor_b").unwrap();

        votes.delete_for_target(group.id.as_str()).unwrap();
        assert_eq!(votes.count(group.id.as_str()).unwrap(), 0);
    }
}
