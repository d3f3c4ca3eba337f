use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use retro_core::ids::RetroId;
use retro_core::phase::Phase;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A persisted retrospective session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetroRow {
    pub id: RetroId,
    pub name: String,
    pub created_at: String,
    /// Empty string until the first joiner is assigned.
    pub facilitator_id: String,
    pub phase: Phase,
}

pub struct RetroRepo {
    db: Database,
}

impl RetroRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new session in the `waiting` phase with no facilitator.
    #[instrument(skip(self), fields(retro_id = %id))]
    pub fn create(&self, id: &RetroId, name: &str) -> Result<RetroRow, StoreError> {
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO retros (id, name, created_at, facilitator_id, phase)
                 VALUES (?1, ?2, ?3, '', 'waiting')",
                rusqlite::params![id.as_str(), name, now],
            )?;

            Ok(RetroRow {
                id: id.clone(),
                name: name.to_string(),
                created_at: now.clone(),
                facilitator_id: String::new(),
                phase: Phase::Waiting,
            })
        })
    }

    /// Create with an explicit facilitator already assigned (the join
    /// fallback path when the front door never ran).
    #[instrument(skip(self), fields(retro_id = %id))]
    pub fn create_with_facilitator(
        &self,
        id: &RetroId,
        name: &str,
        facilitator_id: &str,
    ) -> Result<RetroRow, StoreError> {
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO retros (id, name, created_at, facilitator_id, phase)
                 VALUES (?1, ?2, ?3, ?4, 'waiting')",
                rusqlite::params![id.as_str(), name, now, facilitator_id],
            )?;

            Ok(RetroRow {
                id: id.clone(),
                name: name.to_string(),
                created_at: now.clone(),
                facilitator_id: facilitator_id.to_string(),
                phase: Phase::Waiting,
            })
        })
    }

    /// Look up a session; `None` if the row does not exist.
    pub fn find(&self, id: &RetroId) -> Result<Option<RetroRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, created_at, facilitator_id, phase FROM retros WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_retro(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Look up a session, erroring if it does not exist.
    pub fn get(&self, id: &RetroId) -> Result<RetroRow, StoreError> {
        self.find(id)?
            .ok_or_else(|| StoreError::NotFound(format!("retro {id}")))
    }

    #[instrument(skip(self), fields(retro_id = %id))]
    pub fn set_facilitator(&self, id: &RetroId, facilitator_id: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE retros SET facilitator_id = ?1 WHERE id = ?2",
                rusqlite::params![facilitator_id, id.as_str()],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(retro_id = %id, phase = %phase))]
    pub fn set_phase(&self, id: &RetroId, phase: Phase) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE retros SET phase = ?1 WHERE id = ?2",
                rusqlite::params![phase.to_string(), id.as_str()],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(retro_id = %id))]
    pub fn set_name(&self, id: &RetroId, name: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE retros SET name = ?1 WHERE id = ?2",
                rusqlite::params![name, id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Hard delete, cascading in dependency order: votes (item votes and
    /// group ballots), items, groups, then the session row itself.
    #[instrument(skip(self), fields(retro_id = %id))]
    pub fn delete(&self, id: &RetroId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM votes WHERE item_id IN (SELECT id FROM items WHERE retro_id = ?1)
                    OR item_id IN (SELECT id FROM item_groups WHERE retro_id = ?1)",
                [id.as_str()],
            )?;
            conn.execute("DELETE FROM items WHERE retro_id = ?1", [id.as_str()])?;
            conn.execute("DELETE FROM item_groups WHERE retro_id = ?1", [id.as_str()])?;
            conn.execute("DELETE FROM retros WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })
    }
}

fn row_to_retro(row: &rusqlite::Row<'_>) -> Result<RetroRow, StoreError> {
    let phase_str: String = row_helpers::get(row, 4, "retros", "phase")?;

    Ok(RetroRow {
        id: RetroId::from_raw(row_helpers::get::<String>(row, 0, "retros", "id")?),
        name: row_helpers::get(row, 1, "retros", "name")?,
        created_at: row_helpers::get(row, 2, "retros", "created_at")?,
        facilitator_id: row_helpers::get(row, 3, "retros", "facilitator_id")?,
        phase: row_helpers::parse_enum(&phase_str, "retros", "phase")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, RetroRepo) {
        let db = Database::in_memory().unwrap();
        let repo = RetroRepo::new(db.clone());
        (db, repo)
    }

    #[test]
    fn create_retro() {
        let (_db, repo) = setup();
        let id = RetroId::new();
        let retro = repo.create(&id, "Sprint 12").unwrap();
        assert_eq!(retro.id, id);
        assert_eq!(retro.name, "Sprint 12");
        assert_eq!(retro.phase, Phase::Waiting);
        assert!(retro.facilitator_id.is_empty());
    }

    #[test]
    fn find_missing_returns_none() {
        let (_db, repo) = setup();
        assert!(repo.find(&RetroId::new()).unwrap().is_none());
    }

    #[test]
    fn get_missing_fails() {
        let (_db, repo) = setup();
        let result = repo.get(&RetroId::new());
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn set_facilitator() {
        let (_db, repo) = setup();
        let id = RetroId::new();
        repo.create(&id, "Retro").unwrap();
        repo.set_facilitator(&id, "visitor_abc").unwrap();
        let retro = repo.get(&id).unwrap();
        assert_eq!(retro.facilitator_id, "visitor_abc");
    }

    #[test]
    fn set_phase() {
        let (_db, repo) = setup();
        let id = RetroId::new();
        repo.create(&id, "Retro").unwrap();
        repo.set_phase(&id, Phase::Adding).unwrap();
        assert_eq!(repo.get(&id).unwrap().phase, Phase::Adding);
    }

    #[test]
    fn set_name() {
        let (_db, repo) = setup();
        let id = RetroId::new();
        repo.create(&id, "Old").unwrap();
        repo.set_name(&id, "New").unwrap();
        assert_eq!(repo.get(&id).unwrap().name, "New");
    }

    #[test]
    fn delete_cascades() {
        let (db, repo) = setup();
        let id = RetroId::new();
        repo.create(&id, "Retro").unwrap();

        let items = crate::items::ItemRepo::new(db.clone());
        let groups = crate::groups::GroupRepo::new(db.clone());
        let votes = crate::votes::VoteRepo::new(db.clone());

        let item = items
            .insert(&id, retro_core::Column::Start, "note")
            .unwrap();
        let group = groups
            .insert(&id, retro_core::Column::Start, "Group")
            .unwrap();
        votes.insert(item.id.as_str(), "visitor_a").unwrap();
        votes.insert(group.id.as_str(), "visitor_a").unwrap();

        repo.delete(&id).unwrap();

        assert!(repo.find(&id).unwrap().is_none());
        assert!(items.list(&id).unwrap().is_empty());
        assert!(groups.list(&id).unwrap().is_empty());
        assert_eq!(votes.count(item.id.as_str()).unwrap(), 0);
        assert_eq!(votes.count(group.id.as_str()).unwrap(), 0);
    }

    #[test]
    fn invalid_phase_returns_corrupt_row() {
        let (db, repo) = setup();
        let id = RetroId::new();
        let now = chrono::Utc::now().to_rfc3339();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO retros (id, name, created_at, facilitator_id, phase)
                 VALUES (?1, 'Bad', ?2, '', 'INVALID_PHASE')",
                rusqlite::params![id.as_str(), now],
            )?;
            Ok(())
        })
        .unwrap();

        let result = repo.get(&id);
        assert!(matches!(result, Err(StoreError::CorruptRow { .. })));
    }
}
