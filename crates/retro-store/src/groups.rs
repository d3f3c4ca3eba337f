use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use retro_core::ids::{GroupId, RetroId};
use retro_core::model::Column;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A persisted item group. Aggregate votes are never stored here; they are
/// derived from vote rows at read time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupRow {
    pub id: GroupId,
    pub retro_id: RetroId,
    pub column: Column,
    pub title: String,
    pub created_at: String,
}

pub struct GroupRepo {
    db: Database,
}

impl GroupRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, title), fields(retro_id = %retro_id, column = %column))]
    pub fn insert(
        &self,
        retro_id: &RetroId,
        column: Column,
        title: &str,
    ) -> Result<GroupRow, StoreError> {
        let id = GroupId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO item_groups (id, retro_id, column_type, title, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id.as_str(), retro_id.as_str(), column.to_string(), title, now],
            )?;

            Ok(GroupRow {
                id,
                retro_id: retro_id.clone(),
                column,
                title: title.to_string(),
                created_at: now.clone(),
            })
        })
    }

    /// Look up a group within a session; `None` if absent.
    pub fn find(&self, id: &GroupId, retro_id: &RetroId) -> Result<Option<GroupRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, retro_id, column_type, title, created_at
                 FROM item_groups WHERE id = ?1 AND retro_id = ?2",
            )?;
            let mut rows = stmt.query([id.as_str(), retro_id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_group(row)?)),
                None => Ok(None),
            }
        })
    }

    /// All groups of a session in creation order.
    pub fn list(&self, retro_id: &RetroId) -> Result<Vec<GroupRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, retro_id, column_type, title, created_at
                 FROM item_groups WHERE retro_id = ?1 ORDER BY created_at ASC, id ASC",
            )?;
            let mut rows = stmt.query([retro_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_group(row)?);
            }
            Ok(results)
        })
    }

    #[instrument(skip(self, title), fields(group_id = %id))]
    pub fn set_title(&self, id: &GroupId, title: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE item_groups SET title = ?1 WHERE id = ?2",
                rusqlite::params![title, id.as_str()],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(group_id = %id))]
    pub fn delete(&self, id: &GroupId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM item_groups WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })
    }
}

fn row_to_group(row: &rusqlite::Row<'_>) -> Result<GroupRow, StoreError> {
    let column_str: String = row_helpers::get(row, 2, "item_groups", "column_type")?;

    Ok(GroupRow {
        id: GroupId::from_raw(row_helpers::get::<String>(row, 0, "item_groups", "id")?),
        retro_id: RetroId::from_raw(row_helpers::get::<String>(row, 1, "item_groups", "retro_id")?),
        column: row_helpers::parse_enum(&column_str, "item_groups", "column_type")?,
        title: row_helpers::get(row, 3, "item_groups", "title")?,
        created_at: row_helpers::get(row, 4, "item_groups", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, RetroId) {
        let db = Database::in_memory().unwrap();
        let retro_id = RetroId::new();
        crate::retros::RetroRepo::new(db.clone())
            .create(&retro_id, "Test")
            .unwrap();
        (db, retro_id)
    }

    #[test]
    fn insert_and_find() {
        let (db, retro_id) = setup();
        let repo = GroupRepo::new(db);
        let group = repo.insert(&retro_id, Column::Stop, "Meetings").unwrap();
        assert!(group.id.as_str().starts_with("grp_"));

        let fetched = repo.find(&group.id, &retro_id).unwrap().unwrap();
        assert_eq!(fetched.title, "Meetings");
        assert_eq!(fetched.column, Column::Stop);
    }

    #[test]
    fn find_missing_returns_none() {
        let (db, retro_id) = setup();
        let repo = GroupRepo::new(db);
        assert!(repo.find(&GroupId::new(), &retro_id).unwrap().is_none());
    }

    #[test]
    fn list_in_creation_order() {
        let (db, retro_id) = setup();
        let repo = GroupRepo::new(db);
        let a = repo.insert(&retro_id, Column::Start, "A").unwrap();
        let b = repo.insert(&retro_id, Column::Start, "B").unwrap();

        let all = repo.list(&retro_id).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a.id);
        assert_eq!(all[1].id, b.id);
    }

    #[test]
    fn set_title() {
        let (db, retro_id) = setup();
        let repo = GroupRepo::new(db);
        let group = repo.insert(&retro_id, Column::Start, "Old").unwrap();
        repo.set_title(&group.id, "New").unwrap();
        assert_eq!(repo.find(&group.id, &retro_id).unwrap().unwrap().title, "New");
    }

    #[test]
    fn delete_removes_row() {
        let (db, retro_id) = setup();
        let repo = GroupRepo::new(db);
        let group = repo.insert(&retro_id, Column::Start, "G").unwrap();
        repo.delete(&group.id).unwrap();
        assert!(repo.find(&group.id, &retro_id).unwrap().is_none());
    }
}
