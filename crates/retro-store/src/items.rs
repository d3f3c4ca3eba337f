use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use retro_core::ids::{GroupId, ItemId, RetroId};
use retro_core::model::Column;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A persisted note. Created during `adding`; only grouping mutates it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemRow {
    pub id: ItemId,
    pub retro_id: RetroId,
    pub column: Column,
    pub text: String,
    pub created_at: String,
    pub group_id: Option<GroupId>,
}

pub struct ItemRepo {
    db: Database,
}

const SELECT_COLS: &str = "id, retro_id, column_type, text, created_at, group_id";

impl ItemRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, text), fields(retro_id = %retro_id, column = %column))]
    pub fn insert(
        &self,
        retro_id: &RetroId,
        column: Column,
        text: &str,
    ) -> Result<ItemRow, StoreError> {
        let id = ItemId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO items (id, retro_id, column_type, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id.as_str(), retro_id.as_str(), column.to_string(), text, now],
            )?;

            Ok(ItemRow {
                id,
                retro_id: retro_id.clone(),
                column,
                text: text.to_string(),
                created_at: now.clone(),
                group_id: None,
            })
        })
    }

    /// Look up an item within a session; `None` if absent.
    pub fn find(&self, id: &ItemId, retro_id: &RetroId) -> Result<Option<ItemRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM items WHERE id = ?1 AND retro_id = ?2"
            ))?;
            let mut rows = stmt.query([id.as_str(), retro_id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_item(row)?)),
                None => Ok(None),
            }
        })
    }

    /// All items of a session in creation order.
    pub fn list(&self, retro_id: &RetroId) -> Result<Vec<ItemRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM items WHERE retro_id = ?1 ORDER BY created_at ASC, id ASC"
            ))?;
            let mut rows = stmt.query([retro_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_item(row)?);
            }
            Ok(results)
        })
    }

    /// Member items of a group in creation order.
    pub fn list_group(&self, group_id: &GroupId) -> Result<Vec<ItemRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM items WHERE group_id = ?1 ORDER BY created_at ASC, id ASC"
            ))?;
            let mut rows = stmt.query([group_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_item(row)?);
            }
            Ok(results)
        })
    }

    /// Move the given items onto a group.
    #[instrument(skip(self, item_ids), fields(retro_id = %retro_id, group_id = %group_id))]
    pub fn assign_group(
        &self,
        item_ids: &[ItemId],
        group_id: &GroupId,
        retro_id: &RetroId,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            for item_id in item_ids {
                conn.execute(
                    "UPDATE items SET group_id = ?1 WHERE id = ?2 AND retro_id = ?3",
                    rusqlite::params![group_id.as_str(), item_id.as_str(), retro_id.as_str()],
                )?;
            }
            Ok(())
        })
    }

    /// Detach every member of a group.
    #[instrument(skip(self), fields(group_id = %group_id))]
    pub fn clear_group(&self, group_id: &GroupId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE items SET group_id = NULL WHERE group_id = ?1",
                [group_id.as_str()],
            )?;
            Ok(())
        })
    }

    /// How many items currently reference a group.
    pub fn member_count(&self, group_id: &GroupId) -> Result<u32, StoreError> {
        self.db.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM items WHERE group_id = ?1",
                [group_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> Result<ItemRow, StoreError> {
    let column_str: String = row_helpers::get(row, 2, "items", "column_type")?;

    Ok(ItemRow {
        id: ItemId::from_raw(row_helpers::get::<String>(row, 0, "items", "id")?),
        retro_id: RetroId::from_raw(row_helpers::get::<String>(row, 1, "items", "retro_id")?),
        column: row_helpers::parse_enum(&column_str, "items", "column_type")?,
        text: row_helpers::get(row, 3, "items", "text")?,
        created_at: row_helpers::get(row, 4, "items", "created_at")?,
        group_id: row_helpers::get_opt::<String>(row, 5, "items", "group_id")?
            .map(GroupId::from_raw),
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
        let repo = ItemRepo::new(db);
        let item = repo.insert(&retro_id, Column::Start, "pair more").unwrap();
        assert!(item.id.as_str().starts_with("item_"));
        assert!(item.group_id.is_none());

        let fetched = repo.find(&item.id, &retro_id).unwrap().unwrap();
        assert_eq!(fetched.text, "pair more");
        assert_eq!(fetched.column, Column::Start);
    }

    #[test]
    fn find_wrong_retro_returns_none() {
        let (db, retro_id) = setup();
        let repo = ItemRepo::new(db.clone());
        let item = repo.insert(&retro_id, Column::Stop, "x").unwrap();

        let other = RetroId::new();
        crate::retros::RetroRepo::new(db).create(&other, "Other").unwrap();
        assert!(repo.find(&item.id, &other).unwrap().is_none());
    }

    #[test]
    fn list_preserves_creation_order() {
        let (db, retro_id) = setup();
        let repo = ItemRepo::new(db);
        let a = repo.insert(&retro_id, Column::Start, "a").unwrap();
        let b = repo.insert(&retro_id, Column::Stop, "b").unwrap();
        let c = repo.insert(&retro_id, Column::Continue, "c").unwrap();

        let all = repo.list(&retro_id).unwrap();
        let ids: Vec<&str> = all.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), b.id.as_str(), c.id.as_str()]);
    }

    #[test]
    fn assign_and_clear_group() {
        let (db, retro_id) = setup();
        let repo = ItemRepo::new(db.clone());
        let a = repo.insert(&retro_id, Column::Start, "a").unwrap();
        let b = repo.insert(&retro_id, Column::Start, "b").unwrap();
        let group = crate::groups::GroupRepo::new(db)
            .insert(&retro_id, Column::Start, "G")
            .unwrap();

        repo.assign_group(&[a.id.clone(), b.id.clone()], &group.id, &retro_id)
            .unwrap();
        assert_eq!(repo.member_count(&group.id).unwrap(), 2);
        assert_eq!(repo.list_group(&group.id).unwrap().len(), 2);

        repo.clear_group(&group.id).unwrap();
        assert_eq!(repo.member_count(&group.id).unwrap(), 0);
        let a_after = repo.find(&a.id, &retro_id).unwrap().unwrap();
        assert!(a_after.group_id.is_none());
    }

    #[test]
    fn assign_group_ignores_foreign_retro() {
        let (db, retro_id) = setup();
        let repo = ItemRepo::new(db.clone());
        let item = repo.insert(&retro_id, Column::Start, "a").unwrap();

        let other = RetroId::new();
        crate::retros::RetroRepo::new(db.clone()).create(&other, "Other").unwrap();
        let group = crate::groups::GroupRepo::new(db)
            .insert(&other, Column::Start, "G")
            .unwrap();

        // Scoped to the wrong retro: no-op
        repo.assign_group(&[item.id.clone()], &group.id, &other).unwrap();
        let fetched = repo.find(&item.id, &retro_id).unwrap().unwrap();
        assert!(fetched.group_id.is_none());
    }
}
