//! Session id -> coordinator routing.
//!
//! Rooms are spawned lazily on first use and live for the session's activity
//! window; a coordinator retires itself on session deletion and is removed
//! from the map. Rooms share no mutable state with each other.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use retro_core::ids::RetroId;
use retro_store::Database;

use crate::client::ClientRegistry;
use crate::room::{RoomCoordinator, RoomEvent};

const ROOM_INBOX_CAPACITY: usize = 256;

pub struct RoomRouter {
    db: Database,
    registry: Arc<ClientRegistry>,
    rooms: DashMap<RetroId, mpsc::Sender<RoomEvent>>,
}

impl RoomRouter {
    pub fn new(db: Database, registry: Arc<ClientRegistry>) -> Arc<Self> {
        Arc::new(Self {
            db,
            registry,
            rooms: DashMap::new(),
        })
    }

    /// Inbox sender for a room, spawning its coordinator on first use.
    pub fn sender(self: &Arc<Self>, retro_id: &RetroId) -> mpsc::Sender<RoomEvent> {
        let mut inbox = None;
        let tx = match self.rooms.entry(retro_id.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let (tx, rx) = mpsc::channel(ROOM_INBOX_CAPACITY);
                entry.insert(tx.clone());
                inbox = Some(rx);
                tx
            }
        };

        // Spawn outside the map entry so the shard lock is released first
        if let Some(rx) = inbox {
            let room = RoomCoordinator::new(
                retro_id.clone(),
                self.db.clone(),
                Arc::clone(&self.registry),
            );
            let router = Arc::clone(self);
            let room_id = retro_id.clone();
            tokio::spawn(async move {
                room.run(rx).await;
                router.rooms.remove(&room_id);
            });
            tracing::info!(retro_id = %retro_id, "room coordinator started");
        }

        tx
    }

    /// Number of live coordinators.
    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Arc<RoomRouter> {
        let db = Database::in_memory().unwrap();
        let registry = Arc::new(ClientRegistry::new(32));
        RoomRouter::new(db, registry)
    }

    #[tokio::test]
    async fn sender_spawns_room_once() {
        let router = setup();
        let retro_id = RetroId::new();

        let a = router.sender(&retro_id);
        let b = router.sender(&retro_id);
        assert_eq!(router.active_rooms(), 1);
        assert!(a.same_channel(&b));
    }

    #[tokio::test]
    async fn distinct_sessions_get_distinct_rooms() {
        let router = setup();
        let a = router.sender(&RetroId::new());
        let b = router.sender(&RetroId::new());
        assert_eq!(router.active_rooms(), 2);
        assert!(!a.same_channel(&b));
    }

    #[tokio::test]
    async fn room_is_removed_after_shutdown() {
        let db = Database::in_memory().unwrap();
        let registry = Arc::new(ClientRegistry::new(32));
        let router = RoomRouter::new(db.clone(), registry.clone());
        let retro_id = RetroId::new();

        let tx = router.sender(&retro_id);
        assert_eq!(router.active_rooms(), 1);

        // Join as facilitator (fallback creation), then delete the retro
        let (client, mut rx) = registry.register(retro_id.clone());
        tx.send(RoomEvent::Inbound {
            client: client.clone(),
            text: r#"{"type":"join","name":"Ada"}"#.into(),
        })
        .await
        .unwrap();
        tx.send(RoomEvent::Inbound {
            client: client.clone(),
            text: r#"{"type":"delete-retro"}"#.into(),
        })
        .await
        .unwrap();

        // Wait for the deletion notice, then give the task a beat to retire
        let mut saw_deleted = false;
        for _ in 0..50 {
            match rx.try_recv() {
                Ok(msg) if msg.contains("retro-deleted") => {
                    saw_deleted = true;
                    break;
                }
                _ => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        }
        assert!(saw_deleted);

        for _ in 0..50 {
            if router.active_rooms() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(router.active_rooms(), 0);
    }
}
