//! In-memory room store.
//!
//! A room is two payload slots keyed by a six-digit code. Rooms are
//! short-lived; anything not released explicitly is purged when its
//! lifetime runs out. The store never looks inside payloads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use glance_common::protocol::PayloadSlot;
use glance_common::RoomCode;

/// Default room lifetime.
pub const DEFAULT_ROOM_TTL: Duration = Duration::from_secs(30 * 60);

/// How often the background purge runs.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Unknown or already expired room.
    #[error("room not found or expired")]
    RoomNotFound,
    /// Too many live rooms to find a free code.
    #[error("no free room codes available")]
    Exhausted,
}

#[derive(Debug)]
struct Room {
    offer: Option<String>,
    answer: Option<String>,
    expires_at: Instant,
}

/// Shared handle to the room table.
#[derive(Clone)]
pub struct RoomStore {
    rooms: Arc<RwLock<HashMap<RoomCode, Room>>>,
    ttl: Duration,
}

impl RoomStore {
    pub fn new(ttl: Duration) -> Self {
        RoomStore {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Allocate a fresh room and return its code.
    pub async fn create(&self) -> Result<RoomCode, StoreError> {
        let mut rooms = self.rooms.write().await;
        // Six digits give 900k codes; collisions stay rare at the room
        // counts this store is sized for.
        for _ in 0..64 {
            let code = RoomCode::generate();
            if let Some(existing) = rooms.get(&code) {
                if existing.expires_at > Instant::now() {
                    continue;
                }
            }
            rooms.insert(
                code,
                Room {
                    offer: None,
                    answer: None,
                    expires_at: Instant::now() + self.ttl,
                },
            );
            debug!(%code, "room created");
            return Ok(code);
        }
        Err(StoreError::Exhausted)
    }

    /// Write a payload into one slot of a live room. Re-publishing
    /// overwrites the slot.
    pub async fn publish(
        &self,
        code: RoomCode,
        slot: PayloadSlot,
        payload: String,
    ) -> Result<(), StoreError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(&code)
            .filter(|room| room.expires_at > Instant::now())
            .ok_or(StoreError::RoomNotFound)?;
        match slot {
            PayloadSlot::Offer => room.offer = Some(payload),
            PayloadSlot::Answer => room.answer = Some(payload),
        }
        debug!(%code, slot = slot.as_str(), "payload published");
        Ok(())
    }

    /// Read one slot of a live room. `None` means the peer has not
    /// published yet.
    pub async fn fetch(
        &self,
        code: RoomCode,
        slot: PayloadSlot,
    ) -> Result<Option<String>, StoreError> {
        let rooms = self.rooms.read().await;
        let room = rooms
            .get(&code)
            .filter(|room| room.expires_at > Instant::now())
            .ok_or(StoreError::RoomNotFound)?;
        Ok(match slot {
            PayloadSlot::Offer => room.offer.clone(),
            PayloadSlot::Answer => room.answer.clone(),
        })
    }

    /// Release a room early. Removing an unknown room is not an error.
    pub async fn remove(&self, code: RoomCode) {
        if self.rooms.write().await.remove(&code).is_some() {
            debug!(%code, "room released");
        }
    }

    /// Drop every expired room. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut rooms = self.rooms.write().await;
        let before = rooms.len();
        rooms.retain(|_, room| room.expires_at > now);
        before - rooms.len()
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        RoomStore::new(DEFAULT_ROOM_TTL)
    }
}

/// Periodically purge expired rooms until the task is dropped.
pub fn spawn_purge_loop(store: RoomStore, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = store.purge_expired().await;
            if removed > 0 {
                info!(removed, "purged expired rooms");
            }
        }
    })
}
