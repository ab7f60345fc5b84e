use dashmap::DashMap;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::locks::LockKey;
use super::{Engine, EngineError};

/// Case-insensitive lookup key for a room label. `None` for a blank label.
pub fn normalize_label(label: &str) -> Option<String> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Every room the engine has ever resolved. Rooms are never removed.
#[derive(Default)]
pub struct RoomCatalog {
    rooms: DashMap<Ulid, Room>,
    /// Normalized label → room id. Unique.
    by_label: DashMap<String, Ulid>,
}

impl RoomCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn get(&self, id: &Ulid) -> Option<Room> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    /// Lookup by already-normalized label.
    pub fn find(&self, key: &str) -> Option<Room> {
        let id = *self.by_label.get(key)?.value();
        self.get(&id)
    }

    pub fn all(&self) -> Vec<Room> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    pub fn apply_event(&self, event: &Event) {
        if let Event::RoomCreated { room } = event {
            if let Some(key) = normalize_label(&room.name) {
                self.by_label.insert(key, room.id);
            }
            self.rooms.insert(room.id, room.clone());
        }
    }
}

impl Engine {
    /// Map a free-text label to its room, creating the room on first use.
    ///
    /// Blank labels resolve to no room. Matching ignores case and surrounding
    /// whitespace. Concurrent resolutions of the same unseen label serialize
    /// on the label, so exactly one room is created and every caller gets it.
    pub async fn resolve_room(&self, label: &str) -> Result<Option<Room>, EngineError> {
        let name = label.trim();
        let Some(key) = normalize_label(name) else {
            return Ok(None);
        };
        if name.len() > MAX_ROOM_LABEL_LEN {
            return Err(EngineError::LimitExceeded("room label too long"));
        }
        if let Some(room) = self.rooms.find(&key) {
            return Ok(Some(room));
        }

        let _guard = self.locks.acquire_one(LockKey::RoomLabel(key.clone())).await;
        // Re-check: the previous holder may have just created it.
        if let Some(room) = self.rooms.find(&key) {
            return Ok(Some(room));
        }
        let _permit = self
            .room_quota
            .reserve(self.rooms.len())
            .ok_or(EngineError::LimitExceeded("too many rooms"))?;

        let room = Room {
            id: self.next_id(),
            name: name.to_string(),
            capacity: DEFAULT_ROOM_CAPACITY,
            active: true,
        };
        self.persist(&Event::RoomCreated { room: room.clone() }).await?;
        metrics::counter!(crate::observability::ROOMS_CREATED_TOTAL).increment(1);
        info!(room_id = %room.id, name = %room.name, "room created on first use");
        Ok(Some(room))
    }

    /// Lookup only; never creates. Used where a write must not happen.
    pub fn find_room(&self, label: &str) -> Option<Room> {
        normalize_label(label).and_then(|key| self.rooms.find(&key))
    }

    /// Resolve each request slot's room label and produce typed slots.
    pub(super) async fn resolve_slots(&self, requests: &[SlotRequest]) -> Result<Vec<Slot>, EngineError> {
        let mut slots = Vec::with_capacity(requests.len());
        for req in requests {
            let room = match req.room_label.as_deref() {
                Some(label) => self.resolve_room(label).await?,
                None => None,
            };
            slots.push(Slot::new(req.day, req.start_time, req.end_time, room.map(|r| r.id)));
        }
        Ok(slots)
    }
}
