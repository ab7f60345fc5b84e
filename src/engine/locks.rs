use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

use crate::model::{Assignment, Slot};

/// What a mutation serializes on. Ordering is the acquisition order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Instructor(Ulid),
    Room(Ulid),
    /// Normalized room label, for find-or-create.
    RoomLabel(String),
}

/// Held locks; released on drop.
pub type LockSet = Vec<OwnedMutexGuard<()>>;

/// Lazily created async mutex per resource.
#[derive(Default)]
pub struct LockTable {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: LockKey) -> Arc<Mutex<()>> {
        Arc::clone(&self.locks.entry(key).or_default())
    }

    /// Acquire every key in sorted order, so two callers with overlapping
    /// sets can never deadlock.
    pub async fn acquire(&self, keys: &BTreeSet<LockKey>) -> LockSet {
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.handle(key.clone()).lock_owned().await);
        }
        guards
    }

    pub async fn acquire_one(&self, key: LockKey) -> OwnedMutexGuard<()> {
        self.handle(key).lock_owned().await
    }
}

/// Instructor plus every room referenced by `slots`.
pub fn keys_for(instructor_id: Ulid, slots: &[Slot]) -> BTreeSet<LockKey> {
    let mut keys = BTreeSet::new();
    keys.insert(LockKey::Instructor(instructor_id));
    keys.extend(slots.iter().filter_map(|s| s.room_id).map(LockKey::Room));
    keys
}

pub fn keys_of(assignment: &Assignment) -> BTreeSet<LockKey> {
    keys_for(assignment.instructor_id, &assignment.slots)
}
