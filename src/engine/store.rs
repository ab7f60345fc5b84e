use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

/// Committed assignments plus reverse indexes for conflict lookups.
///
/// Writers hold the engine's resource locks for every instructor and room they
/// touch, so an index entry never changes under a detector holding that lock.
pub struct AssignmentStore {
    assignments: DashMap<Ulid, Assignment>,
    /// Instructor → assignments taught.
    by_instructor: DashMap<Ulid, Vec<Ulid>>,
    /// Room → assignments with at least one slot in it.
    by_room: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for AssignmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AssignmentStore {
    pub fn new() -> Self {
        Self {
            assignments: DashMap::new(),
            by_instructor: DashMap::new(),
            by_room: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn contains(&self, id: &Ulid) -> bool {
        self.assignments.contains_key(id)
    }

    pub fn get(&self, id: &Ulid) -> Option<Assignment> {
        self.assignments.get(id).map(|e| e.value().clone())
    }

    pub fn all(&self) -> Vec<Assignment> {
        self.assignments.iter().map(|e| e.value().clone()).collect()
    }

    pub fn with_instructor(&self, instructor_id: &Ulid) -> Vec<Assignment> {
        self.resolve_index(self.by_instructor.get(instructor_id).map(|e| e.value().clone()))
    }

    pub fn with_room(&self, room_id: &Ulid) -> Vec<Assignment> {
        self.resolve_index(self.by_room.get(room_id).map(|e| e.value().clone()))
    }

    // Index refs are cloned out first so no shard lock is held while reading
    // the primary map.
    fn resolve_index(&self, ids: Option<Vec<Ulid>>) -> Vec<Assignment> {
        ids.unwrap_or_default()
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Insert or replace, keeping both indexes in step.
    pub fn upsert(&self, assignment: Assignment) -> Option<Assignment> {
        let previous = self.assignments.insert(assignment.id, assignment.clone());
        if let Some(ref old) = previous {
            self.unindex(old);
        }
        self.index(&assignment);
        previous
    }

    pub fn remove(&self, id: &Ulid) -> Option<Assignment> {
        let (_, old) = self.assignments.remove(id)?;
        self.unindex(&old);
        Some(old)
    }

    fn index(&self, a: &Assignment) {
        self.by_instructor.entry(a.instructor_id).or_default().push(a.id);
        for room_id in a.room_ids() {
            self.by_room.entry(room_id).or_default().push(a.id);
        }
    }

    fn unindex(&self, a: &Assignment) {
        if let Some(mut ids) = self.by_instructor.get_mut(&a.instructor_id) {
            ids.retain(|id| *id != a.id);
        }
        for room_id in a.room_ids() {
            if let Some(mut ids) = self.by_room.get_mut(&room_id) {
                ids.retain(|id| *id != a.id);
            }
        }
    }

    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::AssignmentCreated { assignment } | Event::AssignmentUpdated { assignment } => {
                self.upsert(assignment.clone());
            }
            Event::AssignmentDeleted { id } => {
                self.remove(id);
            }
            Event::RoomCreated { .. } => {}
        }
    }
}
