use ulid::Ulid;

use crate::model::*;

use super::conflict::{find_conflicts, validate_draft};
use super::{Engine, EngineError, EntityKind};

impl Engine {
    pub fn get_assignment(&self, id: &Ulid) -> Option<Assignment> {
        self.store.get(id)
    }

    pub fn assignment_count(&self) -> usize {
        self.store.len()
    }

    /// Assignments matching `filter`, most recently created first. Lock-free:
    /// may miss a mutation that commits while the listing runs.
    pub fn list_assignments(&self, filter: &AssignmentFilter) -> Vec<Assignment> {
        let candidates = match (filter.instructor, filter.room) {
            (Some(instructor_id), _) => self.store.with_instructor(&instructor_id),
            (None, Some(room_id)) => self.store.with_room(&room_id),
            (None, None) => self.store.all(),
        };
        let mut matched: Vec<Assignment> = candidates.into_iter().filter(|a| filter.matches(a)).collect();
        matched.sort_by(|a, b| b.id.cmp(&a.id));
        matched
    }

    pub fn get_room(&self, id: &Ulid) -> Option<Room> {
        self.rooms.get(id)
    }

    /// The room catalog, by name ignoring case.
    pub fn list_rooms(&self) -> Vec<Room> {
        let mut rooms = self.rooms.all();
        rooms.sort_by_cached_key(|r| (r.name.to_lowercase(), r.id));
        rooms
    }

    /// The conflicts committing `draft` would hit right now, without writing
    /// anything. Labels with no room yet cannot collide and are left roomless.
    pub fn preview_conflicts(&self, draft: &AssignmentDraft, exclude: Option<Ulid>) -> Result<ConflictReport, EngineError> {
        validate_draft(draft)?;
        if let Some(id) = exclude
            && !self.store.contains(&id) {
                return Err(EngineError::NotFound(EntityKind::Assignment, id));
            }
        let slots: Vec<Slot> = draft
            .slots
            .iter()
            .map(|req| {
                let room_id = req
                    .room_label
                    .as_deref()
                    .and_then(|label| self.find_room(label))
                    .map(|room| room.id);
                Slot::new(req.day, req.start_time, req.end_time, room_id)
            })
            .collect();
        Ok(find_conflicts(&self.store, &slots, draft.instructor_id, exclude))
    }
}
