use std::collections::{BTreeMap, BTreeSet};

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::store::AssignmentStore;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Shape checks that need no store access.
pub(crate) fn validate_draft(draft: &AssignmentDraft) -> Result<(), EngineError> {
    if draft.slots.is_empty() {
        return Err(EngineError::Validation("at least one slot is required".into()));
    }
    if draft.slots.len() > MAX_SLOTS_PER_ASSIGNMENT {
        return Err(EngineError::LimitExceeded("too many slots"));
    }
    if !draft.period.is_valid() {
        return Err(EngineError::Validation(format!(
            "period start {} is after end {}",
            draft.period.start_date, draft.period.end_date
        )));
    }
    for (i, s) in draft.slots.iter().enumerate() {
        if s.start_time >= s.end_time {
            return Err(EngineError::Validation(format!(
                "slot {i}: start {} must be before end {}",
                s.start_time, s.end_time
            )));
        }
        if let Some(ref label) = s.room_label
            && label.trim().len() > MAX_ROOM_LABEL_LEN {
                return Err(EngineError::LimitExceeded("room label too long"));
            }
    }
    // One instructor teaches every slot of the draft, so its own slots must not collide.
    for i in 0..draft.slots.len() {
        for j in (i + 1)..draft.slots.len() {
            let (a, b) = (&draft.slots[i], &draft.slots[j]);
            if a.day == b.day && a.start_time.max(b.start_time) < a.end_time.min(b.end_time) {
                return Err(EngineError::Validation(format!(
                    "slots {i} and {j} overlap on {}",
                    a.day
                )));
            }
        }
    }
    Ok(())
}

/// Collect, per existing assignment, which candidate slots hit which of its slots.
#[derive(Default)]
struct ConflictAccumulator {
    by_assignment: BTreeMap<Ulid, Conflict>,
    seen: BTreeSet<(Ulid, usize, usize)>,
}

impl ConflictAccumulator {
    fn record(&mut self, existing: &Assignment, candidate: usize, existing_idx: usize) {
        if !self.seen.insert((existing.id, candidate, existing_idx)) {
            return;
        }
        self.by_assignment
            .entry(existing.id)
            .or_insert_with(|| Conflict {
                assignment_id: existing.id,
                cohort_id: existing.cohort_id,
                program_id: existing.program_id,
                course_unit_id: existing.course_unit_id,
                instructor_id: existing.instructor_id,
                overlaps: Vec::new(),
            })
            .overlaps
            .push(SlotOverlap {
                candidate,
                existing: existing.slots[existing_idx],
            });
    }

    fn finish(self) -> Vec<Conflict> {
        self.by_assignment.into_values().collect()
    }
}

/// Every committed assignment (other than `exclude`) that would double-book
/// the instructor or a room if `candidate` were committed.
///
/// Overlap is judged on the weekly pattern alone; periods are not consulted.
/// Slots without a room can only produce instructor conflicts.
pub(crate) fn find_conflicts(
    store: &AssignmentStore,
    candidate: &[Slot],
    instructor_id: Ulid,
    exclude: Option<Ulid>,
) -> ConflictReport {
    let is_other = |a: &Assignment| Some(a.id) != exclude;

    let mut instructor = ConflictAccumulator::default();
    for existing in store.with_instructor(&instructor_id).iter().filter(|a| is_other(a)) {
        for (ci, c) in candidate.iter().enumerate() {
            for (ei, e) in existing.slots.iter().enumerate() {
                if c.overlaps(e) {
                    instructor.record(existing, ci, ei);
                }
            }
        }
    }

    let mut room = ConflictAccumulator::default();
    let room_ids: BTreeSet<Ulid> = candidate.iter().filter_map(|s| s.room_id).collect();
    for room_id in room_ids {
        for existing in store.with_room(&room_id).iter().filter(|a| is_other(a)) {
            for (ci, c) in candidate.iter().enumerate() {
                if c.room_id != Some(room_id) {
                    continue;
                }
                for (ei, e) in existing.slots.iter().enumerate() {
                    if c.shares_room(e) && c.overlaps(e) {
                        room.record(existing, ci, ei);
                    }
                }
            }
        }
    }

    ConflictReport {
        instructor_conflicts: instructor.finish(),
        room_conflicts: room.finish(),
    }
}
