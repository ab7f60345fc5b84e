use ulid::Ulid;

use crate::directory::Directory;
use crate::model::AssignmentDraft;

use super::{EngineError, EntityKind};

/// The four directory references an assignment carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct References {
    pub cohort_id: Ulid,
    pub program_id: Ulid,
    pub course_unit_id: Ulid,
    pub instructor_id: Ulid,
}

impl From<&AssignmentDraft> for References {
    fn from(d: &AssignmentDraft) -> Self {
        Self {
            cohort_id: d.cohort_id,
            program_id: d.program_id,
            course_unit_id: d.course_unit_id,
            instructor_id: d.instructor_id,
        }
    }
}

/// Check that every reference resolves, the program is linked to the cohort,
/// and the instructor can take new work. Read-only.
///
/// Missing entities are reported before link and status problems, in
/// cohort, program, course unit, instructor order. A course unit that belongs
/// to a different program does not resolve.
pub async fn validate_references(directory: &dyn Directory, refs: &References) -> Result<(), EngineError> {
    if directory.cohort(refs.cohort_id).await?.is_none() {
        return Err(EngineError::NotFound(EntityKind::Cohort, refs.cohort_id));
    }
    if directory.program(refs.program_id).await?.is_none() {
        return Err(EngineError::NotFound(EntityKind::Program, refs.program_id));
    }
    match directory.course_unit(refs.course_unit_id).await? {
        Some(unit) if unit.program_id == refs.program_id => {}
        _ => return Err(EngineError::NotFound(EntityKind::CourseUnit, refs.course_unit_id)),
    }
    let instructor = directory
        .instructor(refs.instructor_id)
        .await?
        .ok_or(EngineError::NotFound(EntityKind::Instructor, refs.instructor_id))?;

    if !directory.is_linked(refs.cohort_id, refs.program_id).await? {
        return Err(EngineError::ProgramNotLinked {
            cohort_id: refs.cohort_id,
            program_id: refs.program_id,
        });
    }
    if !instructor.is_active() {
        return Err(EngineError::InstructorInactive(refs.instructor_id));
    }
    Ok(())
}
