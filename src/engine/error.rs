use std::fmt;

use ulid::Ulid;

use crate::directory::DirectoryError;
use crate::model::ConflictReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Cohort,
    Program,
    CourseUnit,
    Instructor,
    Assignment,
    Room,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Cohort => "cohort",
            EntityKind::Program => "program",
            EntityKind::CourseUnit => "course unit",
            EntityKind::Instructor => "instructor",
            EntityKind::Assignment => "assignment",
            EntityKind::Room => "room",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum EngineError {
    NotFound(EntityKind, Ulid),
    /// The cohort exists and the program exists, but they are not linked.
    ProgramNotLinked {
        cohort_id: Ulid,
        program_id: Ulid,
    },
    InstructorInactive(Ulid),
    SchedulingConflict(ConflictReport),
    /// Malformed input, rejected before any store access.
    Validation(String),
    LimitExceeded(&'static str),
    /// Transient store failure. The whole mutation may be retried.
    Store(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Store(_))
    }

    /// Stable code for metrics labels and API error bodies.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::NotFound(..) => "not_found",
            EngineError::ProgramNotLinked { .. } => "program_not_linked",
            EngineError::InstructorInactive(_) => "instructor_inactive",
            EngineError::SchedulingConflict(_) => "scheduling_conflict",
            EngineError::Validation(_) => "validation",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Store(_) => "store",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NotFound(kind, id) => write!(f, "{kind} not found: {id}"),
            EngineError::ProgramNotLinked {
                cohort_id,
                program_id,
            } => write!(f, "program {program_id} is not linked to cohort {cohort_id}"),
            EngineError::InstructorInactive(id) => write!(f, "instructor {id} is not active"),
            EngineError::SchedulingConflict(report) => write!(
                f,
                "scheduling conflict: {} instructor conflict(s), {} room conflict(s)",
                report.instructor_conflicts.len(),
                report.room_conflicts.len()
            ),
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<DirectoryError> for EngineError {
    fn from(e: DirectoryError) -> Self {
        EngineError::Store(e.to_string())
    }
}
