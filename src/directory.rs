//! Read-only view of the administrative directories the engine validates against.
//!
//! Cohorts, programs, course units and instructors are owned elsewhere; the
//! engine only looks them up by id. [`InMemoryDirectory`] backs the service
//! from a JSON seed and is what the tests build on.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    pub id: Ulid,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseUnit {
    pub id: Ulid,
    pub program_id: Ulid,
    pub name: String,
    pub coefficient: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructorStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructor {
    pub id: Ulid,
    pub name: String,
    pub status: InstructorStatus,
}

impl Instructor {
    pub fn is_active(&self) -> bool {
        self.status == InstructorStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryError(pub String);

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "directory unavailable: {}", self.0)
    }
}

impl std::error::Error for DirectoryError {}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn cohort(&self, id: Ulid) -> Result<Option<Cohort>, DirectoryError>;
    async fn program(&self, id: Ulid) -> Result<Option<Program>, DirectoryError>;
    async fn course_unit(&self, id: Ulid) -> Result<Option<CourseUnit>, DirectoryError>;
    async fn instructor(&self, id: Ulid) -> Result<Option<Instructor>, DirectoryError>;
    /// Whether a cohort–program link exists.
    async fn is_linked(&self, cohort_id: Ulid, program_id: Ulid) -> Result<bool, DirectoryError>;
}

// ── JSON seed ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySeed {
    #[serde(default)]
    pub cohorts: Vec<CohortSeed>,
    #[serde(default)]
    pub programs: Vec<ProgramSeed>,
    #[serde(default)]
    pub instructors: Vec<Instructor>,
}

#[derive(Debug, Deserialize)]
pub struct CohortSeed {
    pub id: Ulid,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Linked programs, in link order.
    #[serde(default)]
    pub programs: Vec<Ulid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramSeed {
    pub id: Ulid,
    pub name: String,
    #[serde(default)]
    pub course_units: Vec<CourseUnitSeed>,
}

#[derive(Debug, Deserialize)]
pub struct CourseUnitSeed {
    pub id: Ulid,
    pub name: String,
    #[serde(default = "default_coefficient")]
    pub coefficient: f64,
}

fn default_true() -> bool {
    true
}

fn default_coefficient() -> f64 {
    1.0
}

// ── In-memory implementation ─────────────────────────────────────

#[derive(Default)]
pub struct InMemoryDirectory {
    cohorts: DashMap<Ulid, Cohort>,
    programs: DashMap<Ulid, Program>,
    course_units: DashMap<Ulid, CourseUnit>,
    instructors: DashMap<Ulid, Instructor>,
    /// Cohort → linked programs, in link order. At most one entry per pair.
    links: DashMap<Ulid, Vec<Ulid>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let dir = Self::new();
        for p in seed.programs {
            dir.insert_program(Program { id: p.id, name: p.name });
            for cu in p.course_units {
                dir.insert_course_unit(CourseUnit {
                    id: cu.id,
                    program_id: p.id,
                    name: cu.name,
                    coefficient: cu.coefficient,
                });
            }
        }
        for c in seed.cohorts {
            dir.insert_cohort(Cohort { id: c.id, name: c.name, active: c.active });
            for pid in c.programs {
                dir.link_program(c.id, pid);
            }
        }
        for i in seed.instructors {
            dir.insert_instructor(i);
        }
        dir
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read directory seed {}", path.display()))?;
        let seed: DirectorySeed = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse directory seed {}", path.display()))?;
        Ok(Self::from_seed(seed))
    }

    pub fn insert_cohort(&self, cohort: Cohort) {
        self.cohorts.insert(cohort.id, cohort);
    }

    pub fn insert_program(&self, program: Program) {
        self.programs.insert(program.id, program);
    }

    pub fn insert_course_unit(&self, course_unit: CourseUnit) {
        self.course_units.insert(course_unit.id, course_unit);
    }

    pub fn insert_instructor(&self, instructor: Instructor) {
        self.instructors.insert(instructor.id, instructor);
    }

    pub fn set_instructor_status(&self, id: Ulid, status: InstructorStatus) -> bool {
        match self.instructors.get_mut(&id) {
            Some(mut i) => {
                i.status = status;
                true
            }
            None => false,
        }
    }

    /// Link a program to a cohort. Returns `false` if the link already existed.
    pub fn link_program(&self, cohort_id: Ulid, program_id: Ulid) -> bool {
        let mut linked = self.links.entry(cohort_id).or_default();
        if linked.contains(&program_id) {
            return false;
        }
        linked.push(program_id);
        true
    }

    pub fn unlink_program(&self, cohort_id: Ulid, program_id: Ulid) -> bool {
        self.links.get_mut(&cohort_id).is_some_and(|mut linked| {
            let before = linked.len();
            linked.retain(|p| *p != program_id);
            linked.len() != before
        })
    }

    pub fn linked_programs(&self, cohort_id: Ulid) -> Vec<Ulid> {
        self.links
            .get(&cohort_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn cohort(&self, id: Ulid) -> Result<Option<Cohort>, DirectoryError> {
        Ok(self.cohorts.get(&id).map(|e| e.value().clone()))
    }

    async fn program(&self, id: Ulid) -> Result<Option<Program>, DirectoryError> {
        Ok(self.programs.get(&id).map(|e| e.value().clone()))
    }

    async fn course_unit(&self, id: Ulid) -> Result<Option<CourseUnit>, DirectoryError> {
        Ok(self.course_units.get(&id).map(|e| e.value().clone()))
    }

    async fn instructor(&self, id: Ulid) -> Result<Option<Instructor>, DirectoryError> {
        Ok(self.instructors.get(&id).map(|e| e.value().clone()))
    }

    async fn is_linked(&self, cohort_id: Ulid, program_id: Ulid) -> Result<bool, DirectoryError> {
        Ok(self
            .links
            .get(&cohort_id)
            .is_some_and(|linked| linked.contains(&program_id)))
    }
}
