use std::collections::BTreeSet;
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{CONFLICTS_TOTAL, MUTATION_DURATION_SECONDS, MUTATIONS_TOTAL, WAL_COMPACTIONS_TOTAL};

use super::conflict::{find_conflicts, now_ms, validate_draft};
use super::locks::{LockKey, LockSet, keys_for, keys_of};
use super::references::{References, validate_references};
use super::{Engine, EngineError, EntityKind, WalCommand};

fn record_mutation<T>(op: &'static str, started: Instant, result: &Result<T, EngineError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    metrics::counter!(MUTATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(MUTATION_DURATION_SECONDS, "op" => op).record(started.elapsed().as_secs_f64());
}

fn reject_conflicts(report: ConflictReport) -> Result<(), EngineError> {
    if report.is_empty() {
        return Ok(());
    }
    metrics::counter!(CONFLICTS_TOTAL, "kind" => "instructor")
        .increment(report.instructor_conflicts.len() as u64);
    metrics::counter!(CONFLICTS_TOTAL, "kind" => "room").increment(report.room_conflicts.len() as u64);
    warn!(
        instructor_conflicts = report.instructor_conflicts.len(),
        room_conflicts = report.room_conflicts.len(),
        "mutation rejected: scheduling conflict"
    );
    Err(EngineError::SchedulingConflict(report))
}

impl Engine {
    /// Validate, resolve rooms, check conflicts, commit. Nothing is written
    /// for the assignment unless every step passes; rooms resolved along the
    /// way persist regardless.
    pub async fn create_assignment(&self, draft: AssignmentDraft) -> Result<Assignment, EngineError> {
        let started = Instant::now();
        let result = self.create_inner(draft).await;
        record_mutation("create", started, &result);
        result
    }

    async fn create_inner(&self, draft: AssignmentDraft) -> Result<Assignment, EngineError> {
        validate_draft(&draft)?;
        let _permit = self
            .assignment_quota
            .reserve(self.store.len())
            .ok_or(EngineError::LimitExceeded("too many assignments"))?;
        validate_references(self.directory.as_ref(), &References::from(&draft)).await?;
        let slots = self.resolve_slots(&draft.slots).await?;

        let _locks = self.locks.acquire(&keys_for(draft.instructor_id, &slots)).await;
        reject_conflicts(find_conflicts(&self.store, &slots, draft.instructor_id, None))?;

        let now = now_ms();
        let assignment = Assignment {
            id: self.next_id(),
            cohort_id: draft.cohort_id,
            program_id: draft.program_id,
            course_unit_id: draft.course_unit_id,
            instructor_id: draft.instructor_id,
            slots,
            period: draft.period,
            created_at: now,
            updated_at: now,
        };
        self.persist(&Event::AssignmentCreated {
            assignment: assignment.clone(),
        })
        .await?;
        info!(
            assignment_id = %assignment.id,
            instructor_id = %assignment.instructor_id,
            slots = assignment.slots.len(),
            "assignment created"
        );
        Ok(assignment)
    }

    /// Replace an existing assignment's references, slots and period through
    /// the full create pipeline. Conflicts with its own prior pattern are ignored.
    pub async fn update_assignment(&self, id: Ulid, draft: AssignmentDraft) -> Result<Assignment, EngineError> {
        let started = Instant::now();
        let result = self.update_inner(id, draft).await;
        record_mutation("update", started, &result);
        result
    }

    async fn update_inner(&self, id: Ulid, draft: AssignmentDraft) -> Result<Assignment, EngineError> {
        validate_draft(&draft)?;
        if !self.store.contains(&id) {
            return Err(EngineError::NotFound(EntityKind::Assignment, id));
        }
        validate_references(self.directory.as_ref(), &References::from(&draft)).await?;
        let slots = self.resolve_slots(&draft.slots).await?;

        let (current, _locks) = self
            .lock_assignment(id, keys_for(draft.instructor_id, &slots))
            .await?;
        reject_conflicts(find_conflicts(&self.store, &slots, draft.instructor_id, Some(id)))?;

        let assignment = Assignment {
            id,
            cohort_id: draft.cohort_id,
            program_id: draft.program_id,
            course_unit_id: draft.course_unit_id,
            instructor_id: draft.instructor_id,
            slots,
            period: draft.period,
            created_at: current.created_at,
            updated_at: now_ms(),
        };
        self.persist(&Event::AssignmentUpdated {
            assignment: assignment.clone(),
        })
        .await?;
        info!(assignment_id = %id, instructor_id = %assignment.instructor_id, "assignment updated");
        Ok(assignment)
    }

    /// Remove an assignment. Its instructor time and room time are free for
    /// the next conflict check; rooms themselves stay in the catalog.
    pub async fn delete_assignment(&self, id: Ulid) -> Result<Assignment, EngineError> {
        let started = Instant::now();
        let result = self.delete_inner(id).await;
        record_mutation("delete", started, &result);
        result
    }

    async fn delete_inner(&self, id: Ulid) -> Result<Assignment, EngineError> {
        let (current, _locks) = self.lock_assignment(id, BTreeSet::new()).await?;
        self.persist(&Event::AssignmentDeleted { id }).await?;
        info!(assignment_id = %id, instructor_id = %current.instructor_id, "assignment deleted");
        Ok(current)
    }

    /// Lock `wanted` plus every resource the stored record holds, and return
    /// the record as seen under those locks.
    ///
    /// The record's resources are read before locking, so a concurrent update
    /// can move it in between; in that case the locks are dropped and taken
    /// again for the new resources.
    async fn lock_assignment(
        &self,
        id: Ulid,
        wanted: BTreeSet<LockKey>,
    ) -> Result<(Assignment, LockSet), EngineError> {
        for attempt in 0..MAX_LOCK_RETRIES {
            let seen = self
                .store
                .get(&id)
                .ok_or(EngineError::NotFound(EntityKind::Assignment, id))?;
            let mut keys = wanted.clone();
            keys.extend(keys_of(&seen));
            let locks = self.locks.acquire(&keys).await;

            match self.store.get(&id) {
                None => return Err(EngineError::NotFound(EntityKind::Assignment, id)),
                Some(current) if keys_of(&current).is_subset(&keys) => return Ok((current, locks)),
                Some(_) => debug!(assignment_id = %id, attempt, "assignment moved while locking, retrying"),
            }
        }
        Err(EngineError::Store(
            "assignment modified concurrently, retry the request".into(),
        ))
    }

    /// Rewrite the WAL as the minimal event set for the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;

        let mut rooms = self.rooms.all();
        rooms.sort_by_key(|r| r.id);
        let mut assignments = self.store.all();
        assignments.sort_by_key(|a| a.id);
        let events: Vec<Event> = rooms
            .into_iter()
            .map(|room| Event::RoomCreated { room })
            .chain(
                assignments
                    .into_iter()
                    .map(|assignment| Event::AssignmentCreated { assignment }),
            )
            .collect();
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Store("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Store("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Store(format!("WAL compaction failed: {e}")))?;

        metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
        info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
