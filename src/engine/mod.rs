mod conflict;
mod error;
mod locks;
mod mutations;
mod queries;
mod references;
mod rooms;
mod store;

pub use error::{EngineError, EntityKind};
pub use locks::LockKey;
pub use references::{References, validate_references};
pub use rooms::normalize_label;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::error;
use ulid::Ulid;

use crate::directory::Directory;
use crate::limits::{MAX_ASSIGNMENTS, MAX_ROOMS, Quota};
use crate::model::*;
use crate::observability::{ASSIGNMENTS_ACTIVE, WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

use locks::LockTable;
use rooms::RoomCatalog;
use store::AssignmentStore;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Every append that is already queued when the first one
/// arrives joins its batch, and the whole batch shares one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_command(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_command(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();
    let appended = batch.iter().try_for_each(|(event, _)| wal.append_buffered(event));
    let result = appended.and(wal.flush_sync());
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    if let Err(ref e) = result {
        error!("WAL commit of {} event(s) failed: {e}", batch.len());
    }
    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_command(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
    }
}

/// The scheduling engine: room catalog, assignment store and the lifecycle
/// operations over them, all persisted through one WAL.
pub struct Engine {
    store: AssignmentStore,
    rooms: RoomCatalog,
    locks: LockTable,
    directory: Arc<dyn Directory>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Commits hold it shared from WAL append through apply; compaction holds
    /// it exclusively so its snapshot includes every event in the old log.
    commit_gate: RwLock<()>,
    ids: std::sync::Mutex<ulid::Generator>,
    assignment_quota: Quota,
    room_quota: Quota,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start the writer task. Must be called
    /// inside a tokio runtime.
    pub fn new(wal_path: PathBuf, directory: Arc<dyn Directory>) -> io::Result<Self> {
        Self::with_limits(wal_path, directory, MAX_ASSIGNMENTS, MAX_ROOMS)
    }

    /// [`Engine::new`] with explicit caps on stored assignments and rooms.
    pub fn with_limits(
        wal_path: PathBuf,
        directory: Arc<dyn Directory>,
        max_assignments: usize,
        max_rooms: usize,
    ) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: AssignmentStore::new(),
            rooms: RoomCatalog::new(),
            locks: LockTable::new(),
            directory,
            wal_tx,
            commit_gate: RwLock::new(()),
            ids: std::sync::Mutex::new(ulid::Generator::new()),
            assignment_quota: Quota::new(max_assignments),
            room_quota: Quota::new(max_rooms),
        };
        for event in &events {
            engine.apply(event);
        }
        metrics::gauge!(ASSIGNMENTS_ACTIVE).set(engine.store.len() as f64);
        Ok(engine)
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    fn apply(&self, event: &Event) {
        self.rooms.apply_event(event);
        self.store.apply_event(event);
    }

    /// Monotonic, so id order is creation order.
    fn next_id(&self) -> Ulid {
        let mut ids = self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ids.generate().unwrap_or_else(|_| Ulid::new())
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Store("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Store("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Store(format!("WAL append failed: {e}")))
    }

    /// Durably log `event`, then make it visible in memory.
    async fn persist(&self, event: &Event) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        self.wal_append(event).await?;
        self.apply(event);
        metrics::gauge!(ASSIGNMENTS_ACTIVE).set(self.store.len() as f64);
        Ok(())
    }
}
