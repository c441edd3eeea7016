//! The cache-aside session store.
//!
//! [`SessionStore`] puts the volatile store (truth for live sessions) in
//! front of a [`DurableStore`] (truth for recoverable and finished ones).
//!
//! ```text
//!   get(id) ──→ volatile hit? ──yes──→ session
//!                    │no
//!                    ▼
//!               durable load ──non-terminal──→ rebuild ──→ reinstall
//!                    │terminal / absent
//!                    ▼
//!                  None
//! ```
//!
//! Failed checkpoints never fail the caller's game action. They are logged,
//! remembered in a pending set, and retried by [`SessionStore::retry_pending`].
//!
//! Checkpoints for one session are written one at a time and never move the
//! durable record backwards: a copy older than the last one written, or a
//! live copy after a terminal one, is dropped.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use rookline_protocol::{Color, ParticipantId, SessionId};
use tracing::{debug, info, warn};

use crate::{DurableStore, GameSession, StoreConfig, StoreError, TimeSource, VolatileStore};

/// The last record handed to the durable store for one session.
#[derive(Debug, Clone, Copy)]
struct Written {
    revision: u64,
    terminal: bool,
    at: u64,
}

impl Written {
    fn supersedes(&self, session: &GameSession) -> bool {
        session.revision < self.revision || (self.terminal && !session.status.is_terminal())
    }
}

type WriteSlot = Arc<tokio::sync::Mutex<Option<Written>>>;

/// Cache-aside repository for [`GameSession`]s.
pub struct SessionStore {
    volatile: VolatileStore,
    durable: Arc<dyn DurableStore>,
    clock: Arc<dyn TimeSource>,
    config: StoreConfig,
    pending: Mutex<BTreeSet<SessionId>>,
    written: Mutex<HashMap<SessionId, WriteSlot>>,
}

impl SessionStore {
    pub fn new(
        config: StoreConfig,
        durable: Arc<dyn DurableStore>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            volatile: VolatileStore::new(config.shards, clock.clone()),
            durable,
            clock,
            config,
            pending: Mutex::new(BTreeSet::new()),
            written: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Direct access to the hot store for atomic updates.
    pub fn volatile(&self) -> &VolatileStore {
        &self.volatile
    }

    // -- Reads ------------------------------------------------------------

    /// Resolves a session, rebuilding it from the durable store on a
    /// volatile miss.
    ///
    /// A volatile hit is returned as-is, terminal or not. A durable record
    /// is only restored if it is non-terminal.
    ///
    /// # Errors
    /// [`StoreError`] if the durable read fails.
    pub async fn get(&self, id: SessionId) -> Result<Option<GameSession>, StoreError> {
        if let Some(session) = self.volatile.get(id) {
            return Ok(Some(session));
        }

        let Some(record) = self.durable.load(id).await? else {
            debug!(session_id = %id, "session absent from both stores");
            return Ok(None);
        };
        if record.status.is_terminal() {
            debug!(session_id = %id, status = %record.status, "durable record is terminal");
            return Ok(None);
        }

        Ok(Some(self.reinstall(record)))
    }

    /// Rebuilds every open durable record into the volatile store, with
    /// its participant pointers and, for a running game, a place in the
    /// active index.
    ///
    /// Called at startup. Rebuilt games have every seat away, so the clock
    /// scheduler ends those nobody comes back to. Returns how many sessions
    /// were restored.
    ///
    /// # Errors
    /// [`StoreError`] if the durable store cannot be listed.
    pub async fn recover(&self) -> Result<usize, StoreError> {
        let records = self.durable.list().await?;
        let total = records.len();
        let mut open = 0;
        for record in records.into_iter().filter(|r| !r.status.is_terminal()) {
            if self.volatile.get(record.id).is_none() {
                self.reinstall(record);
            }
            open += 1;
        }
        info!(open, total, "open sessions recovered from durable store");
        Ok(open)
    }

    /// Rebuilds `record` as of now and installs it. If a concurrent caller
    /// got there first, its copy wins.
    fn reinstall(&self, record: GameSession) -> GameSession {
        let id = record.id;
        let rebuilt = rebuild(record, self.clock.now_ms(), &self.config);

        let (rebuilt, inserted) = self.volatile.put_if_absent(rebuilt);
        if !inserted {
            return rebuilt;
        }
        if rebuilt.status.is_in_play() {
            self.volatile.activate(id);
        }
        for (_, participant) in rebuilt.humans() {
            self.bind(participant, id);
        }
        info!(
            session_id = %id,
            white_ms = rebuilt.clocks.white_ms,
            black_ms = rebuilt.clocks.black_ms,
            "session rebuilt from durable store"
        );
        rebuilt
    }

    // -- Writes -----------------------------------------------------------

    /// Installs a freshly created session: volatile entry, pointers for
    /// the human seats, active index if it is running, and a first
    /// checkpoint.
    pub async fn create(&self, session: GameSession) -> GameSession {
        let id = session.id;
        self.volatile.put(session.clone());
        for (_, participant) in session.humans() {
            self.bind(participant, id);
        }
        if session.status.is_in_play() {
            self.volatile.activate(id);
        }
        info!(session_id = %id, mode = %session.mode, status = %session.status, "session created");
        self.prune_written();
        let _ = self.checkpoint(&session).await;
        session
    }

    /// See [`VolatileStore::compare_and_swap`].
    pub fn compare_and_swap(&self, session: GameSession) -> Result<GameSession, StoreError> {
        self.volatile.compare_and_swap(session)
    }

    /// See [`VolatileStore::update`].
    pub fn update<R>(&self, id: SessionId, f: impl FnOnce(&mut GameSession) -> R) -> Option<R> {
        self.volatile.update(id, f)
    }

    pub fn evict(&self, id: SessionId) {
        self.volatile.remove(id);
        self.volatile.deactivate(id);
        debug!(session_id = %id, "session evicted from volatile store");
    }

    // -- Checkpoints ------------------------------------------------------

    /// Writes `session` to the durable store.
    ///
    /// Waits for any checkpoint of the same session still in flight. A copy
    /// superseded by what was already written is skipped and reported as
    /// `Ok`. On failure the id joins the pending set and the error is
    /// returned for the caller to log or ignore.
    pub async fn checkpoint(&self, session: &GameSession) -> Result<(), StoreError> {
        let slot = self.write_slot(session.id);
        let mut last = slot.lock().await;
        if last.is_some_and(|w| w.supersedes(session)) {
            debug!(
                session_id = %session.id,
                revision = session.revision,
                status = %session.status,
                "stale checkpoint skipped"
            );
            return Ok(());
        }

        match self.durable.save(session).await {
            Ok(()) => {
                *last = Some(Written {
                    revision: session.revision,
                    terminal: session.status.is_terminal(),
                    at: self.clock.now_ms(),
                });
                self.pending_set().remove(&session.id);
                debug!(
                    session_id = %session.id,
                    moves = session.move_log.len(),
                    status = %session.status,
                    "checkpoint written"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    error = %e,
                    "PERSISTENCE_ERROR: checkpoint failed, queued for retry"
                );
                self.pending_set().insert(session.id);
                Err(e)
            }
        }
    }

    /// Checkpoints only when the move log length hits the cadence.
    pub async fn checkpoint_on_cadence(&self, session: &GameSession) {
        let every = self.config.checkpoint_every.max(1);
        let moves = session.move_log.len();
        if moves > 0 && moves % every == 0 {
            let _ = self.checkpoint(session).await;
        }
    }

    /// Persists a terminal session and evicts it once the write landed.
    /// A failed write leaves the entry to lapse after `finished_ttl`, so
    /// the retry loop can still reach it.
    pub async fn checkpoint_terminal(&self, session: &GameSession) -> Result<(), StoreError> {
        self.volatile.deactivate(session.id);
        match self.checkpoint(session).await {
            Ok(()) => {
                self.evict(session.id);
                Ok(())
            }
            Err(e) => {
                self.volatile
                    .expire_in(session.id, self.config.finished_ttl.as_millis() as u64);
                Err(e)
            }
        }
    }

    /// Retries every failed checkpoint once. Returns how many succeeded.
    pub async fn retry_pending(&self) -> usize {
        self.prune_written();
        let ids: Vec<SessionId> = self.pending_set().iter().copied().collect();
        let mut written = 0;
        for id in ids {
            let Some(session) = self.volatile.get(id) else {
                warn!(session_id = %id, "pending checkpoint dropped, session no longer cached");
                self.pending_set().remove(&id);
                continue;
            };
            let result = if session.status.is_terminal() {
                self.checkpoint_terminal(&session).await
            } else {
                self.checkpoint(&session).await
            };
            if result.is_ok() {
                info!(session_id = %id, "pending checkpoint written on retry");
                written += 1;
            }
        }
        written
    }

    pub fn pending_checkpoints(&self) -> Vec<SessionId> {
        self.pending_set().iter().copied().collect()
    }

    fn pending_set(&self) -> std::sync::MutexGuard<'_, BTreeSet<SessionId>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn write_slot(&self, id: SessionId) -> WriteSlot {
        let mut written = self.written.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(written.entry(id).or_default())
    }

    /// Forgets write marks of sessions that finished more than
    /// `finished_ttl` ago and have no checkpoint in flight.
    fn prune_written(&self) {
        let cutoff = self
            .clock
            .now_ms()
            .saturating_sub(self.config.finished_ttl.as_millis() as u64);
        let mut written = self.written.lock().unwrap_or_else(|p| p.into_inner());
        written.retain(|_, slot| {
            let Ok(last) = slot.try_lock() else {
                return true;
            };
            !last.is_some_and(|w| w.terminal && w.at <= cutoff)
        });
    }

    // -- Pointers and index ---------------------------------------------

    pub fn bind(&self, participant: ParticipantId, id: SessionId) {
        self.volatile
            .bind(participant, id, self.config.pointer_ttl.as_millis() as u64);
    }

    pub fn pointer(&self, participant: ParticipantId) -> Option<SessionId> {
        self.volatile.pointer(participant)
    }

    pub fn unbind(&self, participant: ParticipantId, id: SessionId) -> bool {
        self.volatile.unbind(participant, id)
    }

    /// Adds `id` to the active index. `true` if newly added.
    pub fn activate(&self, id: SessionId) -> bool {
        self.volatile.activate(id)
    }

    pub fn deactivate(&self, id: SessionId) -> bool {
        self.volatile.deactivate(id)
    }

    pub fn active_ids(&self) -> Vec<SessionId> {
        self.volatile.active_ids()
    }

    pub fn active_len(&self) -> usize {
        self.volatile.active_len()
    }
}

/// Restores a non-terminal durable record as of `now`.
///
/// For a running game the side to move is charged for the whole outage
/// (from the later of the last move and the last clock sync), floored at
/// zero. If the outage exceeded `buffer_threshold`, both clocks are
/// credited `grace`. Every human seat is marked away: nobody holds a
/// connection to a session that was only on disk.
pub fn rebuild(mut session: GameSession, now: u64, config: &StoreConfig) -> GameSession {
    if !session.status.is_in_play() {
        return session;
    }

    let since = session
        .last_move_at
        .unwrap_or(0)
        .max(session.clock_synced_at);
    let elapsed = now.saturating_sub(since);

    if session.last_move_by != Some(session.turn) {
        session.clocks.charge(session.turn, elapsed);
    }
    if elapsed > config.buffer_threshold.as_millis() as u64 {
        session.clocks.credit_both(config.grace.as_millis() as u64);
        debug!(
            session_id = %session.id,
            elapsed_ms = elapsed,
            grace_ms = config.grace.as_millis() as u64,
            "outage exceeded threshold, grace credited"
        );
    }
    session.clock_synced_at = session.clock_synced_at.max(now);

    let humans: Vec<Color> = session.humans().map(|(c, _)| c).collect();
    for color in humans {
        session.mark_away(color, now);
    }
    session
}
