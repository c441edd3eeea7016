//! The in-process hot store for live sessions.
//!
//! Sessions live in a fixed number of shards, each a `HashMap` behind its
//! own mutex, so sessions on different shards never contend. Every write
//! to an entry goes through one of two atomic paths:
//!
//! - [`VolatileStore::update`] runs a closure under the shard lock.
//! - [`VolatileStore::compare_and_swap`] installs a modified copy only if
//!   nobody wrote in between (checked by `revision`).
//!
//! Alongside the sessions the store keeps the participant → session
//! pointers (with a lifetime) and the active-session index the clock
//! scheduler walks.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};

use rookline_protocol::{ParticipantId, SessionId};

use crate::{GameSession, StoreError, TimeSource};

struct Entry {
    session: GameSession,
    /// Unix ms after which the entry reads as absent.
    expires_at: Option<u64>,
}

struct Pointer {
    session_id: SessionId,
    expires_at: u64,
}

/// Sharded in-memory session map plus pointers and the active index.
pub struct VolatileStore {
    shards: Vec<Mutex<HashMap<SessionId, Entry>>>,
    pointers: Mutex<HashMap<ParticipantId, Pointer>>,
    active: Mutex<BTreeSet<SessionId>>,
    clock: Arc<dyn TimeSource>,
}

/// Locks a mutex, recovering the data if a panicking thread poisoned it.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl VolatileStore {
    pub fn new(shards: usize, clock: Arc<dyn TimeSource>) -> Self {
        let shards = (0..shards.max(1)).map(|_| Mutex::new(HashMap::new())).collect();
        Self {
            shards,
            pointers: Mutex::new(HashMap::new()),
            active: Mutex::new(BTreeSet::new()),
            clock,
        }
    }

    fn shard(&self, id: SessionId) -> &Mutex<HashMap<SessionId, Entry>> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Drops the entry if its lifetime lapsed. Returns the live entry.
    fn live<'a>(
        map: &'a mut HashMap<SessionId, Entry>,
        id: SessionId,
        now: u64,
    ) -> Option<&'a mut Entry> {
        if map.get(&id).is_some_and(|e| e.expires_at.is_some_and(|t| t <= now)) {
            map.remove(&id);
            tracing::debug!(session_id = %id, "volatile entry expired");
            return None;
        }
        map.get_mut(&id)
    }

    // -- Sessions ---------------------------------------------------------

    /// A copy of the stored session.
    pub fn get(&self, id: SessionId) -> Option<GameSession> {
        let now = self.clock.now_ms();
        let mut shard = lock(self.shard(id));
        Self::live(&mut shard, id, now).map(|e| e.session.clone())
    }

    /// Inserts or replaces a session unconditionally, clearing any expiry.
    pub fn put(&self, session: GameSession) {
        let mut shard = lock(self.shard(session.id));
        shard.insert(
            session.id,
            Entry {
                session,
                expires_at: None,
            },
        );
    }

    /// Inserts `session` unless a live entry exists. Returns the stored
    /// copy and whether it is the one just inserted.
    pub fn put_if_absent(&self, session: GameSession) -> (GameSession, bool) {
        let now = self.clock.now_ms();
        let id = session.id;
        let mut shard = lock(self.shard(id));
        if let Some(existing) = Self::live(&mut shard, id, now) {
            return (existing.session.clone(), false);
        }
        shard.insert(
            id,
            Entry {
                session: session.clone(),
                expires_at: None,
            },
        );
        (session, true)
    }

    /// Stores `session` if the stored revision still equals
    /// `session.revision`. The stored copy gets the next revision, which
    /// is also returned.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the entry is gone,
    /// [`StoreError::Conflict`] if another writer got there first.
    pub fn compare_and_swap(&self, mut session: GameSession) -> Result<GameSession, StoreError> {
        let now = self.clock.now_ms();
        let id = session.id;
        let mut shard = lock(self.shard(id));
        let entry = Self::live(&mut shard, id, now).ok_or(StoreError::NotFound(id))?;
        if entry.session.revision != session.revision {
            return Err(StoreError::Conflict {
                id,
                expected: session.revision,
                found: entry.session.revision,
            });
        }
        session.revision += 1;
        entry.session = session.clone();
        Ok(session)
    }

    /// Bumps the stored session's revision, then runs `f` on it under the
    /// shard lock. A copy taken inside `f` carries the stored revision.
    /// `None` if the session is absent.
    pub fn update<R>(&self, id: SessionId, f: impl FnOnce(&mut GameSession) -> R) -> Option<R> {
        let now = self.clock.now_ms();
        let mut shard = lock(self.shard(id));
        let entry = Self::live(&mut shard, id, now)?;
        entry.session.revision += 1;
        Some(f(&mut entry.session))
    }

    pub fn remove(&self, id: SessionId) -> Option<GameSession> {
        lock(self.shard(id)).remove(&id).map(|e| e.session)
    }

    /// Lets the entry lapse `ttl_ms` from now instead of living forever.
    pub fn expire_in(&self, id: SessionId, ttl_ms: u64) {
        let now = self.clock.now_ms();
        if let Some(entry) = lock(self.shard(id)).get_mut(&id) {
            entry.expires_at = Some(now.saturating_add(ttl_ms));
        }
    }

    /// Number of stored sessions, expired ones included until touched.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| lock(s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- Participant pointers ---------------------------------------------

    /// Points `participant` at `session_id` for `ttl_ms`.
    pub fn bind(&self, participant: ParticipantId, session_id: SessionId, ttl_ms: u64) {
        let expires_at = self.clock.now_ms().saturating_add(ttl_ms);
        lock(&self.pointers).insert(
            participant,
            Pointer {
                session_id,
                expires_at,
            },
        );
    }

    /// The session `participant` is bound to, if the pointer is still live.
    pub fn pointer(&self, participant: ParticipantId) -> Option<SessionId> {
        let now = self.clock.now_ms();
        let mut pointers = lock(&self.pointers);
        match pointers.get(&participant) {
            Some(p) if p.expires_at > now => Some(p.session_id),
            Some(_) => {
                pointers.remove(&participant);
                None
            }
            None => None,
        }
    }

    /// Removes the pointer only if it still names `session_id`.
    pub fn unbind(&self, participant: ParticipantId, session_id: SessionId) -> bool {
        let mut pointers = lock(&self.pointers);
        if pointers.get(&participant).is_some_and(|p| p.session_id == session_id) {
            pointers.remove(&participant);
            true
        } else {
            false
        }
    }

    // -- Active index -----------------------------------------------------

    /// Adds `id` to the active index. Returns `true` if it was not there.
    pub fn activate(&self, id: SessionId) -> bool {
        lock(&self.active).insert(id)
    }

    pub fn deactivate(&self, id: SessionId) -> bool {
        lock(&self.active).remove(&id)
    }

    pub fn is_active(&self, id: SessionId) -> bool {
        lock(&self.active).contains(&id)
    }

    /// The active ids, in ascending order.
    pub fn active_ids(&self) -> Vec<SessionId> {
        lock(&self.active).iter().copied().collect()
    }

    pub fn active_len(&self) -> usize {
        lock(&self.active).len()
    }
}

#[cfg(test)]
mod tests {
    use rookline_protocol::{Clocks, Color, GameMode};

    use super::*;
    use crate::{ManualTimeSource, Seat};

    fn store() -> (VolatileStore, Arc<ManualTimeSource>) {
        let clock = Arc::new(ManualTimeSource::new(1_000));
        (VolatileStore::new(4, clock.clone()), clock)
    }

    fn session(id: u64) -> GameSession {
        GameSession::new(
            SessionId(id),
            GameMode::PlayerVsPlayer,
            [
                Some(Seat::human(ParticipantId(1))),
                Some(Seat::human(ParticipantId(2))),
            ],
            "w0".into(),
            Color::White,
            Clocks::even(60_000),
            1_000,
        )
    }

    // =====================================================================
    // Sessions
    // =====================================================================

    #[test]
    fn test_get_returns_copy_of_put() {
        let (store, _) = store();
        store.put(session(1));
        assert_eq!(store.get(SessionId(1)).unwrap().id, SessionId(1));
        assert!(store.get(SessionId(2)).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_put_if_absent_keeps_existing_entry() {
        let (store, _) = store();
        let mut first = session(1);
        first.position = "first".into();
        assert!(store.put_if_absent(first).1);

        let (stored, inserted) = store.put_if_absent(session(1));

        assert!(!inserted);
        assert_eq!(stored.position, "first");
    }

    #[test]
    fn test_compare_and_swap_bumps_revision() {
        let (store, _) = store();
        store.put(session(1));

        let mut copy = store.get(SessionId(1)).unwrap();
        copy.position = "b1".into();
        let stored = store.compare_and_swap(copy).unwrap();

        assert_eq!(stored.revision, 1);
        assert_eq!(store.get(SessionId(1)).unwrap().position, "b1");
    }

    #[test]
    fn test_compare_and_swap_stale_copy_conflicts() {
        let (store, _) = store();
        store.put(session(1));
        let stale = store.get(SessionId(1)).unwrap();

        store.update(SessionId(1), |s| s.position = "x".into());

        let err = store.compare_and_swap(stale).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: 0,
                found: 1,
                ..
            }
        ));
        assert_eq!(store.get(SessionId(1)).unwrap().position, "x");
    }

    #[test]
    fn test_compare_and_swap_missing_is_not_found() {
        let (store, _) = store();
        let err = store.compare_and_swap(session(5)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(SessionId(5))));
    }

    #[test]
    fn test_update_copy_carries_stored_revision() {
        let (store, _) = store();
        store.put(session(1));

        let copy = store.update(SessionId(1), |s| s.clone()).unwrap();

        assert_eq!(copy.revision, 1);
        assert_eq!(store.get(SessionId(1)).unwrap().revision, 1);
    }

    #[test]
    fn test_update_missing_returns_none() {
        let (store, _) = store();
        assert_eq!(store.update(SessionId(1), |_| 7), None);
    }

    #[test]
    fn test_expire_in_hides_entry_after_ttl() {
        let (store, clock) = store();
        store.put(session(1));
        store.expire_in(SessionId(1), 500);

        clock.set(1_499);
        assert!(store.get(SessionId(1)).is_some());
        clock.set(1_500);
        assert!(store.get(SessionId(1)).is_none());
        assert!(store.is_empty());
    }

    // =====================================================================
    // Pointers
    // =====================================================================

    #[test]
    fn test_pointer_expires() {
        let (store, clock) = store();
        store.bind(ParticipantId(1), SessionId(9), 1_000);
        assert_eq!(store.pointer(ParticipantId(1)), Some(SessionId(9)));

        clock.set(2_000);
        assert_eq!(store.pointer(ParticipantId(1)), None);
    }

    #[test]
    fn test_unbind_only_matching_session() {
        let (store, _) = store();
        store.bind(ParticipantId(1), SessionId(9), 10_000);

        assert!(!store.unbind(ParticipantId(1), SessionId(8)));
        assert_eq!(store.pointer(ParticipantId(1)), Some(SessionId(9)));
        assert!(store.unbind(ParticipantId(1), SessionId(9)));
        assert_eq!(store.pointer(ParticipantId(1)), None);
    }

    // =====================================================================
    // Active index
    // =====================================================================

    #[test]
    fn test_active_index_is_a_set() {
        let (store, _) = store();
        assert!(store.activate(SessionId(3)));
        assert!(!store.activate(SessionId(3)));
        assert!(store.activate(SessionId(1)));

        assert_eq!(store.active_ids(), vec![SessionId(1), SessionId(3)]);
        assert!(store.deactivate(SessionId(3)));
        assert!(!store.is_active(SessionId(3)));
        assert_eq!(store.active_len(), 1);
    }
}
