//! The game core: every service the gameplay paths share, in one handle.
//!
//! [`GameCore`] is cheap to clone (an `Arc` inside). Background work, such
//! as the clock scheduler and oracle requests, holds a clone, so the core
//! lives as long as anything still uses it. [`GameCore::shutdown`] stops
//! the background work explicitly.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use rookline_protocol::{Color, ParticipantId, ServerMessage, SessionId};
use rookline_session::{
    DurableStore, GameSession, MemoryDurableStore, SessionStore, StoreConfig, StoreError,
    SystemTimeSource, TimeSource,
};
use rookline_transport::ConnectionId;

use crate::scheduler::SchedulerState;
use crate::{
    ClockConfig, ConnectionRegistry, GameConfig, MatchmakingQueue, MemoryQueue, MoveOracle,
    Outbound, RandomMoveOracle, RulesEngine,
};

/// Largest id that survives a round trip through a JavaScript number.
const MAX_SESSION_ID: u64 = (1 << 53) - 1;

pub(crate) struct Inner {
    pub(crate) store: SessionStore,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) rules: Arc<dyn RulesEngine>,
    pub(crate) oracle: Arc<dyn MoveOracle>,
    pub(crate) queue: Arc<dyn MatchmakingQueue>,
    pub(crate) clock: Arc<dyn TimeSource>,
    pub(crate) config: GameConfig,
    pub(crate) clock_config: ClockConfig,
    pub(crate) scheduler: Mutex<SchedulerState>,
    /// Sessions with an oracle request in flight.
    pub(crate) oracle_pending: Mutex<HashSet<SessionId>>,
}

/// Shared handle to the game services.
#[derive(Clone)]
pub struct GameCore {
    pub(crate) inner: Arc<Inner>,
}

impl GameCore {
    /// Starts building a core around `rules`.
    pub fn builder(rules: Arc<dyn RulesEngine>) -> GameCoreBuilder {
        GameCoreBuilder::new(rules)
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub fn rules(&self) -> &Arc<dyn RulesEngine> {
        &self.inner.rules
    }

    pub fn config(&self) -> &GameConfig {
        &self.inner.config
    }

    pub fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    /// Registers a live connection for `participant`. Any earlier
    /// connection for the same participant stops receiving messages.
    pub fn attach(
        &self,
        participant: ParticipantId,
        connection: ConnectionId,
        tx: Outbound,
    ) -> Option<ConnectionId> {
        self.inner.registry.register(participant, connection, tx)
    }

    /// Restores the open sessions left in the durable store and starts the
    /// clock scheduler for them. Their seats count as away until the
    /// players reconnect.
    ///
    /// # Errors
    /// [`StoreError`] if the durable store cannot be listed.
    pub async fn recover(&self) -> Result<usize, StoreError> {
        let recovered = self.inner.store.recover().await?;
        self.ensure_scheduler();
        Ok(recovered)
    }

    /// Stops background work. In-flight requests finish on their own.
    pub fn shutdown(&self) {
        self.stop_scheduler();
        tracing::info!("game core shut down");
    }

    // -- Shared helpers ---------------------------------------------------

    pub(crate) fn new_session_id(&self) -> SessionId {
        loop {
            let id = SessionId(rand::rng().random_range(1..=MAX_SESSION_ID));
            if self.inner.store.volatile().get(id).is_none() {
                return id;
            }
        }
    }

    /// Sends to the human in `color`'s seat, if any and if connected.
    pub(crate) fn notify(&self, session: &GameSession, color: Color, msg: ServerMessage) -> bool {
        match session.seat(color) {
            Some(seat) if seat.is_human() => self.inner.registry.send(seat.participant, msg),
            _ => false,
        }
    }

    /// Sends the same message to both human seats.
    pub(crate) fn notify_both(&self, session: &GameSession, msg: ServerMessage) {
        for (_, participant) in session.humans() {
            self.inner.registry.send(participant, msg.clone());
        }
    }

    /// Sends `color` its full snapshot of `session`.
    pub(crate) fn send_snapshot(&self, session: &GameSession, color: Color) -> bool {
        let legal = if session.turn == color {
            self.inner.rules.legal_moves(&session.position)
        } else {
            Vec::new()
        };
        self.notify(
            session,
            color,
            ServerMessage::Snapshot(session.snapshot_for(color, legal)),
        )
    }

    pub(crate) fn oracle_pending(&self) -> MutexGuard<'_, HashSet<SessionId>> {
        self.inner
            .oracle_pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`GameCore`]. Every collaborator but the rules engine has a
/// default: in-memory durable store, FIFO queue, random-move oracle and the
/// system clock.
pub struct GameCoreBuilder {
    rules: Arc<dyn RulesEngine>,
    oracle: Option<Arc<dyn MoveOracle>>,
    queue: Option<Arc<dyn MatchmakingQueue>>,
    durable: Option<Arc<dyn DurableStore>>,
    clock: Option<Arc<dyn TimeSource>>,
    config: GameConfig,
    store_config: StoreConfig,
    clock_config: ClockConfig,
}

impl GameCoreBuilder {
    fn new(rules: Arc<dyn RulesEngine>) -> Self {
        Self {
            rules,
            oracle: None,
            queue: None,
            durable: None,
            clock: None,
            config: GameConfig::default(),
            store_config: StoreConfig::default(),
            clock_config: ClockConfig::default(),
        }
    }

    pub fn oracle(mut self, oracle: Arc<dyn MoveOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn MatchmakingQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn durable(mut self, durable: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(durable);
        self
    }

    pub fn time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: GameConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store_config(mut self, config: StoreConfig) -> Self {
        self.store_config = config;
        self
    }

    pub fn clock_config(mut self, config: ClockConfig) -> Self {
        self.clock_config = config;
        self
    }

    pub fn build(self) -> GameCore {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemTimeSource));
        let durable = self
            .durable
            .unwrap_or_else(|| Arc::new(MemoryDurableStore::new()));
        let oracle = self
            .oracle
            .unwrap_or_else(|| Arc::new(RandomMoveOracle::new(self.rules.clone())));
        let queue = self.queue.unwrap_or_else(|| Arc::new(MemoryQueue::new()));

        GameCore {
            inner: Arc::new(Inner {
                store: SessionStore::new(self.store_config, durable, clock.clone()),
                registry: ConnectionRegistry::new(),
                rules: self.rules,
                oracle,
                queue,
                clock,
                config: self.config,
                clock_config: self.clock_config,
                scheduler: Mutex::new(SchedulerState::default()),
                oracle_pending: Mutex::new(HashSet::new()),
            }),
        }
    }
}
