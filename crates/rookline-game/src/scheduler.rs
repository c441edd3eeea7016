//! The shared clock scheduler.
//!
//! One task for the whole server. It starts when the first session is
//! activated, walks the active index every tick and stops once there is
//! nothing left to time and no checkpoint waiting for a retry. The task
//! holds a weak reference to the core, so dropping the last [`GameCore`]
//! ends it as well.
//!
//! Each sweep charges the side to move from the session's `clock_synced_at`
//! up to now, inside the volatile store's atomic update. A move that lands
//! between two sweeps has already charged its share and advanced the sync
//! point, so the next sweep only charges what is left.

use std::sync::{Arc, MutexGuard, Weak};

use rookline_protocol::{Clocks, Color, EndReason, GameResult, ServerMessage, SessionId};
use rookline_session::GameSession;
use rookline_tick::{Ticker, TickerConfig};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::GameCore;
use crate::service::Inner;

#[derive(Default)]
pub(crate) struct SchedulerState {
    running: bool,
    task: Option<JoinHandle<()>>,
}

/// What one sweep found in a session.
enum Sweep {
    /// Not in play; drop it from the index.
    Idle,
    Running {
        clocks: Clocks,
        session: GameSession,
        ending: Option<GameResult>,
    },
}

impl GameCore {
    fn scheduler_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.inner
            .scheduler
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_scheduler_running(&self) -> bool {
        self.scheduler_state().running
    }

    /// Starts the scheduler if there is work and it is not running.
    ///
    /// Callers activate the session before calling this, so a scheduler
    /// that is about to stop either sees the new entry or is restarted here.
    pub(crate) fn ensure_scheduler(&self) {
        let mut state = self.scheduler_state();
        if state.running || !self.has_scheduled_work() {
            return;
        }
        state.running = true;
        let weak = Arc::downgrade(&self.inner);
        let config = self.inner.clock_config.ticker();
        state.task = Some(tokio::spawn(run(weak, config)));
        info!(active = self.inner.store.active_len(), "clock scheduler started");
    }

    pub(crate) fn stop_scheduler(&self) {
        let mut state = self.scheduler_state();
        state.running = false;
        if let Some(task) = state.task.take() {
            task.abort();
            info!("clock scheduler stopped");
        }
    }

    fn has_scheduled_work(&self) -> bool {
        self.inner.store.active_len() > 0 || !self.inner.store.pending_checkpoints().is_empty()
    }

    /// Marks the scheduler stopped if it has nothing left to do.
    fn stop_if_idle(&self) -> bool {
        let mut state = self.scheduler_state();
        if self.has_scheduled_work() {
            return false;
        }
        state.running = false;
        state.task = None;
        info!("clock scheduler idle, stopping");
        true
    }

    /// One scheduler pass over every active session, then a retry of any
    /// failed checkpoints.
    ///
    /// Public so tests and embedders can drive the clock without waiting
    /// for the timer.
    pub async fn tick_once(&self) {
        let now = self.now_ms();
        let grace = self.inner.config.reconnect_grace.as_millis() as u64;
        let mut endings: Vec<(SessionId, GameResult)> = Vec::new();

        for id in self.inner.store.active_ids() {
            match self.inner.store.update(id, |s| sweep(s, now, grace)) {
                None | Some(Sweep::Idle) => {
                    self.inner.store.deactivate(id);
                    debug!(session_id = %id, "dropped from active index");
                }
                Some(Sweep::Running {
                    clocks,
                    session,
                    ending,
                }) => {
                    self.notify_both(
                        &session,
                        ServerMessage::TimerUpdate {
                            session_id: id,
                            clocks,
                        },
                    );
                    if let Some(result) = ending {
                        endings.push((id, result));
                    }
                }
            }
        }

        for (id, result) in endings {
            if let Err(e) = self.finalize(id, result).await {
                warn!(session_id = %id, error = %e, "scheduled finalize failed");
            }
        }

        if !self.inner.store.pending_checkpoints().is_empty() {
            self.inner.store.retry_pending().await;
        }
    }
}

async fn run(inner: Weak<Inner>, config: TickerConfig) {
    let mut ticker = Ticker::new(config);
    loop {
        let tick = ticker.next_tick().await;
        let Some(inner) = inner.upgrade() else {
            debug!("game core dropped, scheduler exiting");
            return;
        };
        let core = GameCore { inner };
        if tick.overran() {
            debug!(
                tick = tick.seq,
                skipped = tick.ticks_skipped,
                covered_ms = tick.elapsed().as_millis() as u64,
                "late tick, clocks charged for the full gap"
            );
        }

        core.tick_once().await;
        ticker.finish_tick();

        if core.stop_if_idle() {
            return;
        }
    }
}

/// Charges the running clock and decides whether the session ends here.
/// A flag beats abandonment.
fn sweep(session: &mut GameSession, now: u64, grace: u64) -> Sweep {
    if !session.status.is_in_play() {
        return Sweep::Idle;
    }
    session.charge_clock(now);

    let ending = if session.clocks.get(session.turn) == 0 {
        Some(GameResult::win(
            session.turn.opposite(),
            EndReason::TimeExpired,
        ))
    } else {
        abandonment(session, now, grace)
    };

    Sweep::Running {
        clocks: session.clocks,
        session: session.clone(),
        ending,
    }
}

fn abandonment(session: &GameSession, now: u64, grace: u64) -> Option<GameResult> {
    let gone = |c: Color| {
        session.away_since[c.index()].is_some_and(|since| now.saturating_sub(since) >= grace)
    };
    match (gone(Color::White), gone(Color::Black)) {
        (true, true) => Some(GameResult::draw(EndReason::Abandoned)),
        (true, false) => Some(GameResult::win(Color::Black, EndReason::Abandoned)),
        (false, true) => Some(GameResult::win(Color::White, EndReason::Abandoned)),
        (false, false) => None,
    }
}
