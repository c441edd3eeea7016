//! Drives the engine seat in player-vs-engine sessions.
//!
//! A request runs on its own task under `tokio::time::timeout`. At most one
//! request per session is in flight. A failed or late answer is reported
//! to the human as a retryable error and leaves the session untouched; the
//! next trigger (a reconnect, or a move attempt while the engine is to
//! move) asks again.

use rookline_protocol::{SessionId, SessionStatus};
use tracing::{debug, info, warn};

use crate::moves::Mover;
use crate::{GameCore, GameError, OracleError};

/// Holds a session's in-flight slot until dropped.
struct InFlight<'a> {
    core: &'a GameCore,
    id: SessionId,
}

impl<'a> InFlight<'a> {
    fn claim(core: &'a GameCore, id: SessionId) -> Option<Self> {
        core.oracle_pending()
            .insert(id)
            .then_some(Self { core, id })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.core.oracle_pending().remove(&self.id);
    }
}

impl GameCore {
    /// Asks the oracle for a move in the background.
    pub(crate) fn request_oracle_move(&self, id: SessionId) {
        let core = self.clone();
        tokio::spawn(async move {
            if let Err(e) = core.drive_oracle(id).await {
                debug!(session_id = %id, error = %e, "engine request ended without a move");
            }
        });
    }

    /// Requests and plays one engine move, if the engine is to move.
    ///
    /// Returns `Ok(false)` when there was nothing to do: another request
    /// is in flight, the session is not running, or it is the human's turn.
    ///
    /// # Errors
    /// [`GameError::OracleTimeout`] or [`GameError::Oracle`] when no usable
    /// move came back (the human has been told), or any error from the
    /// move pipeline.
    pub async fn drive_oracle(&self, id: SessionId) -> Result<bool, GameError> {
        let Some(slot) = InFlight::claim(self, id) else {
            debug!(session_id = %id, "engine request already in flight");
            return Ok(false);
        };

        let session = self.load(id).await?;
        if session.status != SessionStatus::Active || !session.is_oracle_turn() {
            return Ok(false);
        }
        let Some((color, difficulty)) = session.oracle_seat() else {
            return Ok(false);
        };

        let timeout = self.inner.config.oracle_timeout;
        let request = self
            .inner
            .oracle
            .request_move(session.position.clone(), difficulty);
        let answer = match tokio::time::timeout(timeout, request).await {
            Ok(answer) => answer,
            Err(_) => Err(OracleError::Timeout),
        };

        let mv = match answer {
            Ok(mv) => mv,
            Err(source) => {
                let err = match source {
                    OracleError::Timeout => GameError::OracleTimeout(id),
                    source => GameError::Oracle {
                        session: id,
                        source,
                    },
                };
                warn!(
                    session_id = %id,
                    difficulty,
                    timeout_ms = timeout.as_millis() as u64,
                    error = %err,
                    "engine produced no move"
                );
                self.notify(&session, color.opposite(), err.to_message());
                return Err(err);
            }
        };
        drop(slot);

        match self.process_move(id, Mover::Oracle, mv.clone()).await {
            Ok(()) => {
                info!(session_id = %id, %mv, difficulty, "engine moved");
                Ok(true)
            }
            Err(GameError::IllegalMove(reason)) => {
                let err = GameError::Oracle {
                    session: id,
                    source: OracleError::Failed(reason),
                };
                warn!(session_id = %id, %mv, "engine move rejected by rules");
                self.notify(&session, color.opposite(), err.to_message());
                Err(err)
            }
            Err(e) => Err(e),
        }
    }
}
