//! The move pipeline.
//!
//! ```text
//!   load ─→ validate ─→ rules.apply ─→ record ─→ compare-and-swap
//!     ▲                                              │ conflict
//!     └──────────────────────────────────────────────┘
//!                                                    │ stored
//!                                                    ▼
//!        checkpoint on cadence ─→ ack + broadcast ─→ terminal? / check?
//! ```
//!
//! Validation failures go back to the sender only and change nothing.
//! The write is a compare-and-swap on the session revision, so a clock
//! sweep (or any other writer) landing between load and store makes the
//! move start over from a fresh copy.

use rookline_protocol::{
    Color, EndReason, GameResult, MoveSpec, ParticipantId, ServerMessage, SessionId,
    SessionStatus,
};
use rookline_session::{GameSession, StoreError};
use tracing::{debug, info, warn};

use crate::{AppliedMove, GameCore, GameError, MoveOutcome, Terminal};

/// Who is submitting a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mover {
    Human(ParticipantId),
    Oracle,
}

enum Attempt {
    Stored {
        session: GameSession,
        color: Color,
        applied: AppliedMove,
    },
    Conflict,
}

impl GameCore {
    /// Handles `session.move` from a participant.
    ///
    /// # Errors
    /// `NotFound`, `NotParticipant`, `SessionNotActive`, `WrongTurn` or
    /// `IllegalMove`; none of them change the session. `Contended` if the
    /// session kept changing underneath the move.
    pub async fn submit_move(
        &self,
        participant: ParticipantId,
        id: SessionId,
        mv: MoveSpec,
    ) -> Result<(), GameError> {
        let result = self.process_move(id, Mover::Human(participant), mv).await;
        if matches!(result, Err(GameError::WrongTurn(_))) {
            // The engine is to move and nobody is asking it; ask again.
            let engine_to_move = self
                .inner
                .store
                .volatile()
                .get(id)
                .is_some_and(|s| s.status == SessionStatus::Active && s.is_oracle_turn());
            if engine_to_move {
                self.request_oracle_move(id);
            }
        }
        result
    }

    pub(crate) async fn process_move(
        &self,
        id: SessionId,
        mover: Mover,
        mv: MoveSpec,
    ) -> Result<(), GameError> {
        let limit = self.inner.config.move_retry_limit.max(1);
        for attempt in 1..=limit {
            let session = self.load(id).await?;
            match self.attempt_move(session, mover, &mv).await? {
                Attempt::Stored {
                    session,
                    color,
                    applied,
                } => return self.after_move(session, color, mover, mv, applied).await,
                Attempt::Conflict => {
                    debug!(session_id = %id, attempt, "move lost a write race, retrying");
                }
            }
        }
        warn!(session_id = %id, %mv, limit, "move abandoned after repeated conflicts");
        Err(GameError::Contended(id))
    }

    /// Validates and writes one move against one loaded copy.
    async fn attempt_move(
        &self,
        session: GameSession,
        mover: Mover,
        mv: &MoveSpec,
    ) -> Result<Attempt, GameError> {
        let id = session.id;
        let color = match mover {
            Mover::Human(participant) => {
                session
                    .color_of(participant)
                    .ok_or(GameError::NotParticipant {
                        session: id,
                        participant,
                    })?
            }
            Mover::Oracle => session
                .oracle_seat()
                .map(|(c, _)| c)
                .ok_or_else(|| GameError::Validation(format!("{id} has no engine seat")))?,
        };

        if session.status != SessionStatus::Active {
            return Err(GameError::SessionNotActive {
                session: id,
                status: session.status,
            });
        }
        let rules = &self.inner.rules;
        if rules.turn_to_move(&session.position) != color {
            return Err(GameError::WrongTurn(id));
        }

        // A flag that fell since the last sweep ends the game here.
        let now = self.now_ms();
        let spent = now.saturating_sub(session.clock_synced_at);
        if session.clocks.get(color) <= spent {
            let result = GameResult::win(color.opposite(), EndReason::TimeExpired);
            self.finalize(id, result).await?;
            return Err(GameError::SessionNotActive {
                session: id,
                status: SessionStatus::Finished,
            });
        }

        let applied = match rules.apply(&session.position, mv) {
            MoveOutcome::Accepted(applied) => applied,
            MoveOutcome::Rejected(reason) => {
                debug!(session_id = %id, %mv, %reason, "move rejected by rules");
                return Err(GameError::IllegalMove(format!("{mv}: {reason}")));
            }
        };

        let mut next = session;
        let turn = rules.turn_to_move(&applied.position);
        next.record_move(
            mv.clone(),
            applied.position.clone(),
            turn,
            applied.captured.clone(),
            now,
        );

        match self.inner.store.compare_and_swap(next) {
            Ok(stored) => Ok(Attempt::Stored {
                session: stored,
                color,
                applied,
            }),
            Err(StoreError::Conflict { .. }) => Ok(Attempt::Conflict),
            Err(StoreError::NotFound(_)) => Err(GameError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Everything that follows a stored move: checkpoint, notifications,
    /// game end and the engine's reply.
    async fn after_move(
        &self,
        session: GameSession,
        color: Color,
        mover: Mover,
        mv: MoveSpec,
        applied: AppliedMove,
    ) -> Result<(), GameError> {
        let id = session.id;
        self.inner.store.checkpoint_on_cadence(&session).await;

        let rules = &self.inner.rules;
        let legal = rules.legal_moves(&session.position);
        let legal_for = |c: Color| {
            if session.turn == c {
                legal.clone()
            } else {
                Vec::new()
            }
        };

        if let Mover::Human(_) = mover {
            self.notify(
                &session,
                color,
                ServerMessage::MoveAck {
                    session_id: id,
                    mv: mv.clone(),
                    position: session.position.clone(),
                    clocks: session.clocks,
                    legal_moves: legal_for(color),
                },
            );
        }
        self.notify(
            &session,
            color.opposite(),
            ServerMessage::MoveBroadcast {
                session_id: id,
                mv: mv.clone(),
                color,
                position: session.position.clone(),
                clocks: session.clocks,
                captured: applied.captured,
                legal_moves: legal_for(color.opposite()),
            },
        );
        info!(
            session_id = %id,
            %color,
            %mv,
            ply = session.move_log.len(),
            "move applied"
        );

        if let Some(terminal) = Terminal::resolve(&rules.classify_terminal(&session.position)) {
            self.finalize(id, terminal.result(color)).await?;
            return Ok(());
        }
        if applied.is_check {
            self.notify_both(
                &session,
                ServerMessage::Check {
                    session_id: id,
                    color: session.turn,
                },
            );
        }
        if session.is_oracle_turn() {
            self.request_oracle_move(id);
        }
        Ok(())
    }
}
