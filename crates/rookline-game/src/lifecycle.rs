//! Session lifecycle: start, rooms, resignation, chat and finalization.

use rookline_protocol::{
    Clocks, Color, EndReason, GameMode, GameResult, ParticipantId, ServerMessage, SessionId,
    SessionStatus, StartParams,
};
use rookline_session::{GameSession, Seat};
use tracing::{debug, info};

use crate::{GameCore, GameError};

/// What `start` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A session exists; both seats (or the room creator) got a snapshot.
    Started(SessionId),
    /// No partner yet; the participant is queued.
    Queued,
}

impl GameCore {
    /// Resolves a session that must exist.
    pub(crate) async fn load(&self, id: SessionId) -> Result<GameSession, GameError> {
        self.inner
            .store
            .get(id)
            .await?
            .ok_or(GameError::NotFound(id))
    }

    /// Resolves a session and the seat `participant` holds in it.
    pub(crate) async fn load_seated(
        &self,
        id: SessionId,
        participant: ParticipantId,
    ) -> Result<(GameSession, Color), GameError> {
        let session = self.load(id).await?;
        let color = session
            .color_of(participant)
            .ok_or(GameError::NotParticipant {
                session: id,
                participant,
            })?;
        Ok((session, color))
    }

    /// Refuses if `participant` is already bound to a live session.
    async fn ensure_free(&self, participant: ParticipantId) -> Result<(), GameError> {
        let Some(id) = self.inner.store.pointer(participant) else {
            return Ok(());
        };
        match self.inner.store.get(id).await? {
            Some(s) if !s.status.is_terminal() => Err(GameError::AlreadyInSession {
                participant,
                session: id,
            }),
            _ => {
                self.inner.store.unbind(participant, id);
                Ok(())
            }
        }
    }

    fn initial_clocks(&self, params: &StartParams) -> Result<Clocks, GameError> {
        let ms = params
            .initial_clock_ms
            .unwrap_or(self.inner.config.initial_clock.as_millis() as u64);
        if ms == 0 {
            return Err(GameError::Validation("initial clock must be positive".into()));
        }
        Ok(Clocks::even(ms))
    }

    fn fresh_session(
        &self,
        mode: GameMode,
        seats: [Option<Seat>; 2],
        clocks: Clocks,
    ) -> GameSession {
        let rules = &self.inner.rules;
        let position = rules.initial_position(mode);
        let turn = rules.turn_to_move(&position);
        GameSession::new(
            self.new_session_id(),
            mode,
            seats,
            position,
            turn,
            clocks,
            self.now_ms(),
        )
    }

    // -- Start ------------------------------------------------------------

    /// Handles `session.start`.
    ///
    /// Starting an engine game or a room withdraws the participant from
    /// the matchmaking queue.
    ///
    /// # Errors
    /// [`GameError::AlreadyInSession`] if the participant has a live
    /// session, [`GameError::Validation`] for bad parameters.
    pub async fn start(
        &self,
        participant: ParticipantId,
        mode: GameMode,
        params: StartParams,
    ) -> Result<StartOutcome, GameError> {
        self.ensure_free(participant).await?;
        let clocks = self.initial_clocks(&params)?;

        match mode {
            GameMode::PlayerVsPlayer => {
                let Some(partner) = self.dequeue_free_partner(participant).await? else {
                    self.inner.queue.enqueue(participant);
                    self.inner.registry.send(participant, ServerMessage::QueueWaiting);
                    debug!(%participant, "queued for a partner");
                    return Ok(StartOutcome::Queued);
                };
                self.inner.queue.remove(participant);
                // The partner has waited longest, so they take white.
                let seats = [Some(Seat::human(partner)), Some(Seat::human(participant))];
                let session = self.fresh_session(mode, seats, clocks);
                Ok(StartOutcome::Started(self.install(session).await))
            }
            GameMode::PlayerVsEngine => {
                self.leave_queue(participant);
                let color = params.color.unwrap_or(Color::White);
                let difficulty = params
                    .difficulty
                    .unwrap_or(self.inner.config.default_difficulty);
                let mut seats = [None, None];
                seats[color.index()] = Some(Seat::human(participant));
                seats[color.opposite().index()] = Some(Seat::oracle(difficulty));
                let session = self.fresh_session(mode, seats, clocks);
                Ok(StartOutcome::Started(self.install(session).await))
            }
            GameMode::RoomMatch => {
                self.leave_queue(participant);
                let seats = [Some(Seat::human(participant)), None];
                let session = self.fresh_session(mode, seats, clocks);
                Ok(StartOutcome::Started(self.install(session).await))
            }
        }
    }

    /// Takes the longest-waiting partner that is not already playing.
    /// Anyone dequeued while bound to a live session is dropped from the
    /// queue.
    async fn dequeue_free_partner(
        &self,
        participant: ParticipantId,
    ) -> Result<Option<ParticipantId>, GameError> {
        while let Some(partner) = self.inner.queue.dequeue_oldest_other_than(participant) {
            match self.ensure_free(partner).await {
                Ok(()) => return Ok(Some(partner)),
                Err(GameError::AlreadyInSession { session, .. }) => {
                    debug!(%partner, session_id = %session, "queued partner already playing, skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Withdraws a matchmaking entry: one participant, one game.
    fn leave_queue(&self, participant: ParticipantId) {
        if self.inner.queue.remove(participant) {
            debug!(%participant, "left the matchmaking queue");
        }
    }

    /// Stores a new session and tells its seats.
    async fn install(&self, session: GameSession) -> SessionId {
        let session = self.inner.store.create(session).await;
        let id = session.id;
        for (color, _) in session.humans() {
            self.send_snapshot(&session, color);
        }
        if session.status.is_in_play() {
            self.ensure_scheduler();
            if session.is_oracle_turn() {
                self.request_oracle_move(id);
            }
        } else if !self.inner.store.pending_checkpoints().is_empty() {
            // The scheduler owns checkpoint retries.
            self.ensure_scheduler();
        }
        info!(session_id = %id, mode = %session.mode, "session started");
        id
    }

    // -- Rooms ------------------------------------------------------------

    /// Handles `room.join`: seats `participant` as black in a waiting room.
    ///
    /// # Errors
    /// `NotFound`, `Validation` (not a room or already seated),
    /// `SessionNotActive` (no longer waiting), `AlreadyInSession`.
    pub async fn join_room(
        &self,
        participant: ParticipantId,
        id: SessionId,
    ) -> Result<(), GameError> {
        let session = self.load(id).await?;
        if session.mode != GameMode::RoomMatch {
            return Err(GameError::Validation(format!("{id} is not a room")));
        }
        if session.color_of(participant).is_some() {
            return Err(GameError::Validation(format!("already seated in {id}")));
        }
        self.ensure_free(participant).await?;
        self.leave_queue(participant);

        let now = self.now_ms();
        let joined = self
            .inner
            .store
            .update(id, |s| {
                s.seat_black(Seat::human(participant), now)
                    .map(|()| s.clone())
                    .map_err(|_| GameError::SessionNotActive {
                        session: id,
                        status: s.status,
                    })
            })
            .ok_or(GameError::NotFound(id))??;

        self.inner.store.bind(participant, id);
        self.inner.store.activate(id);
        let _ = self.inner.store.checkpoint(&joined).await;
        for (color, _) in joined.humans() {
            self.send_snapshot(&joined, color);
        }
        self.ensure_scheduler();
        info!(session_id = %id, %participant, "room joined");
        Ok(())
    }

    /// Handles `room.leave`. A waiting room is cancelled; a running game
    /// is resigned.
    ///
    /// # Errors
    /// `NotFound`, `NotParticipant`, `SessionNotActive` if already over.
    pub async fn leave_room(
        &self,
        participant: ParticipantId,
        id: SessionId,
    ) -> Result<(), GameError> {
        let (session, _) = self.load_seated(id, participant).await?;
        if session.status.is_in_play() {
            return self.resign(participant, id).await;
        }

        let now = self.now_ms();
        let cancelled = self
            .inner
            .store
            .update(id, |s| s.cancel(now).then(|| s.clone()))
            .flatten()
            .ok_or(GameError::SessionNotActive {
                session: id,
                status: session.status,
            })?;

        for (color, p) in cancelled.humans() {
            self.inner.store.unbind(p, id);
            self.send_snapshot(&cancelled, color);
        }
        if self.inner.store.checkpoint_terminal(&cancelled).await.is_err() {
            self.ensure_scheduler();
        }
        info!(session_id = %id, %participant, "room cancelled");
        Ok(())
    }

    // -- Resign / chat ----------------------------------------------------

    /// Handles `session.resign`: the opponent wins.
    ///
    /// # Errors
    /// `NotFound`, `NotParticipant`, `SessionNotActive`.
    pub async fn resign(&self, participant: ParticipantId, id: SessionId) -> Result<(), GameError> {
        let (session, color) = self.load_seated(id, participant).await?;
        if !session.status.is_in_play() {
            return Err(GameError::SessionNotActive {
                session: id,
                status: session.status,
            });
        }
        let result = GameResult::win(color.opposite(), EndReason::Resignation);
        if !self.finalize(id, result).await? {
            return Err(GameError::SessionNotActive {
                session: id,
                status: SessionStatus::Finished,
            });
        }
        Ok(())
    }

    /// Handles `chat.send`: relays trimmed text to the opponent.
    ///
    /// # Errors
    /// `Validation` for empty or oversized text, `NotFound`,
    /// `NotParticipant`, `SessionNotActive` once the game is over.
    pub async fn chat(
        &self,
        participant: ParticipantId,
        id: SessionId,
        text: &str,
    ) -> Result<(), GameError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GameError::Validation("chat message is empty".into()));
        }
        let max = self.inner.config.max_chat_len;
        if text.chars().count() > max {
            return Err(GameError::Validation(format!(
                "chat message longer than {max} characters"
            )));
        }
        let (session, color) = self.load_seated(id, participant).await?;
        if session.status.is_terminal() {
            return Err(GameError::SessionNotActive {
                session: id,
                status: session.status,
            });
        }
        self.notify(
            &session,
            color.opposite(),
            ServerMessage::ChatMessage {
                session_id: id,
                from: participant,
                text: text.to_string(),
            },
        );
        Ok(())
    }

    // -- Finalize ---------------------------------------------------------

    /// Ends a session with `result`.
    ///
    /// Only the caller whose update actually moves the session to
    /// `Finished` gets `Ok(true)` and does the follow-up: terminal
    /// checkpoint, pointer and index cleanup, and one `session.over` per
    /// seat. Every other caller, concurrent or late, gets `Ok(false)`.
    ///
    /// # Errors
    /// [`GameError::Store`] if the session cannot be read.
    pub async fn finalize(&self, id: SessionId, result: GameResult) -> Result<bool, GameError> {
        self.finalize_when(id, result, |_| true).await
    }

    /// [`finalize`](Self::finalize), but only if `guard` holds for the
    /// session inside the same atomic update.
    pub(crate) async fn finalize_when(
        &self,
        id: SessionId,
        result: GameResult,
        guard: impl FnOnce(&GameSession) -> bool,
    ) -> Result<bool, GameError> {
        // Makes sure a session that only exists on disk is loaded.
        if self.inner.store.get(id).await?.is_none() {
            return Ok(false);
        }
        let now = self.now_ms();
        let Some(finished) = self
            .inner
            .store
            .update(id, |s| {
                if !guard(s) {
                    return None;
                }
                s.charge_clock(now);
                s.finish(result, now).then(|| s.clone())
            })
            .flatten()
        else {
            debug!(session_id = %id, "finalize skipped");
            return Ok(false);
        };

        self.inner.store.deactivate(id);
        for (_, participant) in finished.humans() {
            self.inner.store.unbind(participant, id);
        }
        if self.inner.store.checkpoint_terminal(&finished).await.is_err() {
            // The scheduler owns checkpoint retries.
            self.ensure_scheduler();
        }
        self.notify_both(&finished, ServerMessage::over(id, result));

        info!(
            session_id = %id,
            winner = ?result.winner,
            reason = %result.reason,
            moves = finished.move_log.len(),
            "session finished"
        );
        Ok(true)
    }
}
