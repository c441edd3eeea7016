//! The game session entity.
//!
//! A [`GameSession`] is the one record every part of the server reads and
//! mutates: seats, position, move log, clocks, status and result. The same
//! struct is the durable record; it serializes whole.
//!
//! Mutators here never touch the stores. They enforce the entity's own
//! invariants (forward-only status, append-only log, clocks that never go
//! below zero) and leave persistence to [`SessionStore`](crate::SessionStore).

use rookline_protocol::{
    Clocks, Color, GameMode, GameResult, MoveRecord, MoveSpec, ParticipantId, SessionId,
    SessionSnapshot, SessionStatus,
};
use serde::{Deserialize, Serialize};

use crate::StoreError;

// ---------------------------------------------------------------------------
// Seats
// ---------------------------------------------------------------------------

/// Where a seat's moves come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MoveSource {
    /// Submitted by a connected participant.
    Human,
    /// Requested from the move oracle at the given strength.
    Oracle { difficulty: u8 },
}

/// One side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub participant: ParticipantId,
    pub source: MoveSource,
}

impl Seat {
    pub fn human(participant: ParticipantId) -> Self {
        Self {
            participant,
            source: MoveSource::Human,
        }
    }

    pub fn oracle(difficulty: u8) -> Self {
        Self {
            participant: ParticipantId::ENGINE,
            source: MoveSource::Oracle { difficulty },
        }
    }

    pub fn is_human(&self) -> bool {
        self.source == MoveSource::Human
    }
}

// ---------------------------------------------------------------------------
// GameSession
// ---------------------------------------------------------------------------

/// One live or finished game.
///
/// Timestamps are unix milliseconds. `clock_synced_at` is the instant the
/// stored clocks were last accurate; every clock charge runs from there
/// to "now" and then advances it, so time is never charged twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    pub id: SessionId,
    pub mode: GameMode,
    /// Indexed by [`Color::index`]. Black is empty while a room waits.
    pub seats: [Option<Seat>; 2],
    pub position: String,
    /// Side to move in `position`, as reported by the rules engine.
    pub turn: Color,
    pub move_log: Vec<MoveRecord>,
    pub captured_pieces: Vec<String>,
    pub clocks: Clocks,
    pub last_move_at: Option<u64>,
    pub last_move_by: Option<Color>,
    pub status: SessionStatus,
    /// Offers made per color. Only ever increases.
    pub draw_offers: [u32; 2],
    pub pending_draw_offer: Option<Color>,
    pub result: Option<GameResult>,
    pub created_at: u64,
    pub ended_at: Option<u64>,
    pub clock_synced_at: u64,
    /// When each human seat went away, if it is away.
    pub away_since: [Option<u64>; 2],
    /// Bumped by the volatile store on every write.
    pub revision: u64,
}

impl GameSession {
    /// A new session. It starts `Active` when both seats are filled and
    /// `Waiting` otherwise.
    pub fn new(
        id: SessionId,
        mode: GameMode,
        seats: [Option<Seat>; 2],
        position: String,
        turn: Color,
        clocks: Clocks,
        now: u64,
    ) -> Self {
        let status = if seats.iter().all(Option::is_some) {
            SessionStatus::Active
        } else {
            SessionStatus::Waiting
        };
        Self {
            id,
            mode,
            seats,
            position,
            turn,
            move_log: Vec::new(),
            captured_pieces: Vec::new(),
            clocks,
            last_move_at: None,
            last_move_by: None,
            status,
            draw_offers: [0; 2],
            pending_draw_offer: None,
            result: None,
            created_at: now,
            ended_at: None,
            clock_synced_at: now,
            away_since: [None; 2],
            revision: 0,
        }
    }

    // -- Seats -----------------------------------------------------------

    pub fn seat(&self, color: Color) -> Option<&Seat> {
        self.seats[color.index()].as_ref()
    }

    pub fn participant(&self, color: Color) -> Option<ParticipantId> {
        self.seat(color).map(|s| s.participant)
    }

    /// The color `participant` plays, if seated. The engine identity never
    /// matches, so a human cannot act for the oracle seat.
    pub fn color_of(&self, participant: ParticipantId) -> Option<Color> {
        if participant.is_engine() {
            return None;
        }
        Color::ALL
            .into_iter()
            .find(|c| self.participant(*c) == Some(participant))
    }

    /// Seated humans, white first.
    pub fn humans(&self) -> impl Iterator<Item = (Color, ParticipantId)> + '_ {
        Color::ALL.into_iter().filter_map(|c| {
            self.seat(c)
                .filter(|s| s.is_human())
                .map(|s| (c, s.participant))
        })
    }

    /// The oracle seat's color and difficulty, for engine games.
    pub fn oracle_seat(&self) -> Option<(Color, u8)> {
        Color::ALL.into_iter().find_map(|c| match self.seat(c)?.source {
            MoveSource::Oracle { difficulty } => Some((c, difficulty)),
            MoveSource::Human => None,
        })
    }

    /// `true` when the side to move is played by the oracle.
    pub fn is_oracle_turn(&self) -> bool {
        self.oracle_seat().is_some_and(|(c, _)| c == self.turn)
    }

    /// Fills the empty black seat of a waiting room and starts the game.
    ///
    /// # Errors
    /// [`StoreError::InvalidTransition`] if the session is not waiting.
    pub fn seat_black(&mut self, seat: Seat, now: u64) -> Result<(), StoreError> {
        self.transition(SessionStatus::Active)?;
        self.seats[Color::Black.index()] = Some(seat);
        self.clock_synced_at = now;
        Ok(())
    }

    // -- Status ----------------------------------------------------------

    /// Moves to `target` if the state machine allows it.
    ///
    /// # Errors
    /// [`StoreError::InvalidTransition`] otherwise.
    pub fn transition(&mut self, target: SessionStatus) -> Result<(), StoreError> {
        if !self.status.can_transition_to(target) {
            return Err(StoreError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Records the final result. Returns `false` (and changes nothing) if
    /// the session already reached a terminal state.
    pub fn finish(&mut self, result: GameResult, now: u64) -> bool {
        if self.transition(SessionStatus::Finished).is_err() {
            return false;
        }
        self.result = Some(result);
        self.ended_at = Some(now);
        self.pending_draw_offer = None;
        true
    }

    /// Cancels a waiting session. Returns `false` if it is not waiting.
    pub fn cancel(&mut self, now: u64) -> bool {
        if self.transition(SessionStatus::Cancelled).is_err() {
            return false;
        }
        self.ended_at = Some(now);
        true
    }

    // -- Presence --------------------------------------------------------

    /// Marks a human seat as away. Returns `true` if it was present.
    pub fn mark_away(&mut self, color: Color, now: u64) -> bool {
        if !self.seat(color).is_some_and(Seat::is_human) || self.away_since[color.index()].is_some()
        {
            return false;
        }
        self.away_since[color.index()] = Some(now);
        if self.status == SessionStatus::Active {
            self.status = SessionStatus::Disconnected;
        }
        true
    }

    /// Marks a seat as back. Returns `true` if it had been away.
    pub fn mark_back(&mut self, color: Color) -> bool {
        if self.away_since[color.index()].take().is_none() {
            return false;
        }
        if self.status == SessionStatus::Disconnected && self.away_since.iter().all(Option::is_none)
        {
            self.status = SessionStatus::Active;
        }
        true
    }

    pub fn is_away(&self, color: Color) -> bool {
        self.away_since[color.index()].is_some()
    }

    // -- Clocks ----------------------------------------------------------

    /// Charges the side to move for the time since `clock_synced_at`.
    ///
    /// Only running games are charged. A `now` at or before the sync point
    /// charges nothing, so a late caller cannot double-count.
    /// Returns the milliseconds charged.
    pub fn charge_clock(&mut self, now: u64) -> u64 {
        if !self.status.is_in_play() || now <= self.clock_synced_at {
            return 0;
        }
        let elapsed = now - self.clock_synced_at;
        self.clocks.charge(self.turn, elapsed);
        self.clock_synced_at = now;
        elapsed
    }

    // -- Moves -----------------------------------------------------------

    /// Appends an applied move and installs the resulting position.
    ///
    /// The mover's clock is charged up to `now` first.
    pub fn record_move(
        &mut self,
        mv: MoveSpec,
        position: String,
        turn: Color,
        captured: Option<String>,
        now: u64,
    ) {
        let color = self.turn;
        self.charge_clock(now);
        self.clock_synced_at = self.clock_synced_at.max(now);
        self.move_log.push(MoveRecord { mv, color, at: now });
        if let Some(piece) = captured {
            self.captured_pieces.push(piece);
        }
        self.position = position;
        self.turn = turn;
        self.last_move_at = Some(now);
        self.last_move_by = Some(color);
        self.pending_draw_offer = None;
    }

    // -- Views -----------------------------------------------------------

    /// The snapshot `color` sees. `legal_moves` is dropped unless it is
    /// that color's turn in a running game.
    pub fn snapshot_for(&self, color: Color, legal_moves: Vec<MoveSpec>) -> SessionSnapshot {
        let legal_moves = if self.turn == color && self.status.is_in_play() {
            legal_moves
        } else {
            Vec::new()
        };
        SessionSnapshot {
            session_id: self.id,
            mode: self.mode,
            status: self.status,
            position: self.position.clone(),
            turn: self.turn,
            clocks: self.clocks,
            move_log: self.move_log.clone(),
            captured_pieces: self.captured_pieces.clone(),
            your_color: color,
            opponent: self.participant(color.opposite()),
            result: self.result,
            legal_moves,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use rookline_protocol::EndReason;

    use super::*;

    fn pid(id: u64) -> ParticipantId {
        ParticipantId(id)
    }

    fn pvp() -> GameSession {
        GameSession::new(
            SessionId(1),
            GameMode::PlayerVsPlayer,
            [Some(Seat::human(pid(1))), Some(Seat::human(pid(2)))],
            "w0".into(),
            Color::White,
            Clocks::even(600_000),
            1_000,
        )
    }

    // =====================================================================
    // Construction and seats
    // =====================================================================

    #[test]
    fn test_new_with_both_seats_is_active() {
        let s = pvp();
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.clock_synced_at, 1_000);
        assert_eq!(s.color_of(pid(2)), Some(Color::Black));
        assert_eq!(s.color_of(pid(9)), None);
    }

    #[test]
    fn test_new_room_waits_for_black() {
        let mut s = GameSession::new(
            SessionId(2),
            GameMode::RoomMatch,
            [Some(Seat::human(pid(1))), None],
            "w0".into(),
            Color::White,
            Clocks::even(1_000),
            0,
        );
        assert_eq!(s.status, SessionStatus::Waiting);
        assert_eq!(s.charge_clock(5_000), 0);

        s.seat_black(Seat::human(pid(2)), 5_000).unwrap();
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.clock_synced_at, 5_000);
        assert!(s.seat_black(Seat::human(pid(3)), 6_000).is_err());
    }

    #[test]
    fn test_engine_identity_never_holds_a_color() {
        let s = GameSession::new(
            SessionId(3),
            GameMode::PlayerVsEngine,
            [Some(Seat::human(pid(1))), Some(Seat::oracle(4))],
            "w0".into(),
            Color::White,
            Clocks::even(1_000),
            0,
        );
        assert_eq!(s.color_of(ParticipantId::ENGINE), None);
        assert_eq!(s.oracle_seat(), Some((Color::Black, 4)));
        assert!(!s.is_oracle_turn());
        assert_eq!(s.humans().collect::<Vec<_>>(), vec![(Color::White, pid(1))]);
    }

    // =====================================================================
    // Status
    // =====================================================================

    #[test]
    fn test_finish_is_idempotent() {
        let mut s = pvp();
        assert!(s.finish(GameResult::win(Color::White, EndReason::Checkmate), 2_000));
        assert!(!s.finish(GameResult::draw(EndReason::Agreed), 3_000));
        assert_eq!(s.result.unwrap().reason, EndReason::Checkmate);
        assert_eq!(s.ended_at, Some(2_000));
    }

    #[test]
    fn test_cancel_only_from_waiting() {
        let mut s = pvp();
        assert!(!s.cancel(2_000));
        assert_eq!(s.status, SessionStatus::Active);
    }

    // =====================================================================
    // Presence
    // =====================================================================

    #[test]
    fn test_mark_away_and_back_toggle_status() {
        let mut s = pvp();
        assert!(s.mark_away(Color::White, 2_000));
        assert!(!s.mark_away(Color::White, 2_500));
        assert_eq!(s.status, SessionStatus::Disconnected);

        assert!(s.mark_away(Color::Black, 3_000));
        assert!(s.mark_back(Color::White));
        assert_eq!(s.status, SessionStatus::Disconnected);
        assert!(s.mark_back(Color::Black));
        assert_eq!(s.status, SessionStatus::Active);
        assert!(!s.mark_back(Color::Black));
    }

    // =====================================================================
    // Clocks and moves
    // =====================================================================

    #[test]
    fn test_charge_clock_only_charges_new_time() {
        let mut s = pvp();
        assert_eq!(s.charge_clock(2_000), 1_000);
        assert_eq!(s.charge_clock(2_000), 0);
        assert_eq!(s.charge_clock(1_500), 0);
        assert_eq!(s.clocks.white_ms, 599_000);
        assert_eq!(s.clocks.black_ms, 600_000);
    }

    #[test]
    fn test_charge_clock_runs_while_disconnected() {
        let mut s = pvp();
        s.mark_away(Color::Black, 1_000);
        assert_eq!(s.charge_clock(4_000), 3_000);
    }

    #[test]
    fn test_record_move_appends_and_flips_turn() {
        let mut s = pvp();
        s.pending_draw_offer = Some(Color::Black);
        s.record_move(
            MoveSpec::new("e2", "e4"),
            "b1".into(),
            Color::Black,
            Some("p".into()),
            1_500,
        );

        assert_eq!(s.move_log.len(), 1);
        assert_eq!(s.move_log[0].color, Color::White);
        assert_eq!(s.captured_pieces, vec!["p".to_string()]);
        assert_eq!(s.turn, Color::Black);
        assert_eq!(s.last_move_by, Some(Color::White));
        assert_eq!(s.last_move_at, Some(1_500));
        assert_eq!(s.clocks.white_ms, 599_500);
        assert_eq!(s.pending_draw_offer, None);
    }

    #[test]
    fn test_snapshot_hides_legal_moves_off_turn() {
        let s = pvp();
        let legal = vec![MoveSpec::new("e2", "e4")];

        let white = s.snapshot_for(Color::White, legal.clone());
        assert_eq!(white.legal_moves, legal);
        assert_eq!(white.opponent, Some(pid(2)));

        let black = s.snapshot_for(Color::Black, legal);
        assert!(black.legal_moves.is_empty());
        assert_eq!(black.your_color, Color::Black);
    }

    #[test]
    fn test_session_round_trips_as_durable_record() {
        let mut s = pvp();
        s.record_move(MoveSpec::new("e2", "e4"), "b1".into(), Color::Black, None, 2_000);
        let json = serde_json::to_string(&s).unwrap();
        let back: GameSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
