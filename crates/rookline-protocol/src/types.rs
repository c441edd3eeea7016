//! Domain types that travel on the wire.
//!
//! Everything here is plain data: identifiers, colors, clocks, moves and
//! results. The session crate builds its authoritative model out of these,
//! and the message catalogue embeds them in snapshots and broadcasts.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a participant (registered user or guest).
///
/// Newtype over `u64` so a `SessionId` can never be passed where a
/// participant is expected. `#[serde(transparent)]` keeps it a plain number
/// in JSON.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl ParticipantId {
    /// Identity used for the oracle-driven seat in engine games.
    ///
    /// Authenticators must never hand this id to a human connection.
    pub const ENGINE: ParticipantId = ParticipantId(0);

    /// Returns `true` for the reserved engine identity.
    pub fn is_engine(self) -> bool {
        self == Self::ENGINE
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a game session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Color / mode / status
// ---------------------------------------------------------------------------

/// The two sides of a board.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// Both colors, white first. Seat order in a session follows this.
    pub const ALL: [Color; 2] = [Color::White, Color::Black];

    /// The other side.
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Seat index: white = 0, black = 1.
    pub fn index(self) -> usize {
        match self {
            Color::White => 0,
            Color::Black => 1,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

/// How a session was formed and who supplies the moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMode {
    /// Two humans paired by the matchmaking queue.
    PlayerVsPlayer,
    /// One human against the move oracle.
    PlayerVsEngine,
    /// A room created by one human and joined by another.
    RoomMatch,
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameMode::PlayerVsPlayer => write!(f, "PLAYER_VS_PLAYER"),
            GameMode::PlayerVsEngine => write!(f, "PLAYER_VS_ENGINE"),
            GameMode::RoomMatch => write!(f, "ROOM_MATCH"),
        }
    }
}

/// The lifecycle state of a session.
///
/// ```text
/// Waiting ──→ Active ⇄ Disconnected
///    │          │          │
///    ▼          └────┬─────┘
/// Cancelled          ▼
///                 Finished
/// ```
///
/// Forward-only except the `Active ⇄ Disconnected` pair. `Waiting` is
/// skipped by modes that start immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Waiting,
    Active,
    Disconnected,
    Finished,
    Cancelled,
}

impl SessionStatus {
    /// `Finished` and `Cancelled` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }

    /// `Active` or `Disconnected`: the clock runs and the game can end.
    pub fn is_in_play(self) -> bool {
        matches!(self, Self::Active | Self::Disconnected)
    }

    /// Returns `true` if moving from `self` to `target` is allowed.
    pub fn can_transition_to(self, target: Self) -> bool {
        use SessionStatus::*;
        matches!(
            (self, target),
            (Waiting, Active)
                | (Waiting, Cancelled)
                | (Active, Disconnected)
                | (Disconnected, Active)
                | (Active, Finished)
                | (Disconnected, Finished)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Waiting => "WAITING",
            Self::Active => "ACTIVE",
            Self::Disconnected => "DISCONNECTED",
            Self::Finished => "FINISHED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Moves and clocks
// ---------------------------------------------------------------------------

/// A candidate move as submitted by a participant or returned by the oracle.
///
/// Squares are kept as strings ("e2") because the server never interprets
/// them; only the rules engine does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveSpec {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<char>,
}

impl MoveSpec {
    /// A move without promotion.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            promotion: None,
        }
    }

    /// Sets the promotion piece.
    pub fn promoting(mut self, piece: char) -> Self {
        self.promotion = Some(piece);
        self
    }
}

impl fmt::Display for MoveSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(p) = self.promotion {
            write!(f, "{p}")?;
        }
        Ok(())
    }
}

/// One entry of a session's append-only move log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    #[serde(rename = "move")]
    pub mv: MoveSpec,
    pub color: Color,
    /// Unix milliseconds at which the move was applied.
    pub at: u64,
}

/// Remaining time per color, in milliseconds.
///
/// Unsigned on purpose: a clock cannot be negative, and every decrement
/// goes through [`Clocks::charge`], which saturates at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clocks {
    pub white_ms: u64,
    pub black_ms: u64,
}

impl Clocks {
    /// Both sides start with the same allowance.
    pub fn even(ms: u64) -> Self {
        Self {
            white_ms: ms,
            black_ms: ms,
        }
    }

    /// Remaining time for `color`.
    pub fn get(&self, color: Color) -> u64 {
        match color {
            Color::White => self.white_ms,
            Color::Black => self.black_ms,
        }
    }

    /// Subtracts `ms` from `color`'s clock, floored at zero.
    /// Returns the new remaining time.
    pub fn charge(&mut self, color: Color, ms: u64) -> u64 {
        let slot = self.slot(color);
        *slot = slot.saturating_sub(ms);
        *slot
    }

    /// Adds `ms` to both clocks.
    pub fn credit_both(&mut self, ms: u64) {
        self.white_ms = self.white_ms.saturating_add(ms);
        self.black_ms = self.black_ms.saturating_add(ms);
    }

    /// The first color whose clock reads zero, white checked first.
    pub fn flagged(&self) -> Option<Color> {
        Color::ALL.into_iter().find(|c| self.get(*c) == 0)
    }

    fn slot(&mut self, color: Color) -> &mut u64 {
        match color {
            Color::White => &mut self.white_ms,
            Color::Black => &mut self.black_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndReason {
    Checkmate,
    Resignation,
    TimeExpired,
    Agreed,
    Stalemate,
    InsufficientMaterial,
    ThreefoldRepetition,
    OtherDraw,
    /// A participant stayed away past the reconnection grace window.
    Abandoned,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Checkmate => "checkmate",
            Self::Resignation => "resignation",
            Self::TimeExpired => "time expired",
            Self::Agreed => "agreed",
            Self::Stalemate => "stalemate",
            Self::InsufficientMaterial => "insufficient material",
            Self::ThreefoldRepetition => "threefold repetition",
            Self::OtherDraw => "draw rule",
            Self::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Final outcome of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    /// `None` for a draw.
    pub winner: Option<Color>,
    pub reason: EndReason,
}

impl GameResult {
    /// `winner` wins for `reason`.
    pub fn win(winner: Color, reason: EndReason) -> Self {
        Self {
            winner: Some(winner),
            reason,
        }
    }

    /// A drawn game.
    pub fn draw(reason: EndReason) -> Self {
        Self {
            winner: None,
            reason,
        }
    }

    /// The losing color, if the game was decisive.
    pub fn loser(&self) -> Option<Color> {
        self.winner.map(Color::opposite)
    }

    pub fn is_draw(&self) -> bool {
        self.winner.is_none()
    }
}

// ---------------------------------------------------------------------------
// Start parameters
// ---------------------------------------------------------------------------

/// Optional knobs on `session.start`. Anything left out uses server defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartParams {
    /// Initial clock per side, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_clock_ms: Option<u64>,
    /// Preferred color against the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    /// Engine strength, passed through to the move oracle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u8>,
}
