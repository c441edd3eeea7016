//! The rules engine seam.
//!
//! Rookline never judges a move itself. Everything about legality, whose
//! turn it is and how a game ends comes from a [`RulesEngine`]; the server
//! only stores the positions it returns.

use rookline_protocol::{Color, EndReason, GameMode, GameResult, MoveSpec};

/// Result of applying a candidate move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Accepted(AppliedMove),
    /// Illegal in this position. The string is shown to the sender.
    Rejected(String),
}

/// The position after an accepted move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub position: String,
    pub captured: Option<String>,
    /// The side now to move is in check.
    pub is_check: bool,
}

/// A game-ending condition of a position.
///
/// Declared in resolution priority: when a position meets several, the
/// first one listed wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Terminal {
    Stalemate,
    InsufficientMaterial,
    ThreefoldRepetition,
    OtherDraw,
    Checkmate,
}

impl Terminal {
    /// The highest-priority condition in `conditions`.
    pub fn resolve(conditions: &[Terminal]) -> Option<Terminal> {
        conditions.iter().copied().min()
    }

    /// The result of a game that ended this way right after `mover` moved.
    pub fn result(self, mover: Color) -> GameResult {
        match self {
            Terminal::Stalemate => GameResult::draw(EndReason::Stalemate),
            Terminal::InsufficientMaterial => GameResult::draw(EndReason::InsufficientMaterial),
            Terminal::ThreefoldRepetition => GameResult::draw(EndReason::ThreefoldRepetition),
            Terminal::OtherDraw => GameResult::draw(EndReason::OtherDraw),
            Terminal::Checkmate => GameResult::win(mover, EndReason::Checkmate),
        }
    }
}

/// Judges moves and positions. Positions are opaque strings to the server.
///
/// Implementations must be deterministic: replaying a session's move log
/// from `initial_position` must reproduce its stored position.
pub trait RulesEngine: Send + Sync + 'static {
    fn initial_position(&self, mode: GameMode) -> String;

    fn apply(&self, position: &str, mv: &MoveSpec) -> MoveOutcome;

    fn turn_to_move(&self, position: &str) -> Color;

    /// Every terminal condition the position meets. Empty if the game
    /// goes on.
    fn classify_terminal(&self, position: &str) -> Vec<Terminal>;

    fn legal_moves(&self, position: &str) -> Vec<MoveSpec>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_draws_over_checkmate() {
        let all = [
            Terminal::Checkmate,
            Terminal::OtherDraw,
            Terminal::ThreefoldRepetition,
            Terminal::InsufficientMaterial,
            Terminal::Stalemate,
        ];
        assert_eq!(Terminal::resolve(&all), Some(Terminal::Stalemate));
        assert_eq!(
            Terminal::resolve(&[Terminal::Checkmate, Terminal::ThreefoldRepetition]),
            Some(Terminal::ThreefoldRepetition)
        );
        assert_eq!(Terminal::resolve(&[]), None);
    }

    #[test]
    fn test_checkmate_result_credits_mover() {
        let result = Terminal::Checkmate.result(Color::Black);
        assert_eq!(result.winner, Some(Color::Black));
        assert_eq!(result.reason, EndReason::Checkmate);
        assert!(Terminal::Stalemate.result(Color::White).is_draw());
    }
}
