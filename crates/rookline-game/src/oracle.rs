//! The move oracle seam: who plays the engine seat.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use rand::seq::IndexedRandom;
use rookline_protocol::MoveSpec;

use crate::RulesEngine;

/// Why the oracle produced no move.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle did not answer in time")]
    Timeout,
    #[error("oracle has no move for this position")]
    NoMove,
    #[error("oracle failed: {0}")]
    Failed(String),
}

/// Computes a move for a non-human seat.
///
/// The returned future is `'static` so it can be awaited under
/// `tokio::time::timeout` from a spawned task. Callers bound the wait;
/// implementations need not.
pub trait MoveOracle: Send + Sync + 'static {
    fn request_move(
        &self,
        position: String,
        difficulty: u8,
    ) -> BoxFuture<'static, Result<MoveSpec, OracleError>>;
}

/// Plays a uniformly random legal move. Ignores difficulty.
pub struct RandomMoveOracle {
    rules: Arc<dyn RulesEngine>,
}

impl RandomMoveOracle {
    pub fn new(rules: Arc<dyn RulesEngine>) -> Self {
        Self { rules }
    }
}

impl MoveOracle for RandomMoveOracle {
    fn request_move(
        &self,
        position: String,
        _difficulty: u8,
    ) -> BoxFuture<'static, Result<MoveSpec, OracleError>> {
        let moves = self.rules.legal_moves(&position);
        let pick = moves.choose(&mut rand::rng()).cloned();
        Box::pin(async move { pick.ok_or(OracleError::NoMove) })
    }
}
