//! Unified error type for the Rookline server.

use rookline_game::GameError;
use rookline_protocol::ProtocolError;
use rookline_session::StoreError;
use rookline_transport::TransportError;

use crate::AuthError;

/// Top-level error wrapping every layer's error.
///
/// Only the connection setup and the accept loop return it; game requests
/// that fail become `error` frames for the sender instead.
#[derive(Debug, thiserror::Error)]
pub enum RooklineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Startup recovery could not read the durable store.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The connection broke the handshake rules (wrong first frame,
    /// version mismatch, timeout).
    #[error("handshake failed: {0}")]
    Handshake(String),
}

#[cfg(test)]
mod tests {
    use rookline_protocol::SessionId;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: RooklineError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, RooklineError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_store_error() {
        let err: RooklineError = StoreError::NotFound(SessionId(4)).into();
        assert!(matches!(err, RooklineError::Store(_)));
    }

    #[test]
    fn test_from_game_error() {
        let err: RooklineError = GameError::WrongTurn(SessionId(1)).into();
        assert!(matches!(err, RooklineError::Game(_)));
        assert_eq!(err.to_string(), "not your turn in session S-1");
    }

    #[test]
    fn test_from_auth_error() {
        let err: RooklineError = AuthError::Reserved.into();
        assert!(matches!(err, RooklineError::Auth(_)));
    }
}
