//! Errors surfaced by game operations.
//!
//! Every variant maps to a wire [`ErrorKind`]; the connection handler
//! turns a `GameError` into an `error{kind, message}` frame for the sender
//! only.

use rookline_protocol::{ErrorKind, ParticipantId, ServerMessage, SessionId, SessionStatus};
use rookline_session::StoreError;

use crate::OracleError;

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{participant} is not seated in session {session}")]
    NotParticipant {
        session: SessionId,
        participant: ParticipantId,
    },

    #[error("not your turn in session {0}")]
    WrongTurn(SessionId),

    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error("session {session} is {status}")]
    SessionNotActive {
        session: SessionId,
        status: SessionStatus,
    },

    #[error("illegal move: {0}")]
    IllegalMove(String),

    #[error("engine did not answer in time for session {0}")]
    OracleTimeout(SessionId),

    #[error("engine failed for session {session}: {source}")]
    Oracle {
        session: SessionId,
        source: OracleError,
    },

    #[error("draw offer limit reached ({count} offers)")]
    DrawOfferLimit { count: u32 },

    #[error("no resumable session for {0}")]
    ReconnectUnavailable(ParticipantId),

    #[error("{participant} is already in session {session}")]
    AlreadyInSession {
        participant: ParticipantId,
        session: SessionId,
    },

    /// Too many concurrent writers on one session; the request can be resent.
    #[error("session {0} is busy")]
    Contended(SessionId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GameError {
    /// The wire category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotParticipant { .. } => ErrorKind::NotParticipant,
            Self::WrongTurn(_) => ErrorKind::WrongTurn,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::SessionNotActive { .. } => ErrorKind::SessionNotActive,
            Self::IllegalMove(_) => ErrorKind::IllegalMove,
            Self::OracleTimeout(_) => ErrorKind::OracleTimeout,
            Self::Oracle { .. } => ErrorKind::OracleError,
            Self::DrawOfferLimit { .. } => ErrorKind::DrawOfferLimit,
            Self::ReconnectUnavailable(_) => ErrorKind::ReconnectUnavailable,
            Self::AlreadyInSession { .. } => ErrorKind::AlreadyInSession,
            Self::Contended(_) | Self::Store(_) => ErrorKind::Internal,
        }
    }

    /// The `error` frame sent back to the requester.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.kind(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_maps_each_category() {
        assert_eq!(GameError::WrongTurn(SessionId(1)).kind(), ErrorKind::WrongTurn);
        assert_eq!(
            GameError::DrawOfferLimit { count: 4 }.kind(),
            ErrorKind::DrawOfferLimit
        );
        assert_eq!(
            GameError::Store(StoreError::NotFound(SessionId(1))).kind(),
            ErrorKind::Internal
        );
        assert!(GameError::OracleTimeout(SessionId(1)).kind().is_retryable());
    }

    #[test]
    fn test_to_message_carries_display_text() {
        let msg = GameError::IllegalMove("e2e5".into()).to_message();
        assert_eq!(
            msg,
            ServerMessage::error(ErrorKind::IllegalMove, "illegal move: e2e5")
        );
    }
}
