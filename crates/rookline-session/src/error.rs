use rookline_protocol::{SessionId, SessionStatus};

/// Errors raised by the session model and the stores behind it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// A compare-and-swap lost against a concurrent writer.
    #[error("session {id} changed concurrently (expected revision {expected}, found {found})")]
    Conflict {
        id: SessionId,
        expected: u64,
        found: u64,
    },

    #[error("session cannot move from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    /// The durable store refused or failed a write.
    #[error("persistence failed for session {id}: {reason}")]
    Persistence { id: SessionId, reason: String },

    #[error("durable store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("durable record encoding: {0}")]
    Json(#[from] serde_json::Error),
}
