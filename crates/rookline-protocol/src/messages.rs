//! The message catalogue: what clients send, what the server answers.
//!
//! Both directions use internally tagged JSON with dotted type names:
//!
//! ```text
//! { "type": "session.move", "sessionId": 7, "from": "e2", "to": "e4" }
//! ```
//!
//! Every frame is wrapped in an [`Envelope`] before it hits the codec.

use serde::{Deserialize, Serialize};

use crate::types::{
    Clocks, Color, EndReason, GameMode, GameResult, MoveRecord, MoveSpec,
    ParticipantId, SessionId, SessionStatus, StartParams,
};

// ---------------------------------------------------------------------------
// Error kinds
// ---------------------------------------------------------------------------

/// Category of a rejected request, as reported in `error{kind, message}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or out-of-range request.
    Validation,
    /// The sender holds no seat in the addressed session.
    NotParticipant,
    WrongTurn,
    /// Session or room does not exist (or is no longer live).
    NotFound,
    SessionNotActive,
    IllegalMove,
    OracleTimeout,
    OracleError,
    DrawOfferLimit,
    /// No resumable session for the reconnecting participant.
    ReconnectUnavailable,
    AlreadyInSession,
    Unauthorized,
    Internal,
}

impl ErrorKind {
    /// Retryable errors leave the session untouched; the client may
    /// resubmit the same request later.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::OracleTimeout | Self::OracleError)
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Everything a client can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// First frame on a connection. Anything else before it is refused.
    #[serde(rename = "hello")]
    Hello {
        version: u32,
        #[serde(default)]
        token: Option<String>,
    },

    #[serde(rename = "heartbeat")]
    Heartbeat { client_time: u64 },

    #[serde(rename = "session.start")]
    Start {
        mode: GameMode,
        #[serde(default)]
        params: StartParams,
    },

    #[serde(rename = "session.move")]
    Move {
        session_id: SessionId,
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        promotion: Option<char>,
    },

    /// Explicit resume request. The server also attempts this on its own
    /// right after `hello`.
    #[serde(rename = "session.reconnect")]
    Reconnect { participant_id: ParticipantId },

    #[serde(rename = "session.resign")]
    Resign { session_id: SessionId },

    #[serde(rename = "draw.offer")]
    DrawOffer { session_id: SessionId },

    #[serde(rename = "draw.accept")]
    DrawAccept { session_id: SessionId },

    #[serde(rename = "draw.reject")]
    DrawReject { session_id: SessionId },

    #[serde(rename = "chat.send")]
    ChatSend { session_id: SessionId, text: String },

    #[serde(rename = "room.join")]
    RoomJoin { session_id: SessionId },

    #[serde(rename = "room.leave")]
    RoomLeave { session_id: SessionId },
}

impl ClientMessage {
    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Start { .. } => "session.start",
            Self::Move { .. } => "session.move",
            Self::Reconnect { .. } => "session.reconnect",
            Self::Resign { .. } => "session.resign",
            Self::DrawOffer { .. } => "draw.offer",
            Self::DrawAccept { .. } => "draw.accept",
            Self::DrawReject { .. } => "draw.reject",
            Self::ChatSend { .. } => "chat.send",
            Self::RoomJoin { .. } => "room.join",
            Self::RoomLeave { .. } => "room.leave",
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Full state of a session as seen by one seat.
///
/// Contains nothing time-of-send dependent, so two snapshots of an
/// unchanged session are identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub mode: GameMode,
    pub status: SessionStatus,
    pub position: String,
    pub turn: Color,
    pub clocks: Clocks,
    pub move_log: Vec<MoveRecord>,
    pub captured_pieces: Vec<String>,
    pub your_color: Color,
    /// `None` while a room is still waiting for its second seat.
    pub opponent: Option<ParticipantId>,
    pub result: Option<GameResult>,
    /// Empty unless it is the recipient's turn.
    pub legal_moves: Vec<MoveSpec>,
}

/// Everything the server can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    #[serde(rename = "welcome")]
    Welcome {
        participant_id: ParticipantId,
        server_time: u64,
    },

    #[serde(rename = "heartbeat.ack")]
    HeartbeatAck { client_time: u64, server_time: u64 },

    #[serde(rename = "session.snapshot")]
    Snapshot(SessionSnapshot),

    /// Sent to the mover once their move is applied.
    #[serde(rename = "move.ack")]
    MoveAck {
        session_id: SessionId,
        #[serde(rename = "move")]
        mv: MoveSpec,
        position: String,
        clocks: Clocks,
        /// The mover's own legal moves, only if it is their turn again.
        legal_moves: Vec<MoveSpec>,
    },

    /// Sent to the opponent of the mover.
    #[serde(rename = "move.broadcast")]
    MoveBroadcast {
        session_id: SessionId,
        #[serde(rename = "move")]
        mv: MoveSpec,
        color: Color,
        position: String,
        clocks: Clocks,
        captured: Option<String>,
        legal_moves: Vec<MoveSpec>,
    },

    /// `color` is in check. Sent to both seats.
    #[serde(rename = "session.check")]
    Check { session_id: SessionId, color: Color },

    #[serde(rename = "session.over")]
    Over {
        session_id: SessionId,
        winner: Option<Color>,
        reason: EndReason,
    },

    #[serde(rename = "timer.update")]
    TimerUpdate {
        session_id: SessionId,
        clocks: Clocks,
    },

    #[serde(rename = "opponent.reconnected")]
    OpponentReconnected {
        session_id: SessionId,
        participant_id: ParticipantId,
    },

    #[serde(rename = "opponent.disconnected")]
    OpponentDisconnected {
        session_id: SessionId,
        participant_id: ParticipantId,
    },

    #[serde(rename = "draw.offered")]
    DrawOffered {
        session_id: SessionId,
        by: Color,
        count: u32,
    },

    #[serde(rename = "draw.rejected")]
    DrawRejected { session_id: SessionId, by: Color },

    /// No partner yet; the sender stays queued.
    #[serde(rename = "queue.waiting")]
    QueueWaiting,

    #[serde(rename = "chat.message")]
    ChatMessage {
        session_id: SessionId,
        from: ParticipantId,
        text: String,
    },

    #[serde(rename = "error")]
    Error { kind: ErrorKind, message: String },
}

impl ServerMessage {
    /// Builds `session.over` from a final result.
    pub fn over(session_id: SessionId, result: GameResult) -> Self {
        Self::Over {
            session_id,
            winner: result.winner,
            reason: result.reason,
        }
    }

    /// Builds an `error` frame.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level wire wrapper around every frame.
///
/// `seq` increases per direction per connection; `timestamp` is unix
/// milliseconds at the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<P> {
    pub seq: u64,
    pub timestamp: u64,
    pub payload: P,
}

impl<P> Envelope<P> {
    pub fn new(seq: u64, timestamp: u64, payload: P) -> Self {
        Self {
            seq,
            timestamp,
            payload,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
