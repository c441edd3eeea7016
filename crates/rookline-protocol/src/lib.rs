//! Wire protocol for Rookline.
//!
//! - **Types** ([`ParticipantId`], [`Color`], [`Clocks`], [`GameResult`], ...)
//!   shared by the session model and the message catalogue.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`], [`Envelope`]):
//!   the frames clients and the server exchange.
//! - **Codec** ([`Codec`], [`JsonCodec`]): frames to bytes and back.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Game core (sessions)
//! ```

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{ClientMessage, Envelope, ErrorKind, ServerMessage, SessionSnapshot};
pub use types::{
    Clocks, Color, EndReason, GameMode, GameResult, MoveRecord, MoveSpec,
    ParticipantId, SessionId, SessionStatus, StartParams,
};

/// Protocol version a client must announce in `hello`.
pub const PROTOCOL_VERSION: u32 = 1;
