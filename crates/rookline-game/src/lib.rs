//! Gameplay for Rookline: sessions from start to finish.
//!
//! Everything hangs off one [`GameCore`] handle, built once with its
//! collaborators and shared by every connection.
//!
//! # Key types
//!
//! - [`GameCore`]: start, move, resign, draw, chat, reconnect, disconnect
//! - [`RulesEngine`]: judges moves; positions are opaque to the server
//! - [`MoveOracle`]: plays the engine seat
//! - [`MatchmakingQueue`]: pairs player-vs-player participants
//! - [`ConnectionRegistry`]: participant id → live connection
//! - [`GameError`]: every failure, mapped onto a wire error kind
//!
//! # Clocks
//!
//! A single scheduler task charges every running clock once per tick and
//! ends flagged or abandoned games. It starts with the first running
//! session and stops when none are left.

mod config;
mod draw;
mod engine;
mod error;
mod lifecycle;
mod moves;
mod oracle;
mod queue;
mod reconnect;
mod registry;
mod rules;
mod scheduler;
mod service;

pub use config::{ClockConfig, GameConfig};
pub use error::GameError;
pub use lifecycle::StartOutcome;
pub use oracle::{MoveOracle, OracleError, RandomMoveOracle};
pub use queue::{MatchmakingQueue, MemoryQueue};
pub use registry::{ConnectionRegistry, Outbound};
pub use rules::{AppliedMove, MoveOutcome, RulesEngine, Terminal};
pub use service::{GameCore, GameCoreBuilder};
