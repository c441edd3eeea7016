//! # Rookline
//!
//! An authoritative server for live two-seat board game sessions.
//!
//! Clients connect over WebSocket, greet with `hello`, and from then on
//! every request is routed to a shared [`GameCore`]. The server owns the
//! clocks, the move log, and the outcome; clients only ever see what the
//! core tells them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rookline::prelude::*;
//!
//! # async fn run(rules: Arc<dyn RulesEngine>) -> Result<(), RooklineError> {
//! rookline::init_tracing();
//!
//! let core = GameCore::builder(rules).build();
//! let server = RooklineServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(core, DevAuthenticator)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod auth;
mod config;
mod error;
mod handler;
mod server;

pub use auth::{AuthError, Authenticator, DevAuthenticator};
pub use config::ServerConfig;
pub use error::RooklineError;
pub use server::{RooklineServer, RooklineServerBuilder};

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Everything needed to stand up a server with a custom rules engine.
pub mod prelude {
    pub use crate::{
        AuthError, Authenticator, DevAuthenticator, RooklineError, RooklineServer,
        RooklineServerBuilder, ServerConfig,
    };
    pub use rookline_game::{
        AppliedMove, ClockConfig, GameConfig, GameCore, GameCoreBuilder, GameError, MoveOracle,
        MoveOutcome, RandomMoveOracle, RulesEngine, Terminal,
    };
    pub use rookline_protocol::{
        ClientMessage, Color, EndReason, Envelope, ErrorKind, GameMode, GameResult, MoveSpec,
        PROTOCOL_VERSION, ParticipantId, ServerMessage, SessionId, StartParams,
    };
    pub use rookline_session::{JsonFileDurableStore, MemoryDurableStore, StoreConfig};
}
