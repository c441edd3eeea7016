//! Tic-tac-toe on Rookline.
//!
//! `ROOKLINE_BIND` picks the listen address (default `0.0.0.0:8080`).
//! With `ROOKLINE_DATA` set, sessions are checkpointed as JSON files there
//! and survive a restart.

mod rules;

use std::sync::Arc;

use rookline::prelude::*;

use crate::rules::TicTacToe;

async fn build_core() -> Result<GameCore, RooklineError> {
    let builder = GameCore::builder(Arc::new(TicTacToe)).config(GameConfig {
        initial_clock: std::time::Duration::from_secs(120),
        ..GameConfig::default()
    });
    let builder = match std::env::var("ROOKLINE_DATA") {
        Ok(dir) => builder.durable(Arc::new(JsonFileDurableStore::open(dir).await?)),
        Err(_) => builder,
    };
    Ok(builder.build())
}

#[tokio::main]
async fn main() -> Result<(), RooklineError> {
    rookline::init_tracing();

    let bind = std::env::var("ROOKLINE_BIND").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let server = RooklineServerBuilder::new()
        .bind(&bind)
        .build(build_core().await?, DevAuthenticator)
        .await?;

    server.run().await
}
