//! `RooklineServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → game core. One task per
//! connection; all of them share a single [`GameCore`].

use std::sync::Arc;

use rookline_game::GameCore;
use rookline_protocol::{Codec, JsonCodec};
use rookline_transport::{Transport, TransportError, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{Authenticator, RooklineError, ServerConfig};

/// Shared state handed to every connection task.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) core: GameCore,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Rookline server.
///
/// # Example
///
/// ```rust,ignore
/// let server = RooklineServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(core, DevAuthenticator)
///     .await?;
/// server.run().await
/// ```
pub struct RooklineServerBuilder {
    config: ServerConfig,
}

impl RooklineServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Replaces the whole server configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener and restores sessions left in the durable store
    /// by a previous run.
    ///
    /// Uses `JsonCodec` over `WebSocketTransport`.
    ///
    /// # Errors
    /// [`RooklineError::Transport`] if the address cannot be bound,
    /// [`RooklineError::Store`] if the durable store cannot be read.
    pub async fn build<A: Authenticator>(
        self,
        core: GameCore,
        auth: A,
    ) -> Result<RooklineServer<A, JsonCodec>, RooklineError> {
        let transport =
            WebSocketTransport::bind_with(&self.config.bind, self.config.handshake_timeout).await?;

        let recovered = core.recover().await?;
        if recovered > 0 {
            tracing::info!(recovered, "restored live sessions from durable store");
        }

        let state = Arc::new(ServerState {
            core,
            auth,
            codec: JsonCodec,
            config: self.config,
        });

        Ok(RooklineServer { transport, state })
    }
}

impl Default for RooklineServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Rookline server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RooklineServer<A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
}

impl<A, C> RooklineServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    pub fn builder() -> RooklineServerBuilder {
        RooklineServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    ///
    /// # Errors
    /// [`RooklineError::Transport`] if the listener has no local address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, RooklineError> {
        Ok(self.transport.local_addr()?)
    }

    /// The game core every connection talks to.
    pub fn core(&self) -> &GameCore {
        &self.state.core
    }

    /// Runs the accept loop until the listener stops.
    ///
    /// Each accepted connection gets its own task running the handshake
    /// and the request loop.
    pub async fn run(mut self) -> Result<(), RooklineError> {
        tracing::info!(bind = %self.state.config.bind, "rookline server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(TransportError::ConnectionClosed(reason)) => {
                    tracing::error!(%reason, "listener stopped");
                    self.state.core.shutdown();
                    return Err(TransportError::ConnectionClosed(reason).into());
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
