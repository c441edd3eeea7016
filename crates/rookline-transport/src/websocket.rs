//! WebSocket transport over `tokio-tungstenite`.
//!
//! TCP accepts and WebSocket upgrades run on a background task; each
//! upgrade gets its own task and deadline, so one stalled client never
//! holds up the next player's connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Upgraded connections waiting for `accept`.
const BACKLOG: usize = 64;

/// Default deadline for the HTTP upgrade after the TCP accept.
pub const DEFAULT_UPGRADE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<TcpStream>;
type Incoming = Result<WebSocketConnection, TransportError>;

/// Listens for WebSocket clients.
///
/// Dropping the transport stops the listener.
pub struct WebSocketTransport {
    local_addr: SocketAddr,
    incoming: mpsc::Receiver<Incoming>,
    acceptor: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Binds to `addr` with the default upgrade timeout.
    ///
    /// Bind to port 0 to let the OS pick a free port, then read it back
    /// with [`Transport::local_addr`].
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with(addr, DEFAULT_UPGRADE_TIMEOUT).await
    }

    /// Binds to `addr`; clients that don't finish the upgrade within
    /// `upgrade_timeout` are dropped.
    pub async fn bind_with(addr: &str, upgrade_timeout: Duration) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let local_addr = listener.local_addr().map_err(TransportError::AcceptFailed)?;
        tracing::info!(%local_addr, "websocket transport listening");

        let (tx, incoming) = mpsc::channel(BACKLOG);
        let acceptor = tokio::spawn(accept_loop(listener, tx, upgrade_timeout));
        Ok(Self {
            local_addr,
            incoming,
            acceptor,
        })
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        match self.incoming.recv().await {
            Some(result) => result,
            None => Err(TransportError::ConnectionClosed("listener stopped".into())),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        Ok(self.local_addr)
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<Incoming>, upgrade_timeout: Duration) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                if tx.send(Err(TransportError::AcceptFailed(e))).await.is_err() {
                    return;
                }
                continue;
            }
        };
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(conn) = upgrade(stream, peer, upgrade_timeout).await {
                let _ = tx.send(Ok(conn)).await;
            }
        });
    }
}

/// Runs the HTTP upgrade. Failed and late upgrades are logged and dropped.
async fn upgrade(stream: TcpStream, peer: SocketAddr, deadline: Duration) -> Option<WebSocketConnection> {
    let ws = match tokio::time::timeout(deadline, tokio_tungstenite::accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            tracing::debug!(%peer, error = %e, "websocket upgrade failed");
            return None;
        }
        Err(_) => {
            tracing::debug!(%peer, "websocket upgrade timed out");
            return None;
        }
    };

    let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
    tracing::debug!(%id, %peer, "accepted websocket connection");

    // Split so a reader parked in `recv` never blocks writers.
    let (sink, stream) = ws.split();
    Some(WebSocketConnection {
        id,
        peer,
        sink: Mutex::new(sink),
        stream: Mutex::new(stream),
    })
}

/// One upgraded client.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer: SocketAddr,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

fn broken(kind: std::io::ErrorKind, e: tokio_tungstenite::tungstenite::Error) -> std::io::Error {
    std::io::Error::new(kind, e)
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // Envelopes are JSON, so text frames; anything else goes binary.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| TransportError::SendFailed(broken(std::io::ErrorKind::BrokenPipe, e)))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => return Ok(Some(text.as_bytes().to_vec())),
                Ok(Message::Binary(data)) => return Ok(Some(data.into())),
                Ok(Message::Close(_)) => return Ok(None),
                // Pings are answered by tungstenite on the next write.
                Ok(_) => {}
                Err(e) => {
                    return Err(TransportError::ReceiveFailed(broken(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
        Ok(None)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::ConnectionClosed(e.to_string()))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
