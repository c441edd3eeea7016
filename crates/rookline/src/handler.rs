//! Per-connection handler: handshake, then request routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `hello` → check version, authenticate the token
//!   2. Send `welcome`, register the connection, resume any live session
//!   3. Loop: receive envelopes → dispatch to the game core
//!
//! Everything after the handshake reaches the client through one writer
//! task draining the connection's outbound channel, so `seq` is strictly
//! increasing no matter which task produced the message.

use std::sync::Arc;

use rookline_game::{GameCore, GameError, Outbound};
use rookline_protocol::{
    ClientMessage, Codec, Envelope, ErrorKind, MoveSpec, PROTOCOL_VERSION, ParticipantId,
    ServerMessage,
};
use rookline_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::{Authenticator, RooklineError};

/// Marks the participant's seat away when the handler exits, however it
/// exits. A connection that has since been superseded leaves the seat alone.
struct ConnectionGuard {
    core: GameCore,
    participant: ParticipantId,
    connection: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.core.disconnect(self.participant, self.connection);
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), RooklineError>
where
    A: Authenticator,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    // --- Step 1: Handshake ---
    let participant = perform_handshake(&conn, &state).await?;
    tracing::info!(%conn_id, %participant, "participant authenticated");

    // --- Step 2: Register and resume ---
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(write_loop(Arc::clone(&conn), Arc::clone(&state), rx));

    let _ = tx.send(ServerMessage::Welcome {
        participant_id: participant,
        server_time: state.core.now_ms(),
    });
    state.core.attach(participant, conn_id, tx.clone());
    let guard = ConnectionGuard {
        core: state.core.clone(),
        participant,
        connection: conn_id,
    };

    match state.core.resume(participant).await {
        Ok(Some(session)) => {
            tracing::info!(%participant, %session, "resumed session on connect");
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(%participant, error = %e, "resume on connect failed");
            let _ = tx.send(e.to_message());
        }
    }

    // --- Step 3: Request loop ---
    loop {
        let data = match tokio::time::timeout(state.config.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%participant, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%participant, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%participant, "connection idle, dropping");
                break;
            }
        };

        let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%participant, error = %e, "failed to decode envelope");
                let _ = tx.send(ServerMessage::error(
                    ErrorKind::Validation,
                    format!("malformed frame: {e}"),
                ));
                continue;
            }
        };

        let request = envelope.payload.kind();
        if let Err(e) = dispatch(&state.core, participant, conn_id, &tx, envelope.payload).await {
            tracing::debug!(%participant, request, error = %e, "request failed");
            let _ = tx.send(e.to_message());
        }
    }

    // Seat goes away before the socket closes.
    drop(guard);
    let _ = conn.close().await;
    Ok(())
}

/// Receives `hello`, validates it, and authenticates the token.
async fn perform_handshake<A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, C>,
) -> Result<ParticipantId, RooklineError>
where
    A: Authenticator,
    C: Codec,
{
    let data = match tokio::time::timeout(state.config.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(RooklineError::Handshake(
                "connection closed before hello".into(),
            ));
        }
        Ok(Err(e)) => return Err(RooklineError::Transport(e)),
        Err(_) => return Err(RooklineError::Handshake("hello timed out".into())),
    };

    let hello = state.codec.decode::<Envelope<ClientMessage>>(&data);
    let (version, token) = match hello {
        Ok(Envelope {
            payload: ClientMessage::Hello { version, token },
            ..
        }) => (version, token),
        _ => {
            reject(conn, state, ErrorKind::Validation, "expected hello").await?;
            return Err(RooklineError::Handshake("first frame must be hello".into()));
        }
    };

    if version != PROTOCOL_VERSION {
        let message = format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}");
        reject(conn, state, ErrorKind::Validation, &message).await?;
        return Err(RooklineError::Handshake(message));
    }

    let token = token.as_deref().unwrap_or("");
    match state.auth.authenticate(token).await {
        Ok(participant) if !participant.is_engine() => Ok(participant),
        Ok(_) => {
            reject(conn, state, ErrorKind::Unauthorized, "unauthorized").await?;
            Err(RooklineError::Auth(crate::AuthError::Reserved))
        }
        Err(e) => {
            reject(conn, state, ErrorKind::Unauthorized, "unauthorized").await?;
            Err(RooklineError::Auth(e))
        }
    }
}

/// Sends a single `error` frame on a connection that has no writer task yet.
async fn reject<A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, C>,
    kind: ErrorKind,
    message: &str,
) -> Result<(), RooklineError>
where
    A: Authenticator,
    C: Codec,
{
    let envelope = Envelope::new(0, state.core.now_ms(), ServerMessage::error(kind, message));
    let bytes = state.codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Drains the outbound channel into the socket, wrapping each message in
/// an envelope. Ends when every sender is gone or the socket breaks.
async fn write_loop<A, C>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<A, C>>,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
) where
    A: Authenticator,
    C: Codec,
{
    let mut seq: u64 = 0;
    while let Some(msg) = rx.recv().await {
        let envelope = Envelope::new(next_seq(&mut seq), state.core.now_ms(), msg);
        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(conn_id = %conn.id(), error = %e, "failed to encode frame");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed, stopping writer");
            break;
        }
    }
}

/// Routes one request to the game core.
async fn dispatch(
    core: &GameCore,
    participant: ParticipantId,
    connection: ConnectionId,
    tx: &Outbound,
    msg: ClientMessage,
) -> Result<(), GameError> {
    match msg {
        ClientMessage::Hello { .. } => Err(GameError::Validation("already greeted".into())),

        ClientMessage::Heartbeat { client_time } => {
            let _ = tx.send(ServerMessage::HeartbeatAck {
                client_time,
                server_time: core.now_ms(),
            });
            Ok(())
        }

        ClientMessage::Start { mode, params } => {
            core.start(participant, mode, params).await.map(|_| ())
        }

        ClientMessage::Move {
            session_id,
            from,
            to,
            promotion,
        } => {
            let mut mv = MoveSpec::new(from, to);
            if let Some(piece) = promotion {
                mv = mv.promoting(piece);
            }
            core.submit_move(participant, session_id, mv).await
        }

        ClientMessage::Reconnect { participant_id } => {
            if participant_id != participant {
                return Err(GameError::Validation(format!(
                    "connection is authenticated as {participant}"
                )));
            }
            core.reconnect(participant, connection, tx.clone())
                .await
                .map(|_| ())
        }

        ClientMessage::Resign { session_id } => core.resign(participant, session_id).await,
        ClientMessage::DrawOffer { session_id } => core.offer_draw(participant, session_id).await,
        ClientMessage::DrawAccept { session_id } => core.accept_draw(participant, session_id).await,
        ClientMessage::DrawReject { session_id } => core.reject_draw(participant, session_id).await,
        ClientMessage::ChatSend { session_id, text } => {
            core.chat(participant, session_id, &text).await
        }
        ClientMessage::RoomJoin { session_id } => core.join_room(participant, session_id).await,
        ClientMessage::RoomLeave { session_id } => core.leave_room(participant, session_id).await,
    }
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_seq_starts_at_zero_and_increments() {
        let mut seq = 0;
        assert_eq!(next_seq(&mut seq), 0);
        assert_eq!(next_seq(&mut seq), 1);
        assert_eq!(seq, 2);
    }
}
