//! End-to-end tests: real WebSocket clients against a running server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rookline::prelude::*;
use rookline_protocol::{SessionSnapshot, SessionStatus};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Rules for the wire tests
// =========================================================================

/// Positions are the comma-joined move list. Any move is legal unless
/// source and target coincide; games only end by resignation or draw.
struct AnyMoveRules;

impl AnyMoveRules {
    fn count(position: &str) -> usize {
        position.split(',').filter(|m| !m.is_empty()).count()
    }
}

impl RulesEngine for AnyMoveRules {
    fn initial_position(&self, _mode: GameMode) -> String {
        String::new()
    }

    fn apply(&self, position: &str, mv: &MoveSpec) -> MoveOutcome {
        if mv.from == mv.to {
            return MoveOutcome::Rejected("piece must move".into());
        }
        let position = if position.is_empty() {
            mv.to_string()
        } else {
            format!("{position},{mv}")
        };
        MoveOutcome::Accepted(AppliedMove {
            position,
            captured: None,
            is_check: false,
        })
    }

    fn turn_to_move(&self, position: &str) -> Color {
        if Self::count(position) % 2 == 0 {
            Color::White
        } else {
            Color::Black
        }
    }

    fn classify_terminal(&self, _position: &str) -> Vec<Terminal> {
        Vec::new()
    }

    fn legal_moves(&self, _position: &str) -> Vec<MoveSpec> {
        vec![MoveSpec::new("a2", "a3")]
    }
}

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port and returns its address.
async fn start_server() -> String {
    let core = GameCore::builder(Arc::new(AnyMoveRules))
        .clock_config(ClockConfig {
            tick: Duration::from_secs(3_600),
        })
        .build();
    let server = RooklineServerBuilder::new()
        .bind("127.0.0.1:0")
        .build(core, DevAuthenticator)
        .await
        .expect("server should build");

    let addr = server.local_addr().expect("should have local addr").to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, payload: ClientMessage) {
    let env = Envelope::new(0, 0, payload);
    let text = serde_json::to_string(&env).expect("encode");
    ws.send(Message::Text(text.into())).await.expect("send");
}

/// Next server frame, failing the test after two seconds of silence.
async fn recv(ws: &mut ClientWs) -> Envelope<ServerMessage> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(_) | Message::Binary(_) => {
                return serde_json::from_slice(&msg.into_data()).expect("decode");
            }
            _ => continue,
        }
    }
}

/// Skips frames until one matches.
async fn recv_until(
    ws: &mut ClientWs,
    pred: impl Fn(&ServerMessage) -> bool,
) -> ServerMessage {
    loop {
        let env = recv(ws).await;
        if pred(&env.payload) {
            return env.payload;
        }
    }
}

async fn hello(ws: &mut ClientWs, id: u64) -> Envelope<ServerMessage> {
    send(
        ws,
        ClientMessage::Hello {
            version: PROTOCOL_VERSION,
            token: Some(id.to_string()),
        },
    )
    .await;
    recv(ws).await
}

async fn snapshot(ws: &mut ClientWs) -> SessionSnapshot {
    match recv_until(ws, |m| matches!(m, ServerMessage::Snapshot(_))).await {
        ServerMessage::Snapshot(s) => s,
        _ => unreachable!(),
    }
}

fn start_pvp() -> ClientMessage {
    ClientMessage::Start {
        mode: GameMode::PlayerVsPlayer,
        params: StartParams::default(),
    }
}

/// Two greeted clients already paired; participant 1 plays white.
async fn paired(addr: &str) -> (ClientWs, ClientWs, SessionId) {
    let mut ws1 = connect(addr).await;
    let mut ws2 = connect(addr).await;
    hello(&mut ws1, 1).await;
    hello(&mut ws2, 2).await;

    send(&mut ws1, start_pvp()).await;
    assert_eq!(recv(&mut ws1).await.payload, ServerMessage::QueueWaiting);
    send(&mut ws2, start_pvp()).await;

    let white = snapshot(&mut ws1).await;
    let black = snapshot(&mut ws2).await;
    assert_eq!(white.session_id, black.session_id);
    assert_eq!(white.your_color, Color::White);
    assert_eq!(black.your_color, Color::Black);
    (ws1, ws2, white.session_id)
}

fn error_kind(msg: &ServerMessage) -> Option<ErrorKind> {
    match msg {
        ServerMessage::Error { kind, .. } => Some(*kind),
        _ => None,
    }
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_hello_returns_welcome() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let env = hello(&mut ws, 42).await;

    assert_eq!(env.seq, 0);
    match env.payload {
        ServerMessage::Welcome { participant_id, .. } => {
            assert_eq!(participant_id, ParticipantId(42));
        }
        other => panic!("expected welcome, got {other:?}"),
    }
}

#[tokio::test]
async fn test_hello_version_mismatch_is_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        ClientMessage::Hello {
            version: 999,
            token: Some("1".into()),
        },
    )
    .await;

    let env = recv(&mut ws).await;
    assert_eq!(error_kind(&env.payload), Some(ErrorKind::Validation));
}

#[tokio::test]
async fn test_hello_bad_token_is_unauthorized() {
    let addr = start_server().await;

    for token in ["not-a-number", "0"] {
        let mut ws = connect(&addr).await;
        send(
            &mut ws,
            ClientMessage::Hello {
                version: PROTOCOL_VERSION,
                token: Some(token.into()),
            },
        )
        .await;

        let env = recv(&mut ws).await;
        assert_eq!(error_kind(&env.payload), Some(ErrorKind::Unauthorized));
    }
}

#[tokio::test]
async fn test_first_frame_must_be_hello() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, ClientMessage::Heartbeat { client_time: 0 }).await;

    let env = recv(&mut ws).await;
    assert_eq!(error_kind(&env.payload), Some(ErrorKind::Validation));
}

// =========================================================================
// Connection plumbing
// =========================================================================

#[tokio::test]
async fn test_heartbeat_is_acknowledged_with_increasing_seq() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    hello(&mut ws, 1).await;

    send(&mut ws, ClientMessage::Heartbeat { client_time: 12_345 }).await;
    let first = recv(&mut ws).await;
    send(&mut ws, ClientMessage::Heartbeat { client_time: 12_346 }).await;
    let second = recv(&mut ws).await;

    assert!(matches!(
        first.payload,
        ServerMessage::HeartbeatAck {
            client_time: 12_345,
            ..
        }
    ));
    assert_eq!(first.seq, 1);
    assert_eq!(second.seq, 2);
}

#[tokio::test]
async fn test_malformed_frame_reports_validation_and_keeps_connection() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    hello(&mut ws, 1).await;

    ws.send(Message::Text("not json".into())).await.expect("send");
    let env = recv(&mut ws).await;
    assert_eq!(error_kind(&env.payload), Some(ErrorKind::Validation));

    send(&mut ws, ClientMessage::Heartbeat { client_time: 9 }).await;
    let env = recv(&mut ws).await;
    assert!(matches!(env.payload, ServerMessage::HeartbeatAck { .. }));
}

#[tokio::test]
async fn test_game_errors_come_back_as_error_frames() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    hello(&mut ws, 1).await;

    send(
        &mut ws,
        ClientMessage::Move {
            session_id: SessionId(999),
            from: "e2".into(),
            to: "e4".into(),
            promotion: None,
        },
    )
    .await;

    let env = recv(&mut ws).await;
    assert_eq!(error_kind(&env.payload), Some(ErrorKind::NotFound));
}

// =========================================================================
// Playing
// =========================================================================

#[tokio::test]
async fn test_pvp_game_over_the_wire() {
    let addr = start_server().await;
    let (mut ws1, mut ws2, id) = paired(&addr).await;

    send(
        &mut ws1,
        ClientMessage::Move {
            session_id: id,
            from: "e2".into(),
            to: "e4".into(),
            promotion: None,
        },
    )
    .await;

    let ack = recv_until(&mut ws1, |m| matches!(m, ServerMessage::MoveAck { .. })).await;
    assert!(matches!(ack, ServerMessage::MoveAck { ref position, .. } if position == "e2e4"));
    let broadcast =
        recv_until(&mut ws2, |m| matches!(m, ServerMessage::MoveBroadcast { .. })).await;
    assert!(matches!(
        broadcast,
        ServerMessage::MoveBroadcast {
            color: Color::White,
            ref legal_moves,
            ..
        } if !legal_moves.is_empty()
    ));

    // White again, out of turn.
    send(
        &mut ws1,
        ClientMessage::Move {
            session_id: id,
            from: "d2".into(),
            to: "d4".into(),
            promotion: None,
        },
    )
    .await;
    let err = recv_until(&mut ws1, |m| error_kind(m).is_some()).await;
    assert_eq!(error_kind(&err), Some(ErrorKind::WrongTurn));

    send(&mut ws2, ClientMessage::Resign { session_id: id }).await;
    let expected = ServerMessage::Over {
        session_id: id,
        winner: Some(Color::White),
        reason: EndReason::Resignation,
    };
    assert_eq!(
        recv_until(&mut ws1, |m| matches!(m, ServerMessage::Over { .. })).await,
        expected
    );
    assert_eq!(
        recv_until(&mut ws2, |m| matches!(m, ServerMessage::Over { .. })).await,
        expected
    );
}

#[tokio::test]
async fn test_chat_is_relayed_to_opponent() {
    let addr = start_server().await;
    let (mut ws1, mut ws2, id) = paired(&addr).await;

    send(
        &mut ws1,
        ClientMessage::ChatSend {
            session_id: id,
            text: "  good luck  ".into(),
        },
    )
    .await;

    let msg = recv_until(&mut ws2, |m| matches!(m, ServerMessage::ChatMessage { .. })).await;
    assert_eq!(
        msg,
        ServerMessage::ChatMessage {
            session_id: id,
            from: ParticipantId(1),
            text: "good luck".into(),
        }
    );
}

// =========================================================================
// Reconnection
// =========================================================================

#[tokio::test]
async fn test_dropped_client_resumes_on_hello() {
    let addr = start_server().await;
    let (mut ws1, mut ws2, id) = paired(&addr).await;

    ws2.close(None).await.expect("close");
    drop(ws2);
    let gone = recv_until(&mut ws1, |m| {
        matches!(m, ServerMessage::OpponentDisconnected { .. })
    })
    .await;
    assert_eq!(
        gone,
        ServerMessage::OpponentDisconnected {
            session_id: id,
            participant_id: ParticipantId(2),
        }
    );

    let mut ws2 = connect(&addr).await;
    let welcome = hello(&mut ws2, 2).await;
    assert!(matches!(welcome.payload, ServerMessage::Welcome { .. }));
    let resumed = snapshot(&mut ws2).await;
    assert_eq!(resumed.session_id, id);
    assert_eq!(resumed.your_color, Color::Black);
    assert_eq!(resumed.status, SessionStatus::Active);

    let back = recv_until(&mut ws1, |m| {
        matches!(m, ServerMessage::OpponentReconnected { .. })
    })
    .await;
    assert_eq!(
        back,
        ServerMessage::OpponentReconnected {
            session_id: id,
            participant_id: ParticipantId(2),
        }
    );
}

#[tokio::test]
async fn test_explicit_reconnect_as_someone_else_is_refused() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    hello(&mut ws, 1).await;

    send(
        &mut ws,
        ClientMessage::Reconnect {
            participant_id: ParticipantId(2),
        },
    )
    .await;

    let env = recv(&mut ws).await;
    assert_eq!(error_kind(&env.payload), Some(ErrorKind::Validation));
}
