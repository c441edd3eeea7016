//! Shared fixtures: a scripted rules engine, scripted oracles and a
//! harness wiring them into a `GameCore` on a manual clock.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use rookline_game::{
    AppliedMove, ClockConfig, GameConfig, GameCore, GameCoreBuilder, MoveOracle, MoveOutcome,
    OracleError, RulesEngine, StartOutcome, Terminal,
};
use rookline_protocol::{
    Color, GameMode, MoveSpec, ParticipantId, ServerMessage, SessionId, StartParams,
};
use rookline_session::{ManualTimeSource, MemoryDurableStore, StoreConfig};
use rookline_transport::ConnectionId;
use tokio::sync::mpsc;

pub const T0: u64 = 1_700_000_000_000;

pub fn pid(id: u64) -> ParticipantId {
    ParticipantId(id)
}

pub fn mv(uci: &str) -> MoveSpec {
    MoveSpec::new(&uci[..2], &uci[2..4])
}

// =========================================================================
// Scripted rules
// =========================================================================

/// Positions look like `"w|e2e4,e7e5"`: side to move, then every move so
/// far. Any move is legal except one whose source and target coincide.
/// Checks, captures and game ends are keyed by the last move played.
#[derive(Default)]
pub struct ScriptedRules {
    terminals: HashMap<String, Vec<Terminal>>,
    checks: HashSet<String>,
    captures: HashMap<String, String>,
}

impl ScriptedRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminal_after(mut self, uci: &str, conditions: Vec<Terminal>) -> Self {
        self.terminals.insert(uci.to_string(), conditions);
        self
    }

    pub fn check_after(mut self, uci: &str) -> Self {
        self.checks.insert(uci.to_string());
        self
    }

    pub fn capture_on(mut self, uci: &str, piece: &str) -> Self {
        self.captures.insert(uci.to_string(), piece.to_string());
        self
    }

    fn last_move(position: &str) -> Option<&str> {
        position.split('|').nth(1)?.split(',').next_back().filter(|m| !m.is_empty())
    }
}

impl RulesEngine for ScriptedRules {
    fn initial_position(&self, _mode: GameMode) -> String {
        "w|".into()
    }

    fn apply(&self, position: &str, mv: &MoveSpec) -> MoveOutcome {
        if mv.from == mv.to {
            return MoveOutcome::Rejected("piece must move".into());
        }
        let (side, history) = position.split_once('|').unwrap_or(("w", ""));
        let next_side = if side == "w" { "b" } else { "w" };
        let uci = mv.to_string();
        let history = if history.is_empty() {
            uci.clone()
        } else {
            format!("{history},{uci}")
        };
        MoveOutcome::Accepted(AppliedMove {
            position: format!("{next_side}|{history}"),
            captured: self.captures.get(&uci).cloned(),
            is_check: self.checks.contains(&uci),
        })
    }

    fn turn_to_move(&self, position: &str) -> Color {
        if position.starts_with('b') {
            Color::Black
        } else {
            Color::White
        }
    }

    fn classify_terminal(&self, position: &str) -> Vec<Terminal> {
        Self::last_move(position)
            .and_then(|m| self.terminals.get(m))
            .cloned()
            .unwrap_or_default()
    }

    fn legal_moves(&self, _position: &str) -> Vec<MoveSpec> {
        vec![mv("a2a3"), mv("h7h6")]
    }
}

// =========================================================================
// Scripted oracles
// =========================================================================

/// Answers with queued moves, then with `NoMove`.
#[derive(Default)]
pub struct ScriptedOracle {
    moves: Mutex<VecDeque<MoveSpec>>,
    pub calls: Mutex<Vec<(String, u8)>>,
}

impl ScriptedOracle {
    pub fn with_moves(moves: &[&str]) -> Self {
        Self {
            moves: Mutex::new(moves.iter().map(|m| mv(m)).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl MoveOracle for ScriptedOracle {
    fn request_move(
        &self,
        position: String,
        difficulty: u8,
    ) -> BoxFuture<'static, Result<MoveSpec, OracleError>> {
        self.calls.lock().unwrap().push((position, difficulty));
        let next = self.moves.lock().unwrap().pop_front();
        Box::pin(async move { next.ok_or(OracleError::NoMove) })
    }
}

/// Never answers within any sane timeout.
pub struct SlowOracle;

impl MoveOracle for SlowOracle {
    fn request_move(
        &self,
        _position: String,
        _difficulty: u8,
    ) -> BoxFuture<'static, Result<MoveSpec, OracleError>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(mv("a7a6"))
        })
    }
}

// =========================================================================
// Harness
// =========================================================================

pub struct Harness {
    pub core: GameCore,
    pub clock: Arc<ManualTimeSource>,
    pub durable: Arc<MemoryDurableStore>,
}

pub fn store_config() -> StoreConfig {
    StoreConfig {
        checkpoint_every: 2,
        ..StoreConfig::default()
    }
}

pub fn game_config() -> GameConfig {
    GameConfig {
        initial_clock: Duration::from_secs(60),
        ..GameConfig::default()
    }
}

/// A core on a manual clock at `T0`, with `customize` applied last.
pub fn harness_with(
    rules: ScriptedRules,
    customize: impl FnOnce(GameCoreBuilder) -> GameCoreBuilder,
) -> Harness {
    let clock = Arc::new(ManualTimeSource::new(T0));
    let durable = Arc::new(MemoryDurableStore::new());
    let builder = GameCore::builder(Arc::new(rules))
        .time_source(clock.clone())
        .durable(durable.clone())
        .config(game_config())
        .store_config(store_config())
        // Tests drive sweeps with `tick_once`; the background task stays quiet.
        .clock_config(ClockConfig {
            tick: Duration::from_secs(3_600),
        });
    Harness {
        core: customize(builder).build(),
        clock,
        durable,
    }
}

pub fn harness() -> Harness {
    harness_with(ScriptedRules::new(), |b| b)
}

/// Registers a connection for `participant` (connection id = participant id).
pub fn connect(
    core: &GameCore,
    participant: ParticipantId,
) -> mpsc::UnboundedReceiver<ServerMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    core.attach(participant, ConnectionId::new(participant.0), tx);
    rx
}

/// Everything currently buffered.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

/// Pairs `white` and `black` through the queue.
pub async fn start_pvp(core: &GameCore, white: ParticipantId, black: ParticipantId) -> SessionId {
    let first = core
        .start(white, GameMode::PlayerVsPlayer, StartParams::default())
        .await
        .unwrap();
    assert_eq!(first, StartOutcome::Queued);
    match core
        .start(black, GameMode::PlayerVsPlayer, StartParams::default())
        .await
        .unwrap()
    {
        StartOutcome::Started(id) => id,
        StartOutcome::Queued => panic!("expected a match"),
    }
}

/// Lets spawned tasks (engine requests) run to completion.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub fn over_of(msgs: &[ServerMessage]) -> Vec<&ServerMessage> {
    msgs.iter()
        .filter(|m| matches!(m, ServerMessage::Over { .. }))
        .collect()
}
