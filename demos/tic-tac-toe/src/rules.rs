//! Tic-tac-toe as a Rookline rules engine.
//!
//! A position is nine cells, row-major from `a1` to `c3`, each `X`, `O`
//! or `.`. X is white and always starts. A move drops a mark: `from` is
//! `@`, `to` is the target cell.

use rookline::prelude::*;

const EMPTY: &str = ".........";

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

pub struct TicTacToe;

/// `"b2"` → 4.
fn cell_index(cell: &str) -> Option<usize> {
    let bytes = cell.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let col = bytes[0].checked_sub(b'a').filter(|c| *c < 3)?;
    let row = bytes[1].checked_sub(b'1').filter(|r| *r < 3)?;
    Some(usize::from(row) * 3 + usize::from(col))
}

fn cell_name(index: usize) -> String {
    let col = char::from(b'a' + (index % 3) as u8);
    let row = char::from(b'1' + (index / 3) as u8);
    format!("{col}{row}")
}

fn board(position: &str) -> [u8; 9] {
    let mut cells = [b'.'; 9];
    for (cell, b) in cells.iter_mut().zip(position.bytes()) {
        *cell = b;
    }
    cells
}

fn has_line(cells: &[u8; 9]) -> bool {
    LINES
        .iter()
        .any(|[a, b, c]| cells[*a] != b'.' && cells[*a] == cells[*b] && cells[*b] == cells[*c])
}

impl RulesEngine for TicTacToe {
    fn initial_position(&self, _mode: GameMode) -> String {
        EMPTY.to_string()
    }

    fn apply(&self, position: &str, mv: &MoveSpec) -> MoveOutcome {
        let mut cells = board(position);
        if has_line(&cells) {
            return MoveOutcome::Rejected("game is over".into());
        }
        if mv.from != "@" {
            return MoveOutcome::Rejected("marks are dropped with from = \"@\"".into());
        }
        let Some(index) = cell_index(&mv.to) else {
            return MoveOutcome::Rejected(format!("{} is not a cell", mv.to));
        };
        if cells[index] != b'.' {
            return MoveOutcome::Rejected(format!("{} is occupied", mv.to));
        }
        cells[index] = match self.turn_to_move(position) {
            Color::White => b'X',
            Color::Black => b'O',
        };
        MoveOutcome::Accepted(AppliedMove {
            position: String::from_utf8_lossy(&cells).into_owned(),
            captured: None,
            is_check: false,
        })
    }

    fn turn_to_move(&self, position: &str) -> Color {
        let cells = board(position);
        let xs = cells.iter().filter(|c| **c == b'X').count();
        let os = cells.iter().filter(|c| **c == b'O').count();
        if xs > os { Color::Black } else { Color::White }
    }

    fn classify_terminal(&self, position: &str) -> Vec<Terminal> {
        let cells = board(position);
        if has_line(&cells) {
            // Only the player who just moved can have completed a line.
            vec![Terminal::Checkmate]
        } else if cells.iter().all(|c| *c != b'.') {
            vec![Terminal::OtherDraw]
        } else {
            Vec::new()
        }
    }

    fn legal_moves(&self, position: &str) -> Vec<MoveSpec> {
        let cells = board(position);
        if has_line(&cells) {
            return Vec::new();
        }
        cells
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == b'.')
            .map(|(i, _)| MoveSpec::new("@", cell_name(i)))
            .collect()
    }
}
