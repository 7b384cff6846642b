//! Tic-tac-toe on a 3x3 board. Player 1 plays X and moves first.

use std::fmt;

use crate::game::{Game, PlayerId};

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

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TicTacToe;

/// A cell index, 0 to 8, row by row. Cell 4 is the centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicTacToeMove(pub u8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicTacToeState {
    /// 0 for empty, otherwise the player owning the cell.
    cells: [u8; 9],
    mover: PlayerId,
}

impl TicTacToe {
    pub fn initial_state(&self) -> TicTacToeState {
        TicTacToeState {
            cells: [0; 9],
            mover: 1,
        }
    }
}

impl TicTacToeState {
    /// Owner of `cell`, if any.
    pub fn cell(&self, cell: usize) -> Option<PlayerId> {
        match self.cells.get(cell) {
            Some(&owner) if owner != 0 => Some(owner as PlayerId),
            _ => None,
        }
    }

    pub fn winner(&self) -> Option<PlayerId> {
        LINES.iter().find_map(|&[a, b, c]| {
            let owner = self.cells[a];
            (owner != 0 && owner == self.cells[b] && owner == self.cells[c]).then_some(owner as PlayerId)
        })
    }

    fn is_full(&self) -> bool {
        self.cells.iter().all(|&c| c != 0)
    }
}

impl Game for TicTacToe {
    type State = TicTacToeState;
    type Move = TicTacToeMove;

    fn num_players(&self) -> usize {
        2
    }

    fn legal_moves(&self, state: &TicTacToeState) -> Vec<TicTacToeMove> {
        if state.winner().is_some() {
            return Vec::new();
        }
        (0..9u8)
            .filter(|&i| state.cells[i as usize] == 0)
            .map(TicTacToeMove)
            .collect()
    }

    fn apply(&self, state: &TicTacToeState, mv: &TicTacToeMove) -> TicTacToeState {
        let mut next = state.clone();
        if let Some(cell) = next.cells.get_mut(mv.0 as usize) {
            *cell = state.mover as u8;
        }
        next.mover = 3 - state.mover;
        next
    }

    fn is_terminal(&self, state: &TicTacToeState) -> bool {
        state.winner().is_some() || state.is_full()
    }

    fn mover(&self, state: &TicTacToeState) -> PlayerId {
        state.mover
    }

    fn utilities(&self, state: &TicTacToeState) -> Vec<f64> {
        let mut utilities = vec![0.0; 3];
        if let Some(winner) = state.winner() {
            utilities[winner] = 1.0;
            utilities[3 - winner] = -1.0;
        }
        utilities
    }
}

impl fmt::Display for TicTacToeMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0 / 3, self.0 % 3)
    }
}

impl fmt::Display for TicTacToeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            for col in 0..3 {
                let ch = match self.cells[row * 3 + col] {
                    1 => 'X',
                    2 => 'O',
                    _ => '.',
                };
                write!(f, "{ch} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
