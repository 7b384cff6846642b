//! Normal-play Nim: players alternately take stones from one heap, and
//! whoever takes the last stone wins.

use std::fmt;

use crate::game::{Game, PlayerId};

/// Nim with a fixed starting position and a cap on stones taken per move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nim {
    heaps: Vec<u32>,
    max_take: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NimMove {
    pub heap: usize,
    pub take: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NimState {
    heaps: Vec<u32>,
    mover: PlayerId,
}

impl Nim {
    /// A game starting from `heaps`. At least one stone is always allowed
    /// per move, whatever `max_take` says.
    pub fn new(heaps: Vec<u32>, max_take: u32) -> Self {
        Self {
            heaps,
            max_take: max_take.max(1),
        }
    }

    #[inline]
    pub fn max_take(&self) -> u32 {
        self.max_take
    }

    /// The starting position, player 1 to move.
    pub fn initial_state(&self) -> NimState {
        NimState {
            heaps: self.heaps.clone(),
            mover: 1,
        }
    }
}

impl NimState {
    #[inline]
    pub fn heaps(&self) -> &[u32] {
        &self.heaps
    }

    #[inline]
    pub fn stones(&self) -> u32 {
        self.heaps.iter().sum()
    }
}

impl Game for Nim {
    type State = NimState;
    type Move = NimMove;

    fn num_players(&self) -> usize {
        2
    }

    fn legal_moves(&self, state: &NimState) -> Vec<NimMove> {
        let mut moves = Vec::new();
        for (heap, &stones) in state.heaps.iter().enumerate() {
            for take in 1..=stones.min(self.max_take) {
                moves.push(NimMove { heap, take });
            }
        }
        moves
    }

    fn apply(&self, state: &NimState, mv: &NimMove) -> NimState {
        let mut heaps = state.heaps.clone();
        if let Some(stones) = heaps.get_mut(mv.heap) {
            *stones = stones.saturating_sub(mv.take);
        }
        NimState {
            heaps,
            mover: 3 - state.mover,
        }
    }

    fn is_terminal(&self, state: &NimState) -> bool {
        state.stones() == 0
    }

    fn mover(&self, state: &NimState) -> PlayerId {
        state.mover
    }

    /// The player to move in an empty position has lost.
    fn utilities(&self, state: &NimState) -> Vec<f64> {
        let mut utilities = vec![0.0; 3];
        if self.is_terminal(state) {
            utilities[state.mover] = -1.0;
            utilities[3 - state.mover] = 1.0;
        }
        utilities
    }
}

impl fmt::Display for NimMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "take {} from heap {}", self.take, self.heap)
    }
}

impl fmt::Display for NimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stones) in self.heaps.iter().enumerate() {
            writeln!(f, "{i}: {}", "|".repeat(*stones as usize))?;
        }
        write!(f, "player {} to move", self.mover)
    }
}
