//! The rules engine the search runs on.
//!
//! The search never looks inside states or moves. Everything it knows about
//! a game comes through the [`Game`] trait: who is to move, which moves are
//! legal, what a move leads to, and how a finished game scores.

use std::fmt::Debug;
use std::hash::Hash;

/// Player index. Players are numbered from 1; index 0 is unused so that
/// utility vectors can be indexed by player directly.
pub type PlayerId = usize;

/// A two-player (or more), perfect-information game.
pub trait Game {
    /// A full game position. Cloned whenever the search needs a copy it owns.
    type State: Clone;

    /// A move token. Moves are compared and hashed to key playout statistics,
    /// so equal moves must mean the same action wherever they are played.
    type Move: Clone + Eq + Hash + Debug;

    /// Number of players. Utility vectors have `num_players() + 1` entries.
    fn num_players(&self) -> usize;

    /// Whether chance events take part in the game.
    fn is_stochastic(&self) -> bool {
        false
    }

    /// Whether players strictly take turns, one move at a time.
    fn is_alternating(&self) -> bool {
        true
    }

    /// Legal moves in `state`. May be empty.
    fn legal_moves(&self, state: &Self::State) -> Vec<Self::Move>;

    /// The position reached by playing `mv` in `state`.
    fn apply(&self, state: &Self::State, mv: &Self::Move) -> Self::State;

    fn is_terminal(&self, state: &Self::State) -> bool;

    /// The player to act in `state`.
    fn mover(&self, state: &Self::State) -> PlayerId;

    /// Utilities of a finished game, indexed by player, each in [-1, 1].
    /// Index 0 is ignored.
    fn utilities(&self, state: &Self::State) -> Vec<f64>;
}

/// Utilities of an undecided game: zero for everybody.
pub fn draw_utilities(num_players: usize) -> Vec<f64> {
    vec![0.0; num_players + 1]
}

/// How a position stands once play has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    /// Finished, with a player scoring above zero.
    Win(PlayerId),
    /// Finished without a winner.
    Draw,
    /// Play stopped before the game ended.
    Unfinished,
}

/// Read the result of `state`. Utilities are only consulted for terminal
/// states.
pub fn game_result<G: Game>(game: &G, state: &G::State) -> GameResult {
    if !game.is_terminal(state) {
        return GameResult::Unfinished;
    }
    let utilities = game.utilities(state);
    (1..=game.num_players())
        .find(|&p| utilities.get(p).is_some_and(|&u| u > 0.0))
        .map_or(GameResult::Draw, GameResult::Win)
}
