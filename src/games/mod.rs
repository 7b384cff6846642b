//! Small reference games used by the demo binary, the self-play harness and
//! the tests.

mod nim;
mod tictactoe;

pub use nim::{Nim, NimMove, NimState};
pub use tictactoe::{TicTacToe, TicTacToeMove, TicTacToeState};
