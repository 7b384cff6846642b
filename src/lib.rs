//! PN-MCTS: a game-independent Monte Carlo Tree Search engine guided by
//! proof numbers, with MAST / N-gram playouts and optional RAVE.
//!
//! The engine searches any deterministic, strictly alternating game exposed
//! through the [`game::Game`] trait. Selection adds a proof-number rank term
//! to UCT, playouts follow N-gram move statistics learnt across decisions,
//! and solved subtrees can be trusted for the final move.
//!
//! ## Modules
//!
//! - [`constants`] - Default tuning parameters
//! - [`config`] - Per-engine configuration, TOML loading and validation
//! - [`error`] - Error types
//! - [`game`] - The game abstraction the search runs on
//! - [`node`] - Search tree arena with proof/disproof numbers
//! - [`ngram`] - MAST / N-gram playout statistics
//! - [`playout`] - Epsilon-greedy guided playouts
//! - [`mcts`] - The search engine
//! - [`selfplay`] - Engine-versus-engine matches
//! - [`games`] - Reference games (Nim, tic-tac-toe)
//!
//! ## Example
//!
//! ```
//! use pnmcts_rust::config::SearchConfig;
//! use pnmcts_rust::games::Nim;
//! use pnmcts_rust::mcts::{Budget, SearchEngine};
//!
//! let nim = Nim::new(vec![1, 2], 2);
//! let mut engine = SearchEngine::new(SearchConfig::solver()).unwrap();
//! engine.initialize(&nim, 1).unwrap();
//!
//! let report = engine
//!     .search(&nim, &nim.initial_state(), Budget::iterations(500))
//!     .unwrap();
//! println!("best move: {}", report.best_move);
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod game;
pub mod games;
pub mod mcts;
pub mod ngram;
pub mod node;
pub mod playout;
pub mod selfplay;
