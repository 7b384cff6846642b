//! Error types for the search engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::game::PlayerId;

/// Errors returned to the driver of a search.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The game is stochastic or does not strictly alternate turns.
    #[error(
        "unsupported game: search needs a deterministic, strictly alternating game \
         (stochastic: {stochastic}, alternating: {alternating})"
    )]
    UnsupportedGame { stochastic: bool, alternating: bool },

    /// The proof player does not exist in the game.
    #[error("player {player} is out of range for a {players}-player game")]
    InvalidPlayer { player: PlayerId, players: usize },

    /// A driver that needs a fixed number of players got another game.
    #[error("expected a {expected}-player game, got {players} players")]
    PlayerCount { players: usize, expected: usize },

    /// `select_move` was called before `initialize`.
    #[error("search engine has not been initialized for a game")]
    NotInitialized,

    /// The position handed to the search is already over.
    #[error("position is terminal, there is no move to select")]
    TerminalPosition,

    /// The position is not terminal but offers no legal move.
    #[error("position is not terminal but has no legal moves")]
    NoLegalMoves,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while building or loading a [`SearchConfig`](crate::config::SearchConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read config file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failure of a single search iteration.
///
/// These abort the iteration in progress only; the search loop logs them
/// and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IterationError {
    /// Every child of an expanded node was pruned.
    #[error("no child of node {0} could be selected")]
    NoSelectableChild(usize),

    /// A node with unknown value produced no children.
    #[error("node {0} expanded without producing children")]
    EmptyDevelopment(usize),
}
