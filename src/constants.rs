//! Default tuning constants for the search and its playout statistics.
//!
//! These are the values a freshly constructed [`SearchConfig`](crate::config::SearchConfig)
//! starts from. Every one of them can be overridden per engine instance.

// =============================================================================
// Selection (UCT + proof-number term)
// =============================================================================

/// UCT exploration constant (sqrt(2)).
pub const EXPLORATION_CONSTANT: f64 = std::f64::consts::SQRT_2;

/// Weight of the rank-based proof-number term in the selection formula.
pub const PN_CONSTANT: f64 = 1.0;

/// Visits a proven or disproven child may collect before selection skips it.
/// The default disables the pruning.
pub const SOLVERLIKE_MIN_VISITS: u32 = u32::MAX;

// =============================================================================
// Playout policy (MAST / N-gram)
// =============================================================================

/// Default N of the N-gram statistics (1 = plain MAST).
pub const NGRAM_LENGTH: usize = 1;

/// Largest supported N.
pub const MAX_NGRAM_LENGTH: usize = 3;

/// Probability of playing a uniformly random move during a playout.
pub const EPSILON: f64 = 0.2;

/// Score given to a move that has no statistics yet, so it gets tried once.
pub const NEW_MOVE_SCORE: f64 = 100.0;

/// Visits a multi-move gram needs before it counts towards a move's score.
pub const NGRAM_MIN_VISITS: u32 = 7;

/// Simulations between two per-update decay steps.
pub const DECAY_INTERVAL: u64 = 1;

/// Hard cap on playout length. A playout cut here scores as a draw.
pub const MAX_PLAYOUT_MOVES: usize = 10_000;

// =============================================================================
// RAVE
// =============================================================================

/// RAVE equivalence parameter - controls how fast AMAF values fade out.
pub const RAVE_EQUIV: f64 = 3500.0;

// =============================================================================
// Search loop
// =============================================================================

/// Consecutive aborted iterations after which a search gives up early.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 64;

/// Default thinking time per move, in seconds.
pub const TIME_PER_MOVE: f64 = 1.0;

// =============================================================================
// Self-play harness
// =============================================================================

/// Moves after which a self-play game is adjudicated as a draw.
pub const MAX_GAME_MOVES: u32 = 500;
