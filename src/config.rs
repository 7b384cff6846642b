//! Per-instance search configuration.
//!
//! A [`SearchConfig`] is built once and handed to a
//! [`SearchEngine`](crate::mcts::SearchEngine); the engine never mutates it.
//! Configurations can also be read from TOML, where every field is optional:
//!
//! ```toml
//! pn_constant = 1.0
//! ngram_length = 2
//! trust_proven_lines = true
//!
//! [decay]
//! per_update = 0.94
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DECAY_INTERVAL, EPSILON, EXPLORATION_CONSTANT, MAX_CONSECUTIVE_FAILURES, MAX_NGRAM_LENGTH,
    MAX_PLAYOUT_MOVES, NEW_MOVE_SCORE, NGRAM_LENGTH, NGRAM_MIN_VISITS, PN_CONSTANT, RAVE_EQUIV,
    SOLVERLIKE_MIN_VISITS,
};
use crate::error::ConfigError;

/// Decay settings for the N-gram statistics. Both modes are off by default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecayConfig {
    /// Factor applied to a gram each time it is merged, raised to the
    /// number of occurrences in the simulation.
    pub per_update: Option<f64>,
    /// Factor applied to every gram after each decision.
    pub per_turn: Option<f64>,
    /// Simulations between two per-update decay steps.
    pub interval: u64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            per_update: None,
            per_turn: None,
            interval: DECAY_INTERVAL,
        }
    }
}

/// Tuning parameters for one search instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// UCT exploration weight.
    pub exploration_constant: f64,
    /// Weight of the rank-based proof-number term.
    pub pn_constant: f64,
    /// Visits after which solved children are skipped by selection.
    pub solverlike_min_visits: u32,
    /// N of the N-gram statistics, 1..=3.
    pub ngram_length: usize,
    /// Probability of a uniformly random playout move.
    pub epsilon: f64,
    /// Optimism score of moves without statistics.
    pub new_move_score: f64,
    /// Visits a multi-move gram needs before it is trusted.
    pub ngram_min_visits: u32,
    /// Opponent plays uniformly at random in playouts.
    pub opponent_plays_randomly: bool,
    /// Prefer a proven child over the robust child when the root is proven.
    pub trust_proven_lines: bool,
    /// Blend AMAF values into the exploitation term.
    pub rave: bool,
    pub rave_equivalence: f64,
    /// Stop refreshing proof numbers once they stop changing on the way up.
    pub pn_early_exit: bool,
    pub max_playout_moves: usize,
    pub max_consecutive_failures: u32,
    /// Seed for the engine RNG. `None` seeds from the OS.
    pub seed: Option<u64>,
    pub decay: DecayConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            exploration_constant: EXPLORATION_CONSTANT,
            pn_constant: PN_CONSTANT,
            solverlike_min_visits: SOLVERLIKE_MIN_VISITS,
            ngram_length: NGRAM_LENGTH,
            epsilon: EPSILON,
            new_move_score: NEW_MOVE_SCORE,
            ngram_min_visits: NGRAM_MIN_VISITS,
            opponent_plays_randomly: false,
            trust_proven_lines: false,
            rave: false,
            rave_equivalence: RAVE_EQUIV,
            pn_early_exit: false,
            max_playout_moves: MAX_PLAYOUT_MOVES,
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
            seed: None,
            decay: DecayConfig::default(),
        }
    }
}

impl SearchConfig {
    /// Defaults plus the solver behaviour: a proven root plays a proven
    /// child, and solved children stop being selected after 5 visits.
    pub fn solver() -> Self {
        Self {
            trust_proven_lines: true,
            solverlike_min_visits: 5,
            ..Self::default()
        }
    }

    /// Parse a configuration from a TOML document and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check that every parameter is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("exploration_constant", self.exploration_constant)?;
        non_negative("pn_constant", self.pn_constant)?;
        non_negative("rave_equivalence", self.rave_equivalence)?;

        if !self.new_move_score.is_finite() {
            return Err(invalid("new_move_score", "must be finite"));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(invalid(
                "epsilon",
                format!("{} is not a probability", self.epsilon),
            ));
        }
        if !(1..=MAX_NGRAM_LENGTH).contains(&self.ngram_length) {
            return Err(invalid(
                "ngram_length",
                format!("{} is outside 1..={MAX_NGRAM_LENGTH}", self.ngram_length),
            ));
        }
        if let Some(factor) = self.decay.per_update {
            decay_factor("decay.per_update", factor)?;
        }
        if let Some(factor) = self.decay.per_turn {
            decay_factor("decay.per_turn", factor)?;
        }
        if self.decay.interval == 0 {
            return Err(invalid("decay.interval", "must be at least 1"));
        }
        if self.max_playout_moves == 0 {
            return Err(invalid("max_playout_moves", "must be at least 1"));
        }
        if self.max_consecutive_failures == 0 {
            return Err(invalid("max_consecutive_failures", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} is not a finite, non-negative number")))
    }
}

fn decay_factor(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} is outside (0, 1]")))
    }
}
