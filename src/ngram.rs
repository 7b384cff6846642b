//! N-gram move statistics (MAST and its N-gram generalisation).
//!
//! After every playout the sequence of moves played is cut into grams: for
//! each move, the trailing sequences of length 1..=N that end in it and in
//! which the acting sides strictly alternate. Each gram is credited with the
//! final utility of the side that played its last move.
//!
//! Statistics are kept in two independent sets of tables, one for the side
//! the engine plays ([`Side::Own`]) and one for its opponents
//! ([`Side::Opponent`]). Each table maps a gram to a visit-weighted running
//! mean of the utilities it was credited with. The playout policy does not
//! read grams directly; it reads a per-move aggregate, the sum of the scores
//! of all trusted grams ending in that move.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::config::DecayConfig;
use crate::game::PlayerId;

/// An ordered, immutable sequence of 1..=N moves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NGramKey<M>(Box<[M]>);

impl<M: Clone> NGramKey<M> {
    pub fn new(moves: &[M]) -> Self {
        Self(moves.into())
    }
}

impl<M> NGramKey<M> {
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn moves(&self) -> &[M] {
        &self.0
    }

    /// The move that completes the gram.
    #[inline]
    pub fn last(&self) -> Option<&M> {
        self.0.last()
    }
}

/// A move played during a simulation, with the player who played it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord<M> {
    pub mv: M,
    pub player: PlayerId,
}

impl<M> MoveRecord<M> {
    pub fn new(mv: M, player: PlayerId) -> Self {
        Self { mv, player }
    }
}

/// Which table set a move is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The player the engine searches for.
    Own,
    Opponent,
}

impl Side {
    pub fn of(player: PlayerId, own: PlayerId) -> Self {
        if player == own { Side::Own } else { Side::Opponent }
    }
}

/// Statistics of one gram.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GramStats {
    /// Visit-weighted mean utility.
    pub score: f64,
    pub visits: u32,
}

impl GramStats {
    /// Merge `occurrences` new samples of `utility` into the running mean.
    pub fn merged(self, utility: f64, occurrences: u32) -> Self {
        let visits = self.visits + occurrences;
        let score = (self.score * self.visits as f64 + utility * occurrences as f64) / visits as f64;
        Self { score, visits }
    }

    /// Scale score and visits by `factor`. Visits round up so that a
    /// seen gram never falls back to zero visits.
    pub fn decayed(self, factor: f64) -> Self {
        Self {
            score: self.score * factor,
            visits: (self.visits as f64 * factor).ceil() as u32,
        }
    }
}

/// Whether the gram of length `n` ending at `end` is a valid gram for `owner`.
///
/// The last move must be `owner`'s, and walking backwards from it the acting
/// player must change at every step.
pub fn is_valid_gram<M>(history: &[MoveRecord<M>], end: usize, n: usize, owner: PlayerId) -> bool {
    if n == 0 || end >= history.len() || n > end + 1 {
        return false;
    }
    let start = end + 1 - n;
    history[start..=end]
        .iter()
        .rev()
        .enumerate()
        .all(|(back, record)| (record.player == owner) == (back % 2 == 0))
}

/// Count every valid gram of length 1..=`max_len` in `history`, grouped by
/// the player of its last move.
pub fn collect_grams<M>(
    history: &[MoveRecord<M>],
    max_len: usize,
) -> HashMap<PlayerId, HashMap<NGramKey<M>, u32>>
where
    M: Clone + Eq + Hash,
{
    let mut grams: HashMap<PlayerId, HashMap<NGramKey<M>, u32>> = HashMap::with_capacity(2);
    let mut sequence = Vec::with_capacity(max_len);

    for (end, record) in history.iter().enumerate() {
        let owned = grams.entry(record.player).or_default();
        for n in 1..=max_len.min(end + 1) {
            if !is_valid_gram(history, end, n, record.player) {
                continue;
            }
            sequence.clear();
            sequence.extend(history[end + 1 - n..=end].iter().map(|r| r.mv.clone()));
            *owned.entry(NGramKey::new(&sequence)).or_insert(0) += 1;
        }
    }

    grams
}

/// Statistics tables of one side.
#[derive(Debug, Clone)]
pub struct SideTables<M> {
    /// Grams grouped by their last move.
    grams: HashMap<M, HashMap<NGramKey<M>, GramStats>>,
    /// Simulation index of the last merge of each gram.
    last_seen: HashMap<NGramKey<M>, u64>,
    move_scores: HashMap<M, f64>,
    move_visits: HashMap<M, u64>,
}

impl<M> Default for SideTables<M> {
    fn default() -> Self {
        Self {
            grams: HashMap::new(),
            last_seen: HashMap::new(),
            move_scores: HashMap::new(),
            move_visits: HashMap::new(),
        }
    }
}

impl<M> SideTables<M>
where
    M: Clone + Eq + Hash + Debug,
{
    pub fn get(&self, key: &NGramKey<M>) -> Option<GramStats> {
        let last = key.last()?;
        self.grams.get(last)?.get(key).copied()
    }

    pub fn move_score(&self, mv: &M) -> Option<f64> {
        self.move_scores.get(mv).copied()
    }

    /// How often the aggregate score of `mv` was refreshed.
    pub fn move_visits(&self, mv: &M) -> u64 {
        self.move_visits.get(mv).copied().unwrap_or(0)
    }

    pub fn last_seen(&self, key: &NGramKey<M>) -> Option<u64> {
        self.last_seen.get(key).copied()
    }

    /// Number of grams stored.
    pub fn len(&self) -> usize {
        self.grams.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.grams.values().all(HashMap::is_empty)
    }

    /// Merge samples into a gram. Returns whether the gram is new.
    fn merge(&mut self, key: &NGramKey<M>, utility: f64, occurrences: u32, simulation: u64) -> bool {
        let Some(last) = key.last() else {
            return false;
        };
        self.last_seen.insert(key.clone(), simulation);
        let grams = self.grams.entry(last.clone()).or_default();
        let is_new = !grams.contains_key(key);
        let entry = grams.entry(key.clone()).or_default();
        *entry = entry.merged(utility, occurrences);
        is_new
    }

    fn decay_gram(&mut self, key: &NGramKey<M>, factor: f64) {
        let entry = key
            .last()
            .and_then(|last| self.grams.get_mut(last))
            .and_then(|grams| grams.get_mut(key));
        if let Some(stats) = entry {
            *stats = stats.decayed(factor);
        }
    }

    fn decay_all(&mut self, factor: f64) {
        for stats in self.grams.values_mut().flat_map(HashMap::values_mut) {
            *stats = stats.decayed(factor);
        }
    }

    /// Recompute the aggregate score of `mv` from the grams ending in it.
    ///
    /// 1-grams always count; longer grams only once they have `min_visits`.
    /// Returns whether any gram was trusted.
    fn refresh_move(&mut self, mv: &M, min_visits: u32) -> bool {
        let Some(grams) = self.grams.get(mv) else {
            return false;
        };

        let mut total = 0.0;
        let mut trusted = 0usize;
        for (key, stats) in grams {
            debug_assert!(stats.visits > 0, "gram {key:?} has a score but no visits");
            if stats.visits == 0 {
                continue;
            }
            if key.len() == 1 || stats.visits >= min_visits {
                total += stats.score;
                trusted += 1;
            }
        }

        if trusted > 0 {
            self.move_scores.insert(mv.clone(), total);
        }
        trusted > 0
    }

    /// Refresh `mv` after a merge and count the use.
    fn record_move(&mut self, mv: &M, min_visits: u32) {
        if self.refresh_move(mv, min_visits) {
            *self.move_visits.entry(mv.clone()).or_insert(0) += 1;
        }
    }

    /// Refresh every aggregate without touching the usage counters.
    fn refresh_all(&mut self, min_visits: u32) {
        let moves: Vec<M> = self.grams.keys().cloned().collect();
        for mv in &moves {
            self.refresh_move(mv, min_visits);
        }
    }

    fn prune_stale(&mut self, min_simulation: u64) -> usize {
        let stale: Vec<NGramKey<M>> = self
            .last_seen
            .iter()
            .filter(|&(_, &seen)| seen < min_simulation)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.last_seen.remove(key);
            if let Some(grams) = key.last().and_then(|last| self.grams.get_mut(last)) {
                grams.remove(key);
            }
        }
        self.grams.retain(|_, grams| !grams.is_empty());
        let remaining: Vec<M> = self.move_scores.keys().cloned().collect();
        for mv in remaining {
            if !self.grams.contains_key(&mv) {
                self.move_scores.remove(&mv);
            }
        }
        stale.len()
    }

    fn top_grams(&self, per_length: usize, max_len: usize) -> Vec<(NGramKey<M>, GramStats)> {
        let mut report = Vec::new();
        for len in 1..=max_len {
            let mut of_len: Vec<_> = self
                .grams
                .values()
                .flat_map(|grams| grams.iter())
                .filter(|(key, _)| key.len() == len)
                .map(|(key, stats)| (key.clone(), *stats))
                .collect();
            of_len.sort_by(|a, b| {
                b.1.visits
                    .cmp(&a.1.visits)
                    .then_with(|| b.1.score.total_cmp(&a.1.score))
            });
            report.extend(of_len.into_iter().take(per_length));
        }
        report
    }
}

/// Playout statistics of one engine instance.
///
/// Lives as long as the engine and is carried from one decision to the
/// next; it must be reset between independent matches.
#[derive(Debug, Clone)]
pub struct NGramStats<M> {
    max_len: usize,
    min_visits: u32,
    decay: DecayConfig,
    own: SideTables<M>,
    opponent: SideTables<M>,
    simulations: u64,
    additions: u64,
}

impl<M> NGramStats<M>
where
    M: Clone + Eq + Hash + Debug,
{
    pub fn new(max_len: usize, min_visits: u32, decay: DecayConfig) -> Self {
        Self {
            max_len: max_len.max(1),
            min_visits,
            decay,
            own: SideTables::default(),
            opponent: SideTables::default(),
            simulations: 0,
            additions: 0,
        }
    }

    #[inline]
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn side(&self, side: Side) -> &SideTables<M> {
        match side {
            Side::Own => &self.own,
            Side::Opponent => &self.opponent,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideTables<M> {
        match side {
            Side::Own => &mut self.own,
            Side::Opponent => &mut self.opponent,
        }
    }

    /// Aggregate score of `mv` for `side`, if the move has statistics.
    pub fn move_score(&self, side: Side, mv: &M) -> Option<f64> {
        self.side(side).move_score(mv)
    }

    pub fn get(&self, side: Side, key: &NGramKey<M>) -> Option<GramStats> {
        self.side(side).get(key)
    }

    /// Number of simulations merged so far.
    #[inline]
    pub fn simulations(&self) -> u64 {
        self.simulations
    }

    /// Number of distinct grams ever inserted.
    #[inline]
    pub fn additions(&self) -> u64 {
        self.additions
    }

    /// Learn from a finished simulation.
    ///
    /// `utilities` is indexed by player; `own` is the player the engine
    /// searches for.
    pub fn update(&mut self, history: &[MoveRecord<M>], utilities: &[f64], own: PlayerId) {
        if history.is_empty() {
            return;
        }
        self.simulations += 1;
        let simulation = self.simulations;
        let decay_now = self
            .decay
            .per_update
            .filter(|_| simulation % self.decay.interval == 0);
        let min_visits = self.min_visits;

        for (player, grams) in collect_grams(history, self.max_len) {
            let utility = utilities.get(player).copied().unwrap_or(0.0);
            let tables = self.side_mut(Side::of(player, own));
            let mut added = 0;
            for (key, occurrences) in &grams {
                if tables.merge(key, utility, *occurrences, simulation) {
                    added += 1;
                }
                if let Some(last) = key.last() {
                    tables.record_move(last, min_visits);
                }
            }
            // Decay comes after the aggregates, which keep the undecayed
            // values until their next refresh.
            if let Some(factor) = decay_now {
                for (key, occurrences) in &grams {
                    tables.decay_gram(key, factor.powi(*occurrences as i32));
                }
            }
            self.additions += added;
        }
    }

    /// Per-turn decay of every gram, if enabled.
    pub fn end_turn(&mut self) {
        if let Some(factor) = self.decay.per_turn {
            self.apply_decay(factor);
        }
    }

    /// Scale every gram of both sides by `factor` and refresh move scores.
    pub fn apply_decay(&mut self, factor: f64) {
        let min_visits = self.min_visits;
        for side in [Side::Own, Side::Opponent] {
            let tables = self.side_mut(side);
            tables.decay_all(factor);
            tables.refresh_all(min_visits);
        }
    }

    /// Drop grams not merged since simulation `min_simulation`.
    /// Returns how many were dropped.
    pub fn prune_stale(&mut self, min_simulation: u64) -> usize {
        self.own.prune_stale(min_simulation) + self.opponent.prune_stale(min_simulation)
    }

    /// Up to `per_length` grams of each length for `side`, most visited first.
    pub fn top_grams(&self, side: Side, per_length: usize) -> Vec<(NGramKey<M>, GramStats)> {
        self.side(side).top_grams(per_length, self.max_len)
    }

    /// Forget everything, as before a new match.
    pub fn reset(&mut self) {
        self.own = SideTables::default();
        self.opponent = SideTables::default();
        self.simulations = 0;
        self.additions = 0;
    }
}
