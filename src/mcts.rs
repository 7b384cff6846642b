//! Proof-number guided Monte Carlo Tree Search.
//!
//! Each iteration of the search:
//!
//! 1. **Select** a path from the root. Unexpanded nodes are developed (all
//!    children at once), fresh children get one visit each in random order,
//!    and after that children are scored with UCT plus a proof-number term:
//!
//!    ```text
//!    value = mean + C * sqrt(ln(N) / n) + P * (1 - rank / siblings)
//!    ```
//!
//! 2. **Play out** the reached leaf with the N-gram guided policy and merge
//!    the playout into the N-gram statistics.
//! 3. **Backpropagate** visits and utilities to the root, refreshing proof
//!    and disproof numbers and sibling ranks on the way.
//!
//! The move finally played is the root child with the most visits, unless
//! proven-line trust is on and the root is proven, in which case a proven
//! child is played.
//!
//! The tree is built fresh for every decision. The N-gram statistics belong
//! to the engine and carry over from one decision to the next.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SearchConfig;
use crate::constants::TIME_PER_MOVE;
use crate::error::{IterationError, SearchError};
use crate::game::{draw_utilities, Game, PlayerId};
use crate::ngram::{MoveRecord, NGramStats};
use crate::node::{NodeId, SearchTree};
use crate::playout::guided_playout;

/// Limits of one decision. The search stops at whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub time: Option<Duration>,
    pub iterations: Option<u32>,
}

impl Budget {
    /// A fixed number of iterations, no time limit.
    pub fn iterations(iterations: u32) -> Self {
        Self {
            time: None,
            iterations: Some(iterations),
        }
    }

    /// A wall-clock limit, no iteration limit.
    pub fn time(time: Duration) -> Self {
        Self {
            time: Some(time),
            iterations: None,
        }
    }

    /// Build a budget from driver-style limits: a non-positive, infinite or
    /// out-of-range number of seconds or a negative iteration count means
    /// "no limit". The depth
    /// limit is accepted for interface compatibility and ignored.
    pub fn from_limits(max_seconds: f64, max_iterations: i64, _max_depth: i64) -> Self {
        // Seconds beyond what a Duration holds mean no limit.
        let time = (max_seconds > 0.0)
            .then(|| Duration::try_from_secs_f64(max_seconds).ok())
            .flatten();
        let iterations = (max_iterations >= 0)
            .then(|| u32::try_from(max_iterations).unwrap_or(u32::MAX));
        Self { time, iterations }
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::time(Duration::from_secs_f64(TIME_PER_MOVE))
    }
}

/// Counters kept by one engine across decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchCounters {
    /// Playouts run since the engine was created or reset.
    pub simulations: u64,
    /// Playouts run during the last decision.
    pub simulations_this_turn: u64,
    /// Decisions made.
    pub turns: u64,
    /// Distinct grams ever inserted into the N-gram tables.
    pub ngram_additions: u64,
}

/// Summary of one root child after a search.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildSummary<M> {
    pub mv: M,
    pub visits: u32,
    /// Mean utility for the player to move at the root.
    pub mean_score: f64,
    pub proof: f64,
    pub disproof: f64,
    pub rank: u32,
}

/// Everything a driver may want to know about one decision.
#[derive(Debug, Clone)]
pub struct SearchReport<M> {
    pub best_move: M,
    /// Completed iterations.
    pub iterations: u32,
    /// Iterations that failed and were discarded.
    pub aborted_iterations: u32,
    pub elapsed: Duration,
    pub root_visits: u32,
    pub root_proof: f64,
    pub root_disproof: f64,
    /// Nodes allocated in the tree.
    pub tree_size: usize,
    pub children: Vec<ChildSummary<M>>,
}

impl<M> SearchReport<M> {
    /// The root is proven a win for the searching player.
    pub fn is_proven_win(&self) -> bool {
        self.root_proof == 0.0
    }

    /// The root is proven not to be a win for the searching player.
    pub fn is_proven_loss(&self) -> bool {
        self.root_disproof == 0.0
    }
}

/// A search instance playing one side of a game.
pub struct SearchEngine<G: Game> {
    config: SearchConfig,
    player: Option<PlayerId>,
    num_players: usize,
    stats: NGramStats<G::Move>,
    counters: SearchCounters,
    rng: fastrand::Rng,
    stop: Arc<AtomicBool>,
}

impl<G: Game> SearchEngine<G> {
    /// Create an engine. The configuration is validated here and never
    /// changes afterwards.
    pub fn new(config: SearchConfig) -> Result<Self, SearchError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        let stats = NGramStats::new(config.ngram_length, config.ngram_min_visits, config.decay);
        Ok(Self {
            config,
            player: None,
            num_players: 0,
            stats,
            counters: SearchCounters::default(),
            rng,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Prepare the engine to play `player` in a new match of `game`.
    ///
    /// Rejects stochastic and non-alternating games. Statistics from any
    /// previous match are discarded.
    pub fn initialize(&mut self, game: &G, player: PlayerId) -> Result<(), SearchError> {
        let stochastic = game.is_stochastic();
        let alternating = game.is_alternating();
        if stochastic || !alternating {
            return Err(SearchError::UnsupportedGame {
                stochastic,
                alternating,
            });
        }
        let players = game.num_players();
        if player == 0 || player > players {
            return Err(SearchError::InvalidPlayer { player, players });
        }

        self.player = Some(player);
        self.num_players = players;
        self.reset_statistics();
        Ok(())
    }

    /// Release the match state. The engine must be initialized again
    /// before its next search.
    pub fn shutdown(&mut self) {
        self.player = None;
        self.reset_statistics();
    }

    /// Forget all N-gram statistics and counters.
    pub fn reset_statistics(&mut self) {
        self.stats.reset();
        self.counters = SearchCounters::default();
    }

    #[inline]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    #[inline]
    pub fn player(&self) -> Option<PlayerId> {
        self.player
    }

    #[inline]
    pub fn counters(&self) -> SearchCounters {
        SearchCounters {
            ngram_additions: self.stats.additions(),
            ..self.counters
        }
    }

    #[inline]
    pub fn statistics(&self) -> &NGramStats<G::Move> {
        &self.stats
    }

    /// Handle that stops a running search at the next iteration boundary.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Choose a move in `state`.
    pub fn select_move(
        &mut self,
        game: &G,
        state: &G::State,
        budget: Budget,
    ) -> Result<G::Move, SearchError> {
        self.search(game, state, budget).map(|report| report.best_move)
    }

    /// Run a full search from `state` and report on it.
    pub fn search(
        &mut self,
        game: &G,
        state: &G::State,
        budget: Budget,
    ) -> Result<SearchReport<G::Move>, SearchError> {
        let player = self.player.ok_or(SearchError::NotInitialized)?;
        if game.is_terminal(state) {
            return Err(SearchError::TerminalPosition);
        }
        let legal = game.legal_moves(state);
        if legal.is_empty() {
            return Err(SearchError::NoLegalMoves);
        }

        self.stop.store(false, Ordering::Relaxed);
        self.counters.simulations_this_turn = 0;
        self.counters.turns += 1;

        let start = Instant::now();
        let deadline = budget.time.and_then(|time| start.checked_add(time));
        let max_iterations = budget.iterations.unwrap_or(u32::MAX);

        let mut tree = SearchTree::new(game, state.clone(), player);
        let mut iterations = 0u32;
        let mut aborted = 0u32;
        let mut failures = 0u32;

        while iterations < max_iterations
            && deadline.is_none_or(|deadline| Instant::now() < deadline)
            && !self.stop.load(Ordering::Relaxed)
        {
            match self.iterate(game, &mut tree) {
                Ok(()) => {
                    iterations += 1;
                    failures = 0;
                }
                Err(err) => {
                    aborted += 1;
                    failures += 1;
                    log::warn!("iteration aborted: {err}");
                    if failures >= self.config.max_consecutive_failures {
                        log::warn!("{failures} iterations failed in a row, stopping search");
                        break;
                    }
                }
            }
        }

        self.stats.end_turn();

        let root = tree.root();
        let best_move = match final_move_selection(&tree, self.config.trust_proven_lines, &mut self.rng)
            .and_then(|id| tree.get(id).mv().cloned())
        {
            Some(mv) => mv,
            None => {
                log::warn!("search ended before the root was expanded, playing a random move");
                legal[self.rng.usize(..legal.len())].clone()
            }
        };

        let root_node = tree.get(root);
        let mover = root_node.mover();
        let children = root_node
            .children()
            .iter()
            .filter_map(|&id| {
                let child = tree.get(id);
                child.mv().map(|mv| ChildSummary {
                    mv: mv.clone(),
                    visits: child.visits(),
                    mean_score: child.mean_score(mover),
                    proof: child.proof(),
                    disproof: child.disproof(),
                    rank: child.rank(),
                })
            })
            .collect();

        let report = SearchReport {
            best_move,
            iterations,
            aborted_iterations: aborted,
            elapsed: start.elapsed(),
            root_visits: root_node.visits(),
            root_proof: root_node.proof(),
            root_disproof: root_node.disproof(),
            tree_size: tree.len(),
            children,
        };
        log::debug!(
            "player {player}: {} iterations ({} aborted) in {:.3}s, {} nodes, root pn={} dn={}, move {:?}",
            report.iterations,
            report.aborted_iterations,
            report.elapsed.as_secs_f64(),
            report.tree_size,
            report.root_proof,
            report.root_disproof,
            report.best_move,
        );
        Ok(report)
    }

    /// One select, expand, playout, backpropagate cycle.
    fn iterate(&mut self, game: &G, tree: &mut SearchTree<G>) -> Result<(), IterationError> {
        let mut current = tree.root();
        loop {
            if tree.get(current).is_terminal() {
                break;
            }
            current = self.select(game, tree, current)?;
            if tree.get(current).visits() == 0 {
                break;
            }
        }

        let leaf = tree.get(current);
        let (utilities, history) = match leaf.outcome() {
            Some(outcome) => (outcome.to_vec(), Vec::new()),
            None => {
                let own = tree.proof_player();
                let result =
                    guided_playout(game, leaf.state(), &self.stats, &self.config, own, &mut self.rng);
                self.stats.update(&result.history, &result.utilities, own);
                self.counters.simulations += 1;
                self.counters.simulations_this_turn += 1;
                (result.utilities, result.history)
            }
        };

        self.backpropagate(tree, current, &utilities, &history);
        Ok(())
    }

    /// Pick the child of `id` to descend into, developing `id` if needed.
    fn select(
        &mut self,
        game: &G,
        tree: &mut SearchTree<G>,
        id: NodeId,
    ) -> Result<NodeId, IterationError> {
        if !tree.get(id).is_expanded() {
            return tree.develop(game, id, &mut self.rng);
        }
        if let Some(child) = tree.take_unvisited(id, &mut self.rng) {
            return Ok(child);
        }

        let node = tree.get(id);
        let mover = node.mover();
        let siblings = node.children().len() as f64;
        let ln_visits = (node.visits() as f64).ln();
        let pruning = node.proof() != 0.0 && node.disproof() != 0.0;
        let min_visits = self.config.solverlike_min_visits;

        let mut best = None;
        let mut best_value = f64::NEG_INFINITY;
        let mut ties = 0usize;

        for &child_id in node.children() {
            let child = tree.get(child_id);
            if pruning && child.visits() > min_visits && (child.is_proven() || child.is_disproven()) {
                continue;
            }

            let value = if child.visits() == 0 {
                f64::INFINITY
            } else {
                let exploit = self.exploitation(tree, child_id, mover);
                let explore = (ln_visits / child.visits() as f64).sqrt();
                let pn_effect = 1.0 - child.rank() as f64 / siblings;
                exploit
                    + self.config.exploration_constant * explore
                    + self.config.pn_constant * pn_effect
            };

            if value > best_value {
                best_value = value;
                best = Some(child_id);
                ties = 1;
            } else if value == best_value {
                ties += 1;
                if self.rng.usize(..ties) == 0 {
                    best = Some(child_id);
                }
            }
        }

        best.ok_or(IterationError::NoSelectableChild(id.index()))
    }

    /// Mean utility of `id` for `player`, blended with its AMAF value when
    /// RAVE is on.
    fn exploitation(&self, tree: &SearchTree<G>, id: NodeId, player: PlayerId) -> f64 {
        let node = tree.get(id);
        let mean = node.mean_score(player);
        if !self.config.rave {
            return mean;
        }
        match node.amaf_mean(player) {
            Some(amaf) => {
                let v = node.visits() as f64;
                let av = node.amaf_visits() as f64;
                let beta = av / (av + v + v * av / self.config.rave_equivalence);
                beta * amaf + (1.0 - beta) * mean
            }
            None => mean,
        }
    }

    /// Walk from `leaf` to the root, accumulating visits and utilities and
    /// refreshing proof numbers and ranks.
    ///
    /// The leaf's own proof numbers were set when it was created and are not
    /// refreshed. With `pn_early_exit` the refresh stops at the first node
    /// whose numbers do not change; visits and scores always reach the root.
    fn backpropagate(
        &mut self,
        tree: &mut SearchTree<G>,
        leaf: NodeId,
        utilities: &[f64],
        playout: &[MoveRecord<G::Move>],
    ) {
        let players = self.num_players.max(tree.get(leaf).score_sums.len() - 1);
        let utilities = if utilities.len() > players {
            utilities.to_vec()
        } else {
            let mut padded = draw_utilities(players);
            padded[..utilities.len()].copy_from_slice(utilities);
            padded
        };

        let mut played: HashSet<(PlayerId, G::Move)> = if self.config.rave {
            playout.iter().map(|r| (r.player, r.mv.clone())).collect()
        } else {
            HashSet::new()
        };

        let mut refresh = true;
        let mut current = Some(leaf);
        while let Some(id) = current {
            let node = tree.get_mut(id);
            node.visits += 1;
            for (sum, u) in node.score_sums.iter_mut().zip(&utilities).skip(1) {
                *sum += u;
            }

            if self.config.rave {
                tree.update_amaf(id, |player, mv| played.contains(&(player, mv.clone())), &utilities);
            }

            if id != leaf && refresh {
                let changed = tree.update_proof_disproof(id);
                tree.rank_children(id);
                if self.config.pn_early_exit && !changed {
                    refresh = false;
                }
            }

            let node = tree.get(id);
            current = node.parent();
            if self.config.rave {
                if let (Some(parent), Some(mv)) = (current, node.mv()) {
                    played.insert((tree.get(parent).mover(), mv.clone()));
                }
            }
        }
    }
}

/// The root child to play: most visits, ties broken uniformly at random.
///
/// With `trust_proven` and a proven root, a proven child is preferred
/// regardless of visits. Returns `None` when the root has no children.
pub fn final_move_selection<G: Game>(
    tree: &SearchTree<G>,
    trust_proven: bool,
    rng: &mut fastrand::Rng,
) -> Option<NodeId> {
    let root = tree.get(tree.root());

    if trust_proven && root.is_proven() {
        let proven = root
            .children()
            .iter()
            .copied()
            .find(|&id| tree.get(id).is_proven());
        if proven.is_some() {
            return proven;
        }
    }

    let mut best = None;
    let mut best_visits = 0u32;
    let mut ties = 0usize;
    for &id in root.children() {
        let visits = tree.get(id).visits();
        if best.is_none() || visits > best_visits {
            best = Some(id);
            best_visits = visits;
            ties = 1;
        } else if visits == best_visits {
            ties += 1;
            if rng.usize(..ties) == 0 {
                best = Some(id);
            }
        }
    }
    best
}
