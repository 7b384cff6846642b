//! Engine-versus-engine matches.
//!
//! [`run_match`] plays a series of games between two search configurations,
//! spread over a few OS threads. Each worker owns one engine per
//! configuration and re-initializes both before every game, so no statistics
//! leak from one game into the next. Results go into a shared [`MatchTally`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::constants::MAX_GAME_MOVES;
use crate::error::SearchError;
use crate::game::{Game, PlayerId};
use crate::mcts::{Budget, SearchEngine};

/// How a match is played.
#[derive(Debug, Clone, Copy)]
pub struct MatchConfig {
    pub games: u32,
    pub threads: usize,
    /// Budget of every single decision.
    pub budget: Budget,
    /// Moves after which an unfinished game counts as a draw.
    pub max_moves: u32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            games: 10,
            threads: 1,
            budget: Budget::default(),
            max_moves: MAX_GAME_MOVES,
        }
    }
}

/// Which side of the match won a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    A,
    B,
    Draw,
}

/// Running totals, shared between worker threads.
#[derive(Debug, Default)]
pub struct MatchTally {
    games: AtomicU64,
    a_wins: AtomicU64,
    b_wins: AtomicU64,
    draws: AtomicU64,
    moves: AtomicU64,
    a_simulations: AtomicU64,
    b_simulations: AtomicU64,
    a_turns: AtomicU64,
    b_turns: AtomicU64,
}

impl MatchTally {
    pub fn record(&self, outcome: GameOutcome, moves: u64) {
        self.games.fetch_add(1, Ordering::Relaxed);
        self.moves.fetch_add(moves, Ordering::Relaxed);
        let counter = match outcome {
            GameOutcome::A => &self.a_wins,
            GameOutcome::B => &self.b_wins,
            GameOutcome::Draw => &self.draws,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn add_work(&self, a: (u64, u64), b: (u64, u64)) {
        self.a_simulations.fetch_add(a.0, Ordering::Relaxed);
        self.a_turns.fetch_add(a.1, Ordering::Relaxed);
        self.b_simulations.fetch_add(b.0, Ordering::Relaxed);
        self.b_turns.fetch_add(b.1, Ordering::Relaxed);
    }

    /// A consistent-enough copy of the current totals.
    pub fn summary(&self, elapsed_secs: f64) -> MatchSummary {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MatchSummary {
            games: load(&self.games),
            a_wins: load(&self.a_wins),
            b_wins: load(&self.b_wins),
            draws: load(&self.draws),
            moves: load(&self.moves),
            a_simulations: load(&self.a_simulations),
            b_simulations: load(&self.b_simulations),
            a_turns: load(&self.a_turns),
            b_turns: load(&self.b_turns),
            elapsed_secs,
        }
    }
}

/// Final result of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub games: u64,
    pub a_wins: u64,
    pub b_wins: u64,
    pub draws: u64,
    /// Moves played over all games.
    pub moves: u64,
    pub a_simulations: u64,
    pub b_simulations: u64,
    pub a_turns: u64,
    pub b_turns: u64,
    pub elapsed_secs: f64,
}

impl MatchSummary {
    /// Score of configuration A, counting a draw as half a win.
    pub fn a_score(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        (self.a_wins as f64 + 0.5 * self.draws as f64) / self.games as f64
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}

/// Play `match_config.games` games of `game` from `initial` between
/// configuration A and configuration B. A moves first in even-numbered games.
pub fn run_match<G>(
    game: &G,
    initial: &G::State,
    config_a: &SearchConfig,
    config_b: &SearchConfig,
    match_config: &MatchConfig,
) -> Result<MatchSummary, SearchError>
where
    G: Game + Sync,
    G::State: Sync,
{
    let players = game.num_players();
    if players != 2 {
        return Err(SearchError::PlayerCount {
            players,
            expected: 2,
        });
    }
    // Catch bad configurations before any thread starts.
    config_a.validate()?;
    config_b.validate()?;

    let tally = MatchTally::default();
    let next_game = AtomicU64::new(0);
    let abort = AtomicBool::new(false);
    let start = Instant::now();
    let threads = match_config.threads.clamp(1, match_config.games.max(1) as usize);

    log::info!(
        "starting match: {} games on {} threads",
        match_config.games,
        threads
    );

    thread::scope(|scope| -> Result<(), SearchError> {
        let handles: Vec<_> = (0..threads)
            .map(|worker| {
                let tally = &tally;
                let next_game = &next_game;
                let abort = &abort;
                scope.spawn(move || -> Result<(), SearchError> {
                    let mut engine_a = SearchEngine::new(worker_config(config_a, worker, 0))?;
                    let mut engine_b = SearchEngine::new(worker_config(config_b, worker, 1))?;
                    loop {
                        let index = next_game.fetch_add(1, Ordering::Relaxed);
                        if index >= u64::from(match_config.games) || abort.load(Ordering::Relaxed) {
                            return Ok(());
                        }
                        let a_player = if index % 2 == 0 { 1 } else { 2 };
                        let result = play_game(
                            game,
                            initial,
                            &mut engine_a,
                            &mut engine_b,
                            a_player,
                            match_config,
                        );
                        let (outcome, moves) = match result {
                            Ok(result) => result,
                            Err(err) => {
                                abort.store(true, Ordering::Relaxed);
                                return Err(err);
                            }
                        };
                        let a = engine_a.counters();
                        let b = engine_b.counters();
                        tally.add_work((a.simulations, a.turns), (b.simulations, b.turns));
                        tally.record(outcome, moves);
                        log::debug!("game {index}: {outcome:?} after {moves} moves (worker {worker})");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))?;
        }
        Ok(())
    })?;

    let summary = tally.summary(start.elapsed().as_secs_f64());
    log::info!(
        "match finished: A {} / B {} / draws {} in {:.1}s",
        summary.a_wins,
        summary.b_wins,
        summary.draws,
        summary.elapsed_secs
    );
    Ok(summary)
}

/// Give every engine its own seed, so seeded workers do not replay each
/// other's games.
fn worker_config(config: &SearchConfig, worker: usize, side: u64) -> SearchConfig {
    let mut config = config.clone();
    if let Some(seed) = config.seed {
        config.seed = Some(
            seed.wrapping_add((worker as u64) << 1 | side)
                .wrapping_mul(0x9E37_79B9_7F4A_7C15),
        );
    }
    config
}

fn play_game<G: Game>(
    game: &G,
    initial: &G::State,
    engine_a: &mut SearchEngine<G>,
    engine_b: &mut SearchEngine<G>,
    a_player: PlayerId,
    match_config: &MatchConfig,
) -> Result<(GameOutcome, u64), SearchError> {
    engine_a.initialize(game, a_player)?;
    engine_b.initialize(game, 3 - a_player)?;

    let mut state = initial.clone();
    let mut moves = 0u32;
    while !game.is_terminal(&state) && moves < match_config.max_moves {
        let engine = if game.mover(&state) == a_player {
            &mut *engine_a
        } else {
            &mut *engine_b
        };
        let mv = engine.select_move(game, &state, match_config.budget)?;
        state = game.apply(&state, &mv);
        moves += 1;
    }

    let outcome = if game.is_terminal(&state) {
        let utilities = game.utilities(&state);
        let a_utility = utilities.get(a_player).copied().unwrap_or(0.0);
        if a_utility > 0.0 {
            GameOutcome::A
        } else if a_utility < 0.0 {
            GameOutcome::B
        } else {
            GameOutcome::Draw
        }
    } else {
        log::debug!("game adjudicated as a draw after {moves} moves");
        GameOutcome::Draw
    };
    Ok((outcome, u64::from(moves)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::{Nim, TicTacToe};

    fn seeded(seed: u64) -> SearchConfig {
        SearchConfig {
            seed: Some(seed),
            ..SearchConfig::default()
        }
    }

    #[test]
    fn test_tally_counts_every_game() {
        let ttt = TicTacToe;
        let match_config = MatchConfig {
            games: 6,
            threads: 3,
            budget: Budget::iterations(30),
            max_moves: MAX_GAME_MOVES,
        };
        let summary =
            run_match(&ttt, &ttt.initial_state(), &seeded(1), &seeded(2), &match_config).unwrap();

        assert_eq!(summary.games, 6);
        assert_eq!(summary.a_wins + summary.b_wins + summary.draws, 6);
        assert!(summary.moves >= 6 * 5);
        assert!(summary.a_turns > 0 && summary.b_turns > 0);
        assert_eq!(summary.a_turns + summary.b_turns, summary.moves);
    }

    #[test]
    fn test_first_player_wins_solved_nim() {
        // With heaps [1, 2] and at most two stones per move the first player
        // always wins by leaving [1, 1]; colours alternate between games.
        let nim = Nim::new(vec![1, 2], 2);
        let config = SearchConfig {
            seed: Some(11),
            ..SearchConfig::solver()
        };
        let match_config = MatchConfig {
            games: 4,
            threads: 2,
            budget: Budget::iterations(2000),
            max_moves: MAX_GAME_MOVES,
        };
        let summary = run_match(&nim, &nim.initial_state(), &config, &config, &match_config).unwrap();

        assert_eq!(summary.a_wins, 2);
        assert_eq!(summary.b_wins, 2);
        assert_eq!(summary.draws, 0);
        assert_eq!(summary.a_score(), 0.5);
    }

    #[test]
    fn test_move_cap_scores_draw() {
        let nim = Nim::new(vec![5, 5], 2);
        let match_config = MatchConfig {
            games: 2,
            threads: 1,
            budget: Budget::iterations(10),
            max_moves: 1,
        };
        let summary =
            run_match(&nim, &nim.initial_state(), &seeded(3), &seeded(4), &match_config).unwrap();
        assert_eq!(summary.draws, 2);
        assert_eq!(summary.moves, 2);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let nim = Nim::new(vec![3], 2);
        let bad = SearchConfig {
            epsilon: 2.0,
            ..SearchConfig::default()
        };
        let result = run_match(
            &nim,
            &nim.initial_state(),
            &bad,
            &SearchConfig::default(),
            &MatchConfig::default(),
        );
        assert!(matches!(result, Err(SearchError::Config(_))));
    }

    /// Nim with a third player seat, for the player-count check.
    struct ThreeSeatNim(Nim);

    impl Game for ThreeSeatNim {
        type State = <Nim as Game>::State;
        type Move = <Nim as Game>::Move;

        fn num_players(&self) -> usize {
            3
        }

        fn legal_moves(&self, state: &Self::State) -> Vec<Self::Move> {
            self.0.legal_moves(state)
        }

        fn apply(&self, state: &Self::State, mv: &Self::Move) -> Self::State {
            self.0.apply(state, mv)
        }

        fn is_terminal(&self, state: &Self::State) -> bool {
            self.0.is_terminal(state)
        }

        fn mover(&self, state: &Self::State) -> PlayerId {
            self.0.mover(state)
        }

        fn utilities(&self, state: &Self::State) -> Vec<f64> {
            let mut utilities = self.0.utilities(state);
            utilities.push(0.0);
            utilities
        }
    }

    #[test]
    fn test_only_two_player_games() {
        let game = ThreeSeatNim(Nim::new(vec![3], 2));
        let result = run_match(
            &game,
            &game.0.initial_state(),
            &SearchConfig::default(),
            &SearchConfig::default(),
            &MatchConfig::default(),
        );
        assert!(matches!(
            result,
            Err(SearchError::PlayerCount {
                players: 3,
                expected: 2
            })
        ));
    }

    #[test]
    fn test_summary_toml() {
        let tally = MatchTally::default();
        tally.record(GameOutcome::A, 7);
        tally.record(GameOutcome::Draw, 9);
        let summary = tally.summary(1.5);
        let text = summary.to_toml().unwrap();
        assert!(text.contains("a_wins = 1"));
        assert!(text.contains("draws = 1"));
        assert_eq!(summary.a_score(), 0.75);
    }
}
