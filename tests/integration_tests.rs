//! Integration tests for pnmcts-rust, driven through the public API only.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use pnmcts_rust::config::SearchConfig;
use pnmcts_rust::error::SearchError;
use pnmcts_rust::game::{Game, PlayerId};
use pnmcts_rust::games::{Nim, TicTacToe};
use pnmcts_rust::mcts::{Budget, SearchEngine};
use pnmcts_rust::selfplay::{run_match, MatchConfig};

// =============================================================================
// A game given as an explicit tree
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct Position {
    name: &'static str,
    mover: PlayerId,
}

/// Nodes are named; edges are `(from, move, to)`. Nodes listed in `outcomes`
/// are terminal, every other node is not, even if it has no edges.
struct ExplicitTree {
    edges: Vec<(&'static str, &'static str, &'static str)>,
    outcomes: Vec<(&'static str, [f64; 3])>,
    stochastic: bool,
}

const P1_WINS: [f64; 3] = [0.0, 1.0, -1.0];
const P2_WINS: [f64; 3] = [0.0, -1.0, 1.0];
const DRAW: [f64; 3] = [0.0, 0.0, 0.0];

impl ExplicitTree {
    fn root(&self) -> Position {
        Position {
            name: "root",
            mover: 1,
        }
    }

    fn outcome(&self, name: &str) -> Option<[f64; 3]> {
        self.outcomes
            .iter()
            .find(|(node, _)| *node == name)
            .map(|&(_, outcome)| outcome)
    }
}

impl Game for ExplicitTree {
    type State = Position;
    type Move = &'static str;

    fn num_players(&self) -> usize {
        2
    }

    fn is_stochastic(&self) -> bool {
        self.stochastic
    }

    fn legal_moves(&self, state: &Position) -> Vec<&'static str> {
        self.edges
            .iter()
            .filter(|(from, _, _)| *from == state.name)
            .map(|&(_, mv, _)| mv)
            .collect()
    }

    fn apply(&self, state: &Position, mv: &&'static str) -> Position {
        let name = self
            .edges
            .iter()
            .find(|(from, m, _)| *from == state.name && m == mv)
            .map_or(state.name, |&(_, _, to)| to);
        Position {
            name,
            mover: 3 - state.mover,
        }
    }

    fn is_terminal(&self, state: &Position) -> bool {
        self.outcome(state.name).is_some()
    }

    fn mover(&self, state: &Position) -> PlayerId {
        state.mover
    }

    fn utilities(&self, state: &Position) -> Vec<f64> {
        self.outcome(state.name).unwrap_or(DRAW).to_vec()
    }
}

/// Player 1 wins by force only through "a": the reply to it is forced and
/// ends the game. "b" wins most replies, "c" never wins.
fn two_ply_win() -> ExplicitTree {
    ExplicitTree {
        edges: vec![
            ("root", "a", "A"),
            ("root", "b", "B"),
            ("root", "c", "C"),
            ("A", "a1", "A1"),
            ("B", "b1", "B1"),
            ("B", "b2", "B2"),
            ("B", "b3", "B3"),
            ("B", "b4", "B4"),
            ("C", "c1", "C1"),
            ("C", "c2", "C2"),
            ("C1", "c11", "C11"),
        ],
        outcomes: vec![
            ("A1", P1_WINS),
            ("B1", P1_WINS),
            ("B2", P1_WINS),
            ("B3", P1_WINS),
            ("B4", P2_WINS),
            ("C2", P2_WINS),
            ("C11", DRAW),
        ],
        stochastic: false,
    }
}

fn seeded(seed: u64) -> SearchConfig {
    SearchConfig {
        seed: Some(seed),
        ..SearchConfig::default()
    }
}

fn ready_engine<G: Game>(game: &G, player: PlayerId, config: SearchConfig) -> SearchEngine<G> {
    let mut engine = SearchEngine::new(config).unwrap();
    engine.initialize(game, player).unwrap();
    engine
}

// =============================================================================
// End-to-end proofs
// =============================================================================

#[test]
fn test_two_ply_win_is_found_and_proven() {
    let game = two_ply_win();
    let config = SearchConfig {
        trust_proven_lines: true,
        ..seeded(21)
    };
    let mut engine = ready_engine(&game, 1, config);
    let report = engine.search(&game, &game.root(), Budget::iterations(1000)).unwrap();

    assert_eq!(report.best_move, "a");
    assert!(report.is_proven_win());
    let a = report.children.iter().find(|c| c.mv == "a").unwrap();
    assert_eq!(a.proof, 0.0);
    assert_eq!(a.rank, 1);
}

#[test]
fn test_proven_line_found_for_every_seed() {
    let game = two_ply_win();
    for seed in 0..20 {
        let config = SearchConfig {
            trust_proven_lines: true,
            ..seeded(seed)
        };
        let mut engine = ready_engine(&game, 1, config);
        let mv = engine
            .select_move(&game, &game.root(), Budget::iterations(300))
            .unwrap();
        assert_eq!(mv, "a", "seed {seed}");
    }
}

#[test]
fn test_defending_side_sees_disproof() {
    // Searching as player 2 from the root: player 1 moves first and can
    // force a win, so the root cannot be a win for player 2.
    let game = two_ply_win();
    let mut engine = ready_engine(&game, 2, seeded(5));
    let report = engine.search(&game, &game.root(), Budget::iterations(1000)).unwrap();
    assert!(report.is_proven_loss());
    assert!(!report.is_proven_win());
}

#[test]
fn test_solves_tictactoe_win_in_one() {
    use pnmcts_rust::games::TicTacToeMove;

    // X . X / O O . / . . .  with X to move: cell 1 wins at once.
    let ttt = TicTacToe;
    let state = [0u8, 3, 2, 4]
        .iter()
        .fold(ttt.initial_state(), |state, &cell| ttt.apply(&state, &TicTacToeMove(cell)));
    let mut engine = ready_engine(&ttt, 1, SearchConfig { seed: Some(8), ..SearchConfig::solver() });
    let report = engine.search(&ttt, &state, Budget::iterations(2000)).unwrap();
    assert_eq!(report.best_move, TicTacToeMove(1));
    assert!(report.is_proven_win());
}

// =============================================================================
// Error and edge cases
// =============================================================================

#[test]
fn test_stochastic_game_is_rejected() {
    let game = ExplicitTree {
        stochastic: true,
        ..two_ply_win()
    };
    let mut engine = SearchEngine::new(SearchConfig::default()).unwrap();
    let result = engine.initialize(&game, 1);
    assert!(matches!(
        result,
        Err(SearchError::UnsupportedGame {
            stochastic: true,
            alternating: true
        })
    ));
}

#[test]
fn test_invalid_player_is_rejected() {
    let nim = Nim::new(vec![3], 2);
    let mut engine: SearchEngine<Nim> = SearchEngine::new(SearchConfig::default()).unwrap();
    assert!(matches!(
        engine.initialize(&nim, 0),
        Err(SearchError::InvalidPlayer { player: 0, players: 2 })
    ));
    assert!(matches!(
        engine.initialize(&nim, 3),
        Err(SearchError::InvalidPlayer { player: 3, players: 2 })
    ));
}

#[test]
fn test_search_requires_initialize() {
    let nim = Nim::new(vec![3], 2);
    let mut engine = SearchEngine::new(SearchConfig::default()).unwrap();
    let result = engine.select_move(&nim, &nim.initial_state(), Budget::iterations(10));
    assert!(matches!(result, Err(SearchError::NotInitialized)));

    engine.initialize(&nim, 1).unwrap();
    assert!(engine.select_move(&nim, &nim.initial_state(), Budget::iterations(10)).is_ok());

    engine.shutdown();
    let result = engine.select_move(&nim, &nim.initial_state(), Budget::iterations(10));
    assert!(matches!(result, Err(SearchError::NotInitialized)));
}

#[test]
fn test_terminal_and_dead_roots() {
    let nim = Nim::new(vec![0, 0], 2);
    let mut engine = ready_engine(&nim, 1, seeded(1));
    let result = engine.search(&nim, &nim.initial_state(), Budget::iterations(10));
    assert!(matches!(result, Err(SearchError::TerminalPosition)));

    let game = ExplicitTree {
        edges: Vec::new(),
        outcomes: Vec::new(),
        stochastic: false,
    };
    let mut engine = ready_engine(&game, 1, seeded(1));
    let result = engine.search(&game, &game.root(), Budget::iterations(10));
    assert!(matches!(result, Err(SearchError::NoLegalMoves)));
}

#[test]
fn test_malformed_child_scores_as_draw() {
    // "m" leads to a state that is not terminal but has no moves.
    let game = ExplicitTree {
        edges: vec![("root", "m", "M"), ("root", "w", "W")],
        outcomes: vec![("W", P2_WINS)],
        stochastic: false,
    };
    let mut engine = ready_engine(&game, 1, seeded(2));
    let report = engine.search(&game, &game.root(), Budget::iterations(100)).unwrap();

    let m = report.children.iter().find(|c| c.mv == "m").unwrap();
    assert_eq!(m.mean_score, 0.0);
    assert_eq!(m.disproof, 0.0);
    assert_eq!(report.best_move, "m");
    assert!(report.is_proven_loss());
}

#[test]
fn test_zero_budget_plays_random_legal_move() {
    let nim = Nim::new(vec![4, 4], 3);
    let mut engine = ready_engine(&nim, 1, seeded(3));
    let legal = nim.legal_moves(&nim.initial_state());
    let report = engine
        .search(&nim, &nim.initial_state(), Budget::iterations(0))
        .unwrap();
    assert_eq!(report.iterations, 0);
    assert!(report.children.is_empty());
    assert!(legal.contains(&report.best_move));
}

#[test]
fn test_from_limits_budget() {
    let budget = Budget::from_limits(0.0, 25, -1);
    assert_eq!(budget, Budget::iterations(25));

    let nim = Nim::new(vec![3, 4, 5], 3);
    let mut engine = ready_engine(&nim, 1, seeded(4));
    let report = engine.search(&nim, &nim.initial_state(), budget).unwrap();
    assert_eq!(report.iterations, 25);
}

// =============================================================================
// Search invariants
// =============================================================================

#[test]
fn test_root_visits_match_iterations() {
    let nim = Nim::new(vec![3, 4, 5], 3);
    for rave in [false, true] {
        let config = SearchConfig {
            rave,
            ngram_length: 2,
            ..seeded(17)
        };
        let mut engine = ready_engine(&nim, 1, config);
        let report = engine
            .search(&nim, &nim.initial_state(), Budget::iterations(500))
            .unwrap();
        let child_visits: u32 = report.children.iter().map(|c| c.visits).sum();
        assert_eq!(report.iterations, 500);
        assert_eq!(report.aborted_iterations, 0);
        assert_eq!(report.root_visits, 500);
        assert_eq!(child_visits, 500);
    }
}

#[test]
fn test_seeded_search_is_reproducible() {
    let ttt = TicTacToe;
    let run = || {
        let mut engine = ready_engine(&ttt, 1, seeded(99));
        let report = engine
            .search(&ttt, &ttt.initial_state(), Budget::iterations(300))
            .unwrap();
        let visits: Vec<u32> = report.children.iter().map(|c| c.visits).collect();
        (report.best_move, visits)
    };
    assert_eq!(run(), run());
}

#[test]
fn test_stop_handle_from_another_thread() {
    let ttt = TicTacToe;
    let mut engine = ready_engine(&ttt, 1, seeded(7));
    let stop = engine.stop_handle();

    let start = Instant::now();
    let report = thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            stop.store(true, Ordering::Relaxed);
        });
        engine.search(&ttt, &ttt.initial_state(), Budget::time(Duration::from_secs(60)))
    })
    .unwrap();

    assert!(start.elapsed() < Duration::from_secs(30));
    assert!(report.iterations > 0);
}

#[test]
fn test_config_from_toml() {
    let config = SearchConfig::from_toml_str(
        r#"
        ngram_length = 2
        trust_proven_lines = true
        seed = 42

        [decay]
        per_turn = 0.5
        "#,
    )
    .unwrap();
    assert_eq!(config.ngram_length, 2);
    assert_eq!(config.decay.per_turn, Some(0.5));

    let nim = Nim::new(vec![2, 3], 3);
    let mut engine = ready_engine(&nim, 1, config);
    assert!(engine.select_move(&nim, &nim.initial_state(), Budget::iterations(50)).is_ok());
}

#[test]
fn test_selfplay_match_through_public_api() {
    let nim = Nim::new(vec![2, 2], 2);
    let match_config = MatchConfig {
        games: 4,
        threads: 2,
        budget: Budget::iterations(50),
        max_moves: 100,
    };
    let summary = run_match(&nim, &nim.initial_state(), &seeded(1), &seeded(2), &match_config).unwrap();
    assert_eq!(summary.games, 4);
    // Nim always ends with a winner.
    assert_eq!(summary.draws, 0);
    assert_eq!(summary.a_wins + summary.b_wins, 4);
}
