//! Guided Monte Carlo playouts.
//!
//! A playout plays a game from a leaf position to its end. At each step the
//! mover picks, with probability epsilon, a uniformly random legal move, and
//! otherwise the legal move with the highest aggregate score in its side's
//! N-gram statistics. Moves without statistics score
//! [`new_move_score`](crate::config::SearchConfig::new_move_score), so every
//! move gets tried at least once.
//!
//! Every move played is recorded with its player; the record feeds the
//! N-gram update and the RAVE bookkeeping.

use std::fmt::Debug;
use std::hash::Hash;

use crate::config::SearchConfig;
use crate::game::{draw_utilities, Game, PlayerId};
use crate::ngram::{MoveRecord, NGramStats, Side};

/// Outcome of one playout.
#[derive(Debug, Clone)]
pub struct PlayoutResult<M> {
    /// Moves in the order they were played.
    pub history: Vec<MoveRecord<M>>,
    /// Final utilities, indexed by player.
    pub utilities: Vec<f64>,
    /// The playout stopped before the game ended (move cap or dead end)
    /// and was scored as a draw.
    pub truncated: bool,
}

/// Pick a playout move for `side` among `legal`.
///
/// Ties between equally scored moves go to the first one found.
pub fn select_playout_move<'a, M>(
    legal: &'a [M],
    side: Side,
    stats: &NGramStats<M>,
    config: &SearchConfig,
    rng: &mut fastrand::Rng,
) -> Option<&'a M>
where
    M: Clone + Eq + Hash + Debug,
{
    if legal.is_empty() {
        return None;
    }
    if rng.f64() < config.epsilon {
        return Some(&legal[rng.usize(..legal.len())]);
    }

    let mut best = None;
    let mut best_score = f64::NEG_INFINITY;
    for mv in legal {
        let score = stats
            .move_score(side, mv)
            .unwrap_or(config.new_move_score);
        if score > best_score {
            best_score = score;
            best = Some(mv);
        }
    }

    best.or_else(|| Some(&legal[rng.usize(..legal.len())]))
}

/// Play `state` out to the end.
///
/// `own` is the player the engine searches for; with
/// `opponent_plays_randomly` every other player moves uniformly at random.
pub fn guided_playout<G: Game>(
    game: &G,
    state: &G::State,
    stats: &NGramStats<G::Move>,
    config: &SearchConfig,
    own: PlayerId,
    rng: &mut fastrand::Rng,
) -> PlayoutResult<G::Move> {
    let mut state = state.clone();
    let mut history = Vec::new();

    while !game.is_terminal(&state) && history.len() < config.max_playout_moves {
        let mover = game.mover(&state);
        let legal = game.legal_moves(&state);
        if legal.is_empty() {
            break;
        }

        let side = Side::of(mover, own);
        let mv = if side == Side::Opponent && config.opponent_plays_randomly {
            &legal[rng.usize(..legal.len())]
        } else {
            match select_playout_move(&legal, side, stats, config, rng) {
                Some(mv) => mv,
                None => break,
            }
        };

        state = game.apply(&state, mv);
        history.push(MoveRecord::new(mv.clone(), mover));
    }

    if game.is_terminal(&state) {
        PlayoutResult {
            history,
            utilities: game.utilities(&state),
            truncated: false,
        }
    } else {
        log::trace!("playout stopped after {} moves without a result", history.len());
        PlayoutResult {
            history,
            utilities: draw_utilities(game.num_players()),
            truncated: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecayConfig;
    use crate::games::Nim;

    fn greedy() -> SearchConfig {
        SearchConfig {
            epsilon: 0.0,
            ..SearchConfig::default()
        }
    }

    #[test]
    fn test_unseen_moves_are_tried_first() {
        let mut stats = NGramStats::new(1, 7, DecayConfig::default());
        stats.update(&[MoveRecord::new("a", 1)], &[0.0, 1.0, -1.0], 1);
        let mut rng = fastrand::Rng::with_seed(3);

        // "a" scores 1.0, "b" is unseen and scores 100.
        let pick = select_playout_move(&["a", "b"], Side::Own, &stats, &greedy(), &mut rng);
        assert_eq!(pick, Some(&"b"));
    }

    #[test]
    fn test_best_scored_move_wins() {
        let mut stats = NGramStats::new(1, 7, DecayConfig::default());
        stats.update(
            &[MoveRecord::new("good", 1), MoveRecord::new("reply", 2)],
            &[0.0, 1.0, -1.0],
            1,
        );
        stats.update(&[MoveRecord::new("bad", 1)], &[0.0, -1.0, 1.0], 1);
        let mut rng = fastrand::Rng::with_seed(3);

        let pick = select_playout_move(&["bad", "good"], Side::Own, &stats, &greedy(), &mut rng);
        assert_eq!(pick, Some(&"good"));

        // Ties go to the first move listed.
        let pick = select_playout_move(&["x", "y"], Side::Own, &stats, &greedy(), &mut rng);
        assert_eq!(pick, Some(&"x"));
    }

    #[test]
    fn test_full_exploration_is_uniform() {
        let stats = NGramStats::new(1, 7, DecayConfig::default());
        let config = SearchConfig {
            epsilon: 1.0,
            ..SearchConfig::default()
        };
        let mut rng = fastrand::Rng::with_seed(5);
        let moves = ["a", "b", "c", "d"];
        let mut counts = [0u32; 4];
        for _ in 0..4000 {
            let pick = select_playout_move(&moves, Side::Own, &stats, &config, &mut rng).unwrap();
            let index = moves.iter().position(|m| m == pick).unwrap();
            counts[index] += 1;
        }
        for count in counts {
            assert!((800..1200).contains(&count), "counts {counts:?}");
        }
    }

    #[test]
    fn test_empty_legal_moves() {
        let stats: NGramStats<&str> = NGramStats::new(1, 7, DecayConfig::default());
        let mut rng = fastrand::Rng::new();
        assert_eq!(select_playout_move(&[], Side::Own, &stats, &greedy(), &mut rng), None);
    }

    #[test]
    fn test_random_opponent_ignores_statistics() {
        use crate::games::{TicTacToe, TicTacToeMove};

        let ttt = TicTacToe;
        // Player 1 has taken the last cell; player 2 opens the playout.
        let state = ttt.apply(&ttt.initial_state(), &TicTacToeMove(8));
        let mut stats = NGramStats::new(1, 7, DecayConfig::default());
        for cell in 0..8 {
            let utility = if cell == 0 { 1.0 } else { -1.0 };
            stats.update(&[MoveRecord::new(TicTacToeMove(cell), 2)], &[0.0, -utility, utility], 1);
        }
        assert_eq!(stats.move_score(Side::Opponent, &TicTacToeMove(0)), Some(1.0));

        let mut rng = fastrand::Rng::with_seed(13);
        let first_replies = |config: &SearchConfig, rng: &mut fastrand::Rng| {
            let mut counts = [0u32; 9];
            for _ in 0..400 {
                let result = guided_playout(&ttt, &state, &stats, config, 1, rng);
                assert_eq!(result.history[0].player, 2);
                counts[result.history[0].mv.0 as usize] += 1;
            }
            counts
        };

        // Greedy: player 2 always follows its statistics.
        let counts = first_replies(&greedy(), &mut rng);
        assert_eq!(counts[0], 400);

        // Random opponent: the replies spread over all free cells.
        let random = SearchConfig {
            opponent_plays_randomly: true,
            ..greedy()
        };
        let counts = first_replies(&random, &mut rng);
        assert!(counts[0] < 100, "counts {counts:?}");
        assert_eq!(counts[8], 0);
        assert!(counts[..8].iter().all(|&c| c > 0), "counts {counts:?}");
    }

    #[test]
    fn test_playout_reaches_terminal() {
        let nim = Nim::new(vec![3, 4, 5], 3);
        let stats = NGramStats::new(2, 7, DecayConfig::default());
        let mut rng = fastrand::Rng::with_seed(9);
        let result = guided_playout(&nim, &nim.initial_state(), &stats, &SearchConfig::default(), 1, &mut rng);

        assert!(!result.truncated);
        assert!(!result.history.is_empty());
        // Players alternate, starting with player 1.
        for (i, record) in result.history.iter().enumerate() {
            assert_eq!(record.player, 1 + i % 2);
        }
        // Whoever took the last stone won.
        let winner = result.history.last().unwrap().player;
        assert_eq!(result.utilities[winner], 1.0);
        assert_eq!(result.utilities[3 - winner], -1.0);
    }

    #[test]
    fn test_playout_cap_scores_draw() {
        let nim = Nim::new(vec![50], 1);
        let stats = NGramStats::new(1, 7, DecayConfig::default());
        let config = SearchConfig {
            max_playout_moves: 10,
            ..SearchConfig::default()
        };
        let mut rng = fastrand::Rng::with_seed(1);
        let result = guided_playout(&nim, &nim.initial_state(), &stats, &config, 1, &mut rng);

        assert!(result.truncated);
        assert_eq!(result.history.len(), 10);
        assert_eq!(result.utilities, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_terminal_start_plays_nothing() {
        let nim = Nim::new(vec![0], 1);
        let stats = NGramStats::new(1, 7, DecayConfig::default());
        let mut rng = fastrand::Rng::with_seed(1);
        let result = guided_playout(&nim, &nim.initial_state(), &stats, &SearchConfig::default(), 1, &mut rng);
        assert!(result.history.is_empty());
        assert!(!result.truncated);
    }
}
