//! PN-MCTS command line.
//!
//! ## Usage
//!
//! - `pnmcts-rust` - Show a demo
//! - `pnmcts-rust demo --game tictactoe` - Play one game against itself, move by move
//! - `pnmcts-rust selfplay --games 20 --threads 4` - Run a match between two configurations

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use pnmcts_rust::config::SearchConfig;
use pnmcts_rust::constants::MAX_GAME_MOVES;
use pnmcts_rust::game::{game_result, Game, GameResult};
use pnmcts_rust::games::{Nim, TicTacToe};
use pnmcts_rust::mcts::{Budget, SearchEngine};
use pnmcts_rust::ngram::Side;
use pnmcts_rust::selfplay::{run_match, MatchConfig};

/// PN-MCTS: proof-number guided Monte Carlo Tree Search
#[derive(Parser)]
#[command(name = "pnmcts-rust")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Search configuration (TOML) for the engine, or for side A of a match
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum GameKind {
    Nim,
    Tictactoe,
}

#[derive(Subcommand)]
enum Commands {
    /// Let the engine play one game against itself and show each decision
    Demo {
        #[arg(long, value_enum, default_value_t = GameKind::Tictactoe)]
        game: GameKind,
        /// Iterations per move (negative for no limit)
        #[arg(long, default_value_t = 2000, allow_negative_numbers = true)]
        iterations: i64,
        /// Seconds per move (0 for no limit)
        #[arg(long, default_value_t = 0.0)]
        seconds: f64,
    },
    /// Play a match between two configurations
    Selfplay {
        #[arg(long, value_enum, default_value_t = GameKind::Tictactoe)]
        game: GameKind,
        #[arg(long, default_value_t = 10)]
        games: u32,
        #[arg(long, default_value_t = 1)]
        threads: usize,
        /// Iterations per move (negative for no limit)
        #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
        iterations: i64,
        /// Seconds per move (0 for no limit)
        #[arg(long, default_value_t = 0.0)]
        seconds: f64,
        /// Moves after which a game is scored as a draw
        #[arg(long, default_value_t = MAX_GAME_MOVES)]
        max_moves: u32,
        /// Configuration (TOML) of side B; defaults to the built-in defaults
        #[arg(long)]
        opponent: Option<PathBuf>,
        /// Write the match summary to this file as TOML
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Demo {
            game,
            iterations,
            seconds,
        }) => run_demo(game, config, budget(seconds, iterations)?),
        Some(Commands::Selfplay {
            game,
            games,
            threads,
            iterations,
            seconds,
            max_moves,
            opponent,
            output,
        }) => {
            let opponent = load_config(opponent.as_deref())?;
            let match_config = MatchConfig {
                games,
                threads,
                budget: budget(seconds, iterations)?,
                max_moves,
            };
            run_selfplay(game, &config, &opponent, &match_config, output.as_deref())
        }
        None => run_demo(GameKind::Tictactoe, config, Budget::iterations(2000)),
    }
}

fn init_logging(debug: bool) {
    let log_level = if debug { "debug" } else { "info" };
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, log_level),
    );
    builder
        .format(|buf, record| {
            writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args())
        })
        .target(env_logger::Target::Stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<SearchConfig> {
    match path {
        Some(path) => SearchConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display())),
        None => Ok(SearchConfig::default()),
    }
}

fn budget(seconds: f64, iterations: i64) -> Result<Budget> {
    let budget = Budget::from_limits(seconds, iterations, -1);
    if budget.time.is_none() && budget.iterations.is_none() {
        bail!("either --seconds or --iterations must set a limit");
    }
    Ok(budget)
}

fn run_demo(kind: GameKind, config: SearchConfig, budget: Budget) -> Result<()> {
    match kind {
        GameKind::Nim => {
            let nim = Nim::new(vec![3, 4, 5], 3);
            demo_game(&nim, nim.initial_state(), config, budget)
        }
        GameKind::Tictactoe => demo_game(&TicTacToe, TicTacToe.initial_state(), config, budget),
    }
}

/// One engine per player, playing a full game.
fn demo_game<G>(game: &G, mut state: G::State, config: SearchConfig, budget: Budget) -> Result<()>
where
    G: Game,
    G::State: std::fmt::Display,
    G::Move: std::fmt::Display,
{
    println!("PN-MCTS demo\n");
    println!("{state}\n");

    let players = game.num_players();
    let mut engines = Vec::with_capacity(players);
    for player in 1..=players {
        let mut engine = SearchEngine::new(config.clone()).context("invalid search configuration")?;
        engine.initialize(game, player)?;
        engines.push(engine);
    }

    let mut moves = 0;
    while !game.is_terminal(&state) && moves < MAX_GAME_MOVES {
        let player = game.mover(&state);
        let engine = &mut engines[player - 1];
        let report = engine.search(game, &state, budget)?;

        println!(
            "Player {player} plays {} ({} iterations, {:.1} ms, pn={} dn={})",
            report.best_move,
            report.iterations,
            report.elapsed.as_secs_f64() * 1000.0,
            report.root_proof,
            report.root_disproof,
        );
        for child in &report.children {
            println!(
                "    {:<20} visits {:>6}  score {:>6.3}  pn {:>4}  dn {:>4}  rank {}",
                child.mv.to_string(),
                child.visits,
                child.mean_score,
                child.proof,
                child.disproof,
                child.rank,
            );
        }

        state = game.apply(&state, &report.best_move);
        moves += 1;
        println!("\n{state}\n");
    }

    match game_result(game, &state) {
        GameResult::Win(winner) => println!("Player {winner} wins after {moves} moves"),
        GameResult::Draw => println!("Draw after {moves} moves"),
        GameResult::Unfinished => println!("Adjudicated draw: no result after {moves} moves"),
    }

    for (player, engine) in engines.iter().enumerate() {
        let counters = engine.counters();
        println!(
            "\nPlayer {}: {} simulations over {} turns, {} grams added",
            player + 1,
            counters.simulations,
            counters.turns,
            counters.ngram_additions
        );
        for (key, stats) in engine.statistics().top_grams(Side::Own, 3) {
            let names: Vec<String> = key.moves().iter().map(|m| m.to_string()).collect();
            println!(
                "    [{}] visits {} score {:.3}",
                names.join(", "),
                stats.visits,
                stats.score
            );
        }
    }
    Ok(())
}

fn run_selfplay(
    kind: GameKind,
    config_a: &SearchConfig,
    config_b: &SearchConfig,
    match_config: &MatchConfig,
    output: Option<&Path>,
) -> Result<()> {
    let summary = match kind {
        GameKind::Nim => {
            let nim = Nim::new(vec![3, 4, 5], 3);
            run_match(&nim, &nim.initial_state(), config_a, config_b, match_config)?
        }
        GameKind::Tictactoe => run_match(
            &TicTacToe,
            &TicTacToe.initial_state(),
            config_a,
            config_b,
            match_config,
        )?,
    };

    println!(
        "A: {} wins, B: {} wins, {} draws ({:.1}% for A) in {:.1}s",
        summary.a_wins,
        summary.b_wins,
        summary.draws,
        summary.a_score() * 100.0,
        summary.elapsed_secs
    );

    if let Some(path) = output {
        let text = summary.to_toml().context("failed to serialize match summary")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}
