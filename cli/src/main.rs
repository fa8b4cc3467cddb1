//! `sam` - run the bucket-transfer demo or model-check it.
//!
//! ```text
//! sam replay              # six-step solution, one render per step
//! sam check --depth 6     # exhaustive search for the goal and for overflows
//! ```
//!
//! Configuration comes from `~/.sam/config.toml` (or `--config <path>`).
//! Logs go to stderr; `RUST_LOG` wins over the config's `log.filter`.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use sam::puzzle::{Jugs, Puzzle, SOLUTION};
use sam_config::{EngineConfig, SamConfig};
use sam_engine::Model;

const DEFAULT_INSTANCE_NAME: &str = "dieharder";

#[derive(Parser)]
#[command(name = "sam")]
#[command(about = "Reactive state engine demo and trace checker")]
struct Cli {
    /// Config file to use instead of ~/.sam/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the known solution and print each render
    Replay,
    /// Search every action sequence for the goal and for overflows
    Check {
        /// Exact length of the explored sequences
        #[arg(long)]
        depth: Option<usize>,
        /// Let an action follow itself
        #[arg(long)]
        allow_repeats: bool,
        /// Number of findings of each kind to print
        #[arg(long, default_value_t = 3)]
        show: usize,
    },
}

fn init_tracing(config_filter: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config_filter.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<SamConfig> {
    let loaded = match path {
        Some(path) => SamConfig::load_from(path)?,
        None => SamConfig::load()?,
    };
    Ok(loaded.unwrap_or_default())
}

fn engine_config(config: &SamConfig) -> EngineConfig {
    config
        .engine
        .clone()
        .unwrap_or_else(|| EngineConfig::named(DEFAULT_INSTANCE_NAME).synchronous())
}

fn print_render(model: &Model<Jugs>) {
    let contents: Vec<String> = model.jugs.iter().map(u32::to_string).collect();
    println!("Goal: {} [{}]", model.goal, contents.join(", "));
    if model.goal_reached() {
        println!("Goal reached!!!");
    }
}

async fn replay(config: &SamConfig) -> Result<()> {
    let puzzle = Puzzle::new(engine_config(config)).context("failed to build puzzle engine")?;
    puzzle.engine.set_render(print_render);
    for pour in SOLUTION {
        puzzle.invoke(pour);
    }
    puzzle.engine.settle().await;

    let status = puzzle.engine.status();
    if let Some(message) = status.error_message {
        anyhow::bail!("replay ended with an error: {message}");
    }
    println!("\n{}", puzzle.engine.trace());
    Ok(())
}

fn check(config: &SamConfig, depth: Option<usize>, allow_repeats: bool, show: usize) -> Result<()> {
    let puzzle = Puzzle::new(engine_config(config)).context("failed to build puzzle engine")?;

    let mut options = config
        .checker
        .clone()
        .map_or_else(Puzzle::check_options, Into::into);
    if let Some(depth) = depth {
        options.depth_max = depth;
    }
    if allow_repeats {
        options.no_duplicate_action = false;
    }

    let mut checker = puzzle.checker(options);
    let replays = checker.search_space()?;
    tracing::info!(replays, "Checking bucket puzzle");
    let report = checker.run()?;

    let liveness: Vec<_> = report.liveness().collect();
    let safety: Vec<_> = report.safety().collect();
    println!(
        "{} replays, {} reach the goal, {} overflow",
        report.replays,
        liveness.len(),
        safety.len()
    );
    for trace in liveness.iter().take(show) {
        println!("\nGoal reached by:\n{trace}");
    }
    for trace in safety.iter().take(show) {
        println!("\nOverflow after:\n{trace}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(config.log_filter());
    if let Some(path) = cli.config.clone().or_else(SamConfig::path) {
        tracing::debug!(path = %path.display(), "Config location");
    }

    match cli.command {
        Commands::Replay => replay(&config).await,
        Commands::Check {
            depth,
            allow_repeats,
            show,
        } => check(&config, depth, allow_repeats, show),
    }
}
