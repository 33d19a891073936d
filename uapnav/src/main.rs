use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uapnav::ExperimentConfig;

/// Universal adversarial perturbations against pointgoal navigation
/// policies.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the experiment configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dotted-path configuration overrides, e.g. `attack.eta=0.2`.
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Trains the navigation policy with PPO.
    Train,

    /// Optimizes a perturbation and evaluates the policy under it.
    Eval {
        /// Directory holding the trained policy parameters.
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ExperimentConfig::load(path)?,
        None => ExperimentConfig::default(),
    };
    let config = config.with_overrides(&args.overrides)?;

    match args.command {
        Command::Train => uapnav::train(&config),
        Command::Eval { checkpoint } => {
            uapnav::evaluate(&config, checkpoint.as_deref())?;
            Ok(())
        }
    }
}
