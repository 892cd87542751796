use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tsmigrate::commands::{checkpoint, measurements, plan, recover, run};
use tsmigrate::config::{Config, DEFAULT_CONFIG_FILE};
use tsmigrate::logging;

#[derive(Parser)]
#[command(name = "tsmigrate")]
#[command(about = "Resumable windowed migration from InfluxDB 1.x to 2.x", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay pending checkpoints, then migrate new data
    Run {
        /// Measurement to migrate (repeatable; default: all selected in config)
        #[arg(short, long = "measurement")]
        measurements: Vec<String>,

        /// Windows transferred in parallel (default: migration.concurrency)
        #[arg(short = 'p', long)]
        concurrency: Option<usize>,

        /// Do not replay checkpointed windows first
        #[arg(long)]
        skip_recovery: bool,
    },

    /// Replay checkpointed windows only
    Recover,

    /// Show the range and windows a run would migrate
    Plan {
        /// Measurement to plan
        measurement: String,
    },

    /// List measurements in the source database
    Measurements,

    /// Inspect the checkpoint file
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
}

#[derive(Subcommand)]
enum CheckpointCommands {
    /// List pending windows
    List,

    /// Drop the most recently recorded window
    Pop,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let _log_guard = logging::init(config.logging.directory.as_deref())?;

    match cli.command {
        Commands::Run {
            measurements,
            concurrency,
            skip_recovery,
        } => run::execute(&config, measurements, concurrency, skip_recovery),
        Commands::Recover => recover::execute(&config),
        Commands::Plan { measurement } => plan::execute(&config, measurement),
        Commands::Measurements => measurements::execute(&config),
        Commands::Checkpoint { command } => match command {
            CheckpointCommands::List => checkpoint::list(&config),
            CheckpointCommands::Pop => checkpoint::pop(&config),
        },
    }
}
