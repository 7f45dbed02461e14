mod commands;
mod logging;
mod signal;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "eltflow",
    version,
    about = "Readiness-gated extract/load pipeline runner"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline: gate on readiness, then extract and load
    Run {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
    /// Validate a pipeline file and probe each dependency once
    Check {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { pipeline } => commands::run::execute(&pipeline).await,
        Commands::Check { pipeline } => commands::check::execute(&pipeline).await,
    }
}
