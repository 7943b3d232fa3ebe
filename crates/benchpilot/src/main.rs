//! BenchPilot - LLM-driven measurement assistant

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{init_command, measure_command, setup_command, status_command, tools_command};

/// BenchPilot - talk to your oscilloscope, signal generator and power supply
#[derive(Parser)]
#[command(name = "benchpilot")]
#[command(about = "◆ LLM-driven measurement assistant for the electronics bench")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and bench workspace
    Init,
    /// Interactive setup wizard
    Setup,
    /// Run a measurement request (interactive when no message is given)
    Measure {
        /// Measurement request, e.g. "measure the slew rate of this op-amp"
        #[arg(short, long)]
        message: Option<String>,
        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
    /// List the bench tools and their parameters
    Tools,
    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if matches!(cli.command, Commands::Measure { verbose: true, .. }) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Init => init_command().await,
        Commands::Setup => setup_command().await,
        Commands::Measure { message, .. } => measure_command(message).await,
        Commands::Tools => tools_command(),
        Commands::Status => status_command().await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
