//! luabridge CLI
//!
//! Runs and syntax-checks Lua scripts inside a bridged VM, under the same
//! step and time limits an embedding host would apply.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "luabridge")]
#[command(about = "Run Lua scripts under host-enforced limits", long_about = None)]
#[command(version)]
struct Cli {
    /// Colored output: auto, always or never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Lua file and print what it returns
    Run {
        /// Input file
        file: PathBuf,
        /// Step budget (0 = unlimited)
        #[arg(long)]
        steps: Option<u64>,
        /// Wall-clock budget in milliseconds (0 = none)
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Bridge config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Enable map_set / map_get / map_has and print the map afterwards
        #[arg(long)]
        map: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that Lua files compile
    Check {
        /// Files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,luabridge_engine=info,luabridge=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            steps,
            timeout_ms,
            config,
            map,
            json,
        } => commands::run::execute(commands::run::RunArgs {
            file,
            steps,
            timeout_ms,
            config,
            map,
            json,
            color: cli.color,
        }),

        Commands::Check { files } => commands::check::execute(files, cli.color.as_deref()),
    }
}
