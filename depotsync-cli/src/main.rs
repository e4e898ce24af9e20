//! DepotSync CLI - mirror selected depot files from a chunked content server.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::patterns::PatternsArgs;
use commands::sync::SyncArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "depotsync")]
#[command(about = "Selective depot content sync", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync the tracked files of one depot into the local mirror
    Sync {
        /// Depot ID
        #[arg(long)]
        depot: u32,

        /// Manifest file (JSON) describing the depot's files and chunks
        #[arg(long)]
        manifest: PathBuf,

        /// Content server base URL
        #[arg(long)]
        server: String,

        /// CDN authentication token appended to chunk requests
        #[arg(long)]
        token: Option<String>,

        /// Depot decryption key (hex)
        #[arg(long)]
        key: Option<String>,

        /// Parent application ID
        #[arg(long, default_value_t = 0)]
        app_id: u32,

        /// Application name used in operator messages
        #[arg(long)]
        app_name: Option<String>,

        /// Configuration file (INI)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Root of the local mirror (overrides the config file)
        #[arg(long)]
        files_dir: Option<PathBuf>,

        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the depots tracked by the pattern file
    Patterns {
        /// Configuration file (INI)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Root of the local mirror (overrides the config file)
        #[arg(long)]
        files_dir: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Sync {
            depot,
            manifest,
            server,
            token,
            key,
            app_id,
            app_name,
            config,
            files_dir,
            verbose,
        } => commands::sync::run(SyncArgs {
            depot,
            manifest,
            server,
            token,
            key,
            app_id,
            app_name,
            config,
            files_dir,
            verbose,
        }),
        Commands::Patterns { config, files_dir } => {
            commands::patterns::run(PatternsArgs { config, files_dir })
        }
    }
}
