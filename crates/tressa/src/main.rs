// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tressa - salon rewards engine.
//!
//! This is the binary entry point: the long-running expiry service plus a
//! handful of one-shot maintenance and inspection commands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod inspect;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tressa_config::TressaConfig;
use tressa_core::{GrantStatus, TressaError};

/// Tressa - salon rewards engine.
#[derive(Parser, Debug)]
#[command(name = "tressa", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the expiry sweeper until SIGINT/SIGTERM.
    Serve,
    /// Run a single expiry pass and exit.
    Sweep,
    /// Apply pending database migrations and exit.
    Migrate,
    /// Show a user's standing on every active track.
    Progress {
        user_id: String,
    },
    /// List a user's reward grants.
    Grants {
        user_id: String,
        /// Include redeemed, expired and revoked grants.
        #[arg(long)]
        all: bool,
        /// Only grants in this status (implies --all).
        #[arg(long, value_name = "STATUS")]
        status: Option<GrantStatus>,
    },
}

fn load_config(path: Option<&PathBuf>) -> TressaConfig {
    let loaded = match path {
        Some(path) => tressa_config::load_and_validate_path(path),
        None => tressa_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            tressa_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

async fn dispatch(command: Commands, config: TressaConfig) -> Result<(), TressaError> {
    match command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Sweep => inspect::run_sweep(&config).await,
        Commands::Migrate => inspect::run_migrate(&config).await,
        Commands::Progress { user_id } => inspect::run_progress(&config, &user_id).await,
        Commands::Grants {
            user_id,
            all,
            status,
        } => inspect::run_grants(&config, &user_id, all || status.is_some(), status).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("tressa: use --help for available commands");
        return;
    };

    let config = load_config(cli.config.as_ref());
    serve::init_tracing(&config.service.log_level);

    if let Err(e) = dispatch(command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
