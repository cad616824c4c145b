//! Task Tracker
//!
//! Token-authenticated HTTP API for tasks, their comments and uploaded files.

use anyhow::Result;
use clap::Parser;
use task_tracker::cli::token::run_token;
use task_tracker::cli::{Cli, Command};
use task_tracker::config::{ConfigLoader, ConfigPaths};
use task_tracker::db::Database;
use task_tracker::logging::{self, LogTarget};
use task_tracker::server;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let mut paths = ConfigPaths::discover();
    if let Some(config_path) = &cli.config {
        paths = paths.with_explicit(config_path);
    }
    let loader = ConfigLoader::load_with_paths(paths)?;
    for source in loader.sources() {
        debug!(path = %source.display(), "Loaded config file");
    }

    let mut config = loader.into_config();
    cli.apply_overrides(&mut config);

    match &cli.command {
        Some(Command::Token(args)) => {
            let db = Database::open(&config.paths.db_path)?;
            run_token(&db, args, &mut std::io::stdout().lock())?;
        }
        Some(Command::Serve) | None => {
            server::run(&config).await?;
        }
    }

    Ok(())
}
