//! CLI command definitions for task-tracker
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod token;

use clap::{Parser, Subcommand};
use token::TokenArgs;

use crate::config::Config;

/// Task tracker HTTP API server and admin tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Path to media directory (overrides config)
    #[arg(short, long, global = true)]
    pub media_dir: Option<String>,

    /// Address to listen on (overrides config)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(db_path) = &self.database {
            config.paths.db_path = db_path.into();
        }
        if let Some(media_dir) = &self.media_dir {
            config.paths.media_dir = media_dir.into();
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API server (default if no subcommand given)
    Serve,

    /// Manage API tokens
    Token(TokenArgs),
}
