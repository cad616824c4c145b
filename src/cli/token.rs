//! Token subcommand for task-tracker CLI
//!
//! Issues, revokes and lists the API tokens that clients present in the
//! `Authorization` header.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use std::io::Write;

use crate::db::Database;

/// Arguments for the token subcommand
#[derive(Args, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub action: TokenAction,
}

#[derive(Subcommand, Debug)]
pub enum TokenAction {
    /// Create a token for a user (the user is created if needed)
    Issue {
        /// User name the token authenticates as
        username: String,
    },

    /// Delete a token
    Revoke {
        /// Token key
        key: String,
    },

    /// List tokens and their users
    List,
}

/// Run a token action, writing results to `out`.
pub fn run_token(db: &Database, args: &TokenArgs, out: &mut impl Write) -> Result<()> {
    match &args.action {
        TokenAction::Issue { username } => {
            let username = username.trim();
            if username.is_empty() {
                bail!("Username may not be blank");
            }
            let token = db.issue_token(username)?;
            writeln!(out, "{}", token.key)?;
        }
        TokenAction::Revoke { key } => {
            if !db.revoke_token(key)? {
                bail!("No such token: {}", key);
            }
            writeln!(out, "Revoked {}", key)?;
        }
        TokenAction::List => {
            for token in db.list_tokens()? {
                writeln!(
                    out,
                    "{}\t{}\t{}",
                    token.key,
                    token.username,
                    token.created_at.to_rfc3339()
                )?;
            }
        }
    }
    Ok(())
}
