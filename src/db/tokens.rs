//! Users and API tokens.

use super::{Database, from_micros, now_us};
use crate::types::{ApiToken, Principal};
use anyhow::Result;
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

/// Length of a token key in hex characters.
pub const TOKEN_KEY_LEN: usize = 40;

fn generate_key() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
        .chars()
        .take(TOKEN_KEY_LEN)
        .collect()
}

impl Database {
    /// Issue a new token for `username`, creating the user if needed.
    pub fn issue_token(&self, username: &str) -> Result<ApiToken> {
        let now = now_us();
        let key = generate_key();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT OR IGNORE INTO users (username, created_at) VALUES (?1, ?2)",
                params![username, now],
            )?;
            let user_id: i64 = tx.query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO api_tokens (key, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![&key, user_id, now],
            )?;

            tx.commit()?;

            Ok(ApiToken {
                key,
                username: username.to_string(),
                created_at: from_micros(now),
            })
        })
    }

    /// Resolve a token key to its principal.
    pub fn authenticate(&self, key: &str) -> Result<Option<Principal>> {
        self.with_conn(|conn| {
            let principal = conn
                .query_row(
                    "SELECT u.id, u.username FROM api_tokens t
                     JOIN users u ON u.id = t.user_id
                     WHERE t.key = ?1",
                    params![key],
                    |row| {
                        Ok(Principal {
                            user_id: row.get(0)?,
                            username: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(principal)
        })
    }

    /// Revoke a token. Returns whether it existed.
    pub fn revoke_token(&self, key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM api_tokens WHERE key = ?1", params![key])?;
            Ok(deleted > 0)
        })
    }

    /// All issued tokens, oldest first.
    pub fn list_tokens(&self) -> Result<Vec<ApiToken>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.key, u.username, t.created_at FROM api_tokens t
                 JOIN users u ON u.id = t.user_id
                 ORDER BY t.created_at, t.key",
            )?;
            let tokens = stmt
                .query_map([], |row| {
                    Ok(ApiToken {
                        key: row.get(0)?,
                        username: row.get(1)?,
                        created_at: from_micros(row.get(2)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tokens)
        })
    }
}
