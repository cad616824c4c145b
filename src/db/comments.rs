//! Comment storage operations.

use super::tasks::task_exists_internal;
use super::{Database, StoreError, from_micros, now_us};
use crate::query::PageRequest;
use crate::types::{Comment, CommentChanges};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

fn parse_comment_row(row: &Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get("id")?,
        task: row.get("task_id")?,
        text: row.get("text")?,
        created_at: from_micros(row.get("created_at")?),
    })
}

/// Comments of one task, oldest first.
pub(crate) fn comments_for_task(conn: &Connection, task_id: &str) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT id, task_id, text, created_at FROM comments WHERE task_id = ?1 ORDER BY id",
    )?;
    let comments = stmt
        .query_map(params![task_id], parse_comment_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(comments)
}

fn get_comment_internal(conn: &Connection, comment_id: i64) -> Result<Option<Comment>> {
    let comment = conn
        .query_row(
            "SELECT id, task_id, text, created_at FROM comments WHERE id = ?1",
            params![comment_id],
            parse_comment_row,
        )
        .optional()?;
    Ok(comment)
}

impl Database {
    /// Add a comment to a task.
    /// Fails with [`StoreError::TaskNotFound`] if the task does not exist.
    pub fn create_comment(&self, task_id: &str, text: &str) -> Result<Comment> {
        let now = now_us();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if !task_exists_internal(&tx, task_id)? {
                return Err(StoreError::TaskNotFound(task_id.to_string()).into());
            }

            tx.execute(
                "INSERT INTO comments (task_id, text, created_at) VALUES (?1, ?2, ?3)",
                params![task_id, text, now],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;

            Ok(Comment {
                id,
                task: task_id.to_string(),
                text: text.to_string(),
                created_at: from_micros(now),
            })
        })
    }

    /// Get a comment by ID.
    pub fn get_comment(&self, comment_id: i64) -> Result<Option<Comment>> {
        self.with_conn(|conn| get_comment_internal(conn, comment_id))
    }

    /// List comments ordered by id. Returns the page and the total count.
    pub fn list_comments(&self, page: PageRequest) -> Result<(Vec<Comment>, u64)> {
        let (limit, offset) = page.limit_offset();

        self.with_conn(|conn| {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))?;

            let mut stmt = conn.prepare(
                "SELECT id, task_id, text, created_at FROM comments
                 ORDER BY id LIMIT ?1 OFFSET ?2",
            )?;
            let comments = stmt
                .query_map(params![limit, offset], parse_comment_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok((comments, total.max(0) as u64))
        })
    }

    /// Apply changes to a comment. Moving it to another task checks that the
    /// target task exists.
    pub fn update_comment(&self, comment_id: i64, changes: &CommentChanges) -> Result<Comment> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let mut comment =
                get_comment_internal(&tx, comment_id)?.ok_or(StoreError::NotFound)?;

            if let Some(ref task_id) = changes.task {
                if !task_exists_internal(&tx, task_id)? {
                    return Err(StoreError::TaskNotFound(task_id.clone()).into());
                }
                comment.task = task_id.clone();
            }
            if let Some(ref text) = changes.text {
                comment.text = text.clone();
            }

            tx.execute(
                "UPDATE comments SET task_id = ?1, text = ?2 WHERE id = ?3",
                params![&comment.task, &comment.text, comment_id],
            )?;
            tx.commit()?;

            Ok(comment)
        })
    }

    /// Delete a comment.
    pub fn delete_comment(&self, comment_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
            if deleted == 0 {
                return Err(StoreError::NotFound.into());
            }
            Ok(())
        })
    }
}
