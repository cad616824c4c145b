//! Task CRUD operations.

use super::comments::comments_for_task;
use super::files::files_for_task;
use super::{Database, StoreError, from_micros, next_timestamp, now_us};
use crate::query::TaskQuery;
use crate::types::{Task, TaskChanges, TaskDraft};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use uuid::Uuid;

const TASK_COLUMNS: &str = "id, title, description, status, created_at, updated_at";

/// Parse a task row. Comments and files are loaded separately.
pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: row.get("status")?,
        created_at: from_micros(row.get("created_at")?),
        updated_at: from_micros(row.get("updated_at")?),
        comments: Vec::new(),
        files: Vec::new(),
    })
}

fn get_task_internal(conn: &Connection, task_id: &str) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
            params![task_id],
            parse_task_row,
        )
        .optional()?;
    Ok(task)
}

/// Fill in the nested comments and files of each task.
fn load_relations(conn: &Connection, tasks: &mut [Task]) -> Result<()> {
    for task in tasks.iter_mut() {
        task.comments = comments_for_task(conn, &task.id)?;
        task.files = files_for_task(conn, &task.id)?;
    }
    Ok(())
}

/// Check whether a task exists.
pub(crate) fn task_exists_internal(conn: &Connection, task_id: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM tasks WHERE id = ?1",
            params![task_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(exists)
}

impl Database {
    /// Create a new task with a generated UUID7 id.
    pub fn create_task(&self, draft: &TaskDraft) -> Result<Task> {
        let task_id = Uuid::now_v7().to_string();
        let now = now_us();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (id, title, description, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    &task_id,
                    &draft.title,
                    &draft.description,
                    draft.status,
                    now,
                    now,
                ],
            )?;

            Ok(Task {
                id: task_id,
                title: draft.title.clone(),
                description: draft.description.clone(),
                status: draft.status,
                created_at: from_micros(now),
                updated_at: from_micros(now),
                comments: Vec::new(),
                files: Vec::new(),
            })
        })
    }

    /// Get a task by ID, including its comments and files.
    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.with_conn(|conn| {
            let Some(mut task) = get_task_internal(conn, task_id)? else {
                return Ok(None);
            };
            load_relations(conn, std::slice::from_mut(&mut task))?;
            Ok(Some(task))
        })
    }

    /// Check whether a task exists.
    pub fn task_exists(&self, task_id: &str) -> Result<bool> {
        self.with_conn(|conn| task_exists_internal(conn, task_id))
    }

    /// Apply validated changes to a task and refresh `updated_at`.
    /// Fails with [`StoreError::NotFound`] when the task does not exist.
    pub fn update_task(&self, task_id: &str, changes: &TaskChanges) -> Result<Task> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let mut task = get_task_internal(&tx, task_id)?.ok_or(StoreError::NotFound)?;
            let previous: i64 = tx.query_row(
                "SELECT updated_at FROM tasks WHERE id = ?1",
                params![task_id],
                |row| row.get(0),
            )?;
            let updated_at = next_timestamp(previous);

            if let Some(ref title) = changes.title {
                task.title = title.clone();
            }
            if let Some(ref description) = changes.description {
                task.description = description.clone();
            }
            if let Some(status) = changes.status {
                task.status = status;
            }

            tx.execute(
                "UPDATE tasks SET title = ?1, description = ?2, status = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![&task.title, &task.description, task.status, updated_at, task_id],
            )?;
            task.updated_at = from_micros(updated_at);

            load_relations(&tx, std::slice::from_mut(&mut task))?;
            tx.commit()?;

            Ok(task)
        })
    }

    /// Delete a task together with its comments and files, in one transaction.
    /// Returns the media paths of the deleted files so the caller can remove
    /// the stored blobs.
    pub fn delete_task(&self, task_id: &str) -> Result<Vec<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if !task_exists_internal(&tx, task_id)? {
                return Err(StoreError::NotFound.into());
            }

            let paths: Vec<String> = {
                let mut stmt = tx.prepare("SELECT path FROM task_files WHERE task_id = ?1")?;
                let rows = stmt.query_map(params![task_id], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<_>>()?
            };

            tx.execute("DELETE FROM comments WHERE task_id = ?1", params![task_id])?;
            tx.execute("DELETE FROM task_files WHERE task_id = ?1", params![task_id])?;
            tx.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;

            tx.commit()?;
            Ok(paths)
        })
    }

    /// Run a list query. Returns the requested page and the total number of
    /// matching tasks.
    pub fn query_tasks(&self, query: &TaskQuery) -> Result<(Vec<Task>, u64)> {
        let plan = query.to_sql();

        self.with_conn(|conn| {
            let total: i64 =
                conn.query_row(&plan.count, params_from_iter(plan.params.iter()), |row| {
                    row.get(0)
                })?;

            let mut stmt = conn.prepare(&plan.select)?;
            let mut tasks = stmt
                .query_map(params_from_iter(plan.params.iter()), parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            load_relations(conn, &mut tasks)?;

            Ok((tasks, total.max(0) as u64))
        })
    }
}
