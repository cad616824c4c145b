//! File record storage. The bytes themselves live in the media directory;
//! rows only keep the relative path and metadata.

use super::tasks::task_exists_internal;
use super::{Database, StoreError, from_micros, now_us};
use crate::media::media_url;
use crate::query::PageRequest;
use crate::types::TaskFile;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

const FILE_COLUMNS: &str = "id, task_id, path, name, size, content_type, uploaded_at";

/// Metadata of a blob already written to the media directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub path: String,
    pub name: String,
    pub size: i64,
    pub content_type: String,
}

fn parse_file_row(row: &Row) -> rusqlite::Result<TaskFile> {
    let path: String = row.get("path")?;
    Ok(TaskFile {
        id: row.get("id")?,
        task: row.get("task_id")?,
        file: media_url(&path),
        name: row.get("name")?,
        size: row.get("size")?,
        content_type: row.get("content_type")?,
        uploaded_at: from_micros(row.get("uploaded_at")?),
        path,
    })
}

/// Files of one task, oldest first.
pub(crate) fn files_for_task(conn: &Connection, task_id: &str) -> Result<Vec<TaskFile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM task_files WHERE task_id = ?1 ORDER BY id",
        FILE_COLUMNS
    ))?;
    let files = stmt
        .query_map(params![task_id], parse_file_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(files)
}

fn get_file_internal(conn: &Connection, file_id: i64) -> Result<Option<TaskFile>> {
    let file = conn
        .query_row(
            &format!("SELECT {} FROM task_files WHERE id = ?1", FILE_COLUMNS),
            params![file_id],
            parse_file_row,
        )
        .optional()?;
    Ok(file)
}

impl Database {
    /// Record an uploaded file for a task.
    /// Fails with [`StoreError::TaskNotFound`] if the task does not exist.
    pub fn create_file(&self, task_id: &str, blob: &StoredBlob) -> Result<TaskFile> {
        let now = now_us();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if !task_exists_internal(&tx, task_id)? {
                return Err(StoreError::TaskNotFound(task_id.to_string()).into());
            }

            tx.execute(
                "INSERT INTO task_files (task_id, path, name, size, content_type, uploaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    task_id,
                    &blob.path,
                    &blob.name,
                    blob.size,
                    &blob.content_type,
                    now
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;

            Ok(TaskFile {
                id,
                task: task_id.to_string(),
                file: media_url(&blob.path),
                name: blob.name.clone(),
                size: blob.size,
                content_type: blob.content_type.clone(),
                uploaded_at: from_micros(now),
                path: blob.path.clone(),
            })
        })
    }

    /// Get a file record by ID.
    pub fn get_file(&self, file_id: i64) -> Result<Option<TaskFile>> {
        self.with_conn(|conn| get_file_internal(conn, file_id))
    }

    /// Get a file record by its media path.
    pub fn get_file_by_path(&self, path: &str) -> Result<Option<TaskFile>> {
        self.with_conn(|conn| {
            let file = conn
                .query_row(
                    &format!("SELECT {} FROM task_files WHERE path = ?1", FILE_COLUMNS),
                    params![path],
                    parse_file_row,
                )
                .optional()?;
            Ok(file)
        })
    }

    /// List file records ordered by id. Returns the page and the total count.
    pub fn list_files(&self, page: PageRequest) -> Result<(Vec<TaskFile>, u64)> {
        let (limit, offset) = page.limit_offset();

        self.with_conn(|conn| {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM task_files", [], |row| row.get(0))?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM task_files ORDER BY id LIMIT ?1 OFFSET ?2",
                FILE_COLUMNS
            ))?;
            let files = stmt
                .query_map(params![limit, offset], parse_file_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok((files, total.max(0) as u64))
        })
    }

    /// Re-point a file at another task and/or replace its blob.
    /// Returns the updated record and the path of the replaced blob, if any.
    pub fn update_file(
        &self,
        file_id: i64,
        task_id: Option<&str>,
        blob: Option<&StoredBlob>,
    ) -> Result<(TaskFile, Option<String>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let mut file = get_file_internal(&tx, file_id)?.ok_or(StoreError::NotFound)?;
            let mut replaced = None;

            if let Some(task_id) = task_id {
                if !task_exists_internal(&tx, task_id)? {
                    return Err(StoreError::TaskNotFound(task_id.to_string()).into());
                }
                file.task = task_id.to_string();
            }

            if let Some(blob) = blob {
                replaced = Some(std::mem::replace(&mut file.path, blob.path.clone()));
                file.file = media_url(&blob.path);
                file.name = blob.name.clone();
                file.size = blob.size;
                file.content_type = blob.content_type.clone();
            }

            tx.execute(
                "UPDATE task_files SET task_id = ?1, path = ?2, name = ?3, size = ?4, content_type = ?5
                 WHERE id = ?6",
                params![
                    &file.task,
                    &file.path,
                    &file.name,
                    file.size,
                    &file.content_type,
                    file_id
                ],
            )?;
            tx.commit()?;

            Ok((file, replaced))
        })
    }

    /// Delete a file record. Returns its media path.
    pub fn delete_file(&self, file_id: i64) -> Result<String> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let file = get_file_internal(&tx, file_id)?.ok_or(StoreError::NotFound)?;
            tx.execute("DELETE FROM task_files WHERE id = ?1", params![file_id])?;
            tx.commit()?;
            Ok(file.path)
        })
    }
}
