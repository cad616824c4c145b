//! Core types for the task tracker.

use crate::error::FieldErrors;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Maximum length of a task title, in characters.
pub const TITLE_MAX_CHARS: usize = 255;

pub const MSG_REQUIRED: &str = "This field is required.";
pub const MSG_BLANK: &str = "This field may not be blank.";
pub const MSG_NULL: &str = "This field may not be null.";
pub const MSG_NOT_A_STRING: &str = "Not a valid string.";
pub const MSG_NUL_CHARS: &str = "Null characters are not allowed.";

/// Workflow status of a task.
///
/// The serialized identifiers are the canonical values stored in the
/// database; [`TaskStatus::label`] is only used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    New,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// All statuses in workflow order.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::New,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::New => "new",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::New => "New",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
            TaskStatus::Cancelled => "Cancelled",
        }
    }

    /// Position in the workflow, used when ordering by status.
    pub fn rank(&self) -> usize {
        match self {
            TaskStatus::New => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Completed => 2,
            TaskStatus::Cancelled => 3,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("\"{}\" is not a valid choice.", s))
    }
}

impl ToSql for TaskStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TaskStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        raw.parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// A task with its comments and files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub files: Vec<TaskFile>,
}

/// A comment attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub task: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A file uploaded to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFile {
    pub id: i64,
    pub task: String,
    /// URL the stored bytes can be downloaded from.
    pub file: String,
    /// Original file name supplied by the client.
    pub name: String,
    pub size: i64,
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
    /// Storage path relative to the media directory.
    #[serde(skip)]
    pub path: String,
}

/// Authenticated API principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
}

/// An issued API token.
#[derive(Debug, Clone, Serialize)]
pub struct ApiToken {
    pub key: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Write payloads
// =============================================================================

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Read a string-typed field. Numbers are accepted in their JSON text form;
/// surrounding whitespace is dropped.
fn text_value(errors: &mut FieldErrors, field: &str, raw: Value) -> Option<String> {
    let text = match raw {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        _ => {
            errors.add(field, MSG_NOT_A_STRING);
            return None;
        }
    };
    if text.contains('\0') {
        errors.add(field, MSG_NUL_CHARS);
        return None;
    }
    Some(text.trim().to_string())
}

/// Validate a required, non-blank text field.
fn required_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<Option<Value>>,
    partial: bool,
) -> Option<String> {
    match value {
        None => {
            if !partial {
                errors.add(field, MSG_REQUIRED);
            }
            None
        }
        Some(None) => {
            errors.add(field, MSG_NULL);
            None
        }
        Some(Some(raw)) => match text_value(errors, field, raw) {
            Some(text) if text.is_empty() => {
                errors.add(field, MSG_BLANK);
                None
            }
            text => text,
        },
    }
}

/// Validate a nullable text field. `Some(None)` clears the stored value.
fn optional_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<Option<Value>>,
) -> Option<Option<String>> {
    match value? {
        None => Some(None),
        Some(raw) => text_value(errors, field, raw).map(Some),
    }
}

/// JSON body accepted by task create and update.
#[derive(Debug, Default, Deserialize)]
pub struct TaskInput {
    #[serde(default, deserialize_with = "double_option")]
    pub title: Option<Option<Value>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<Value>>,
    #[serde(default, deserialize_with = "double_option")]
    pub status: Option<Option<Value>>,
}

/// Validated fields for a new task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: TaskStatus::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}

/// Validated changes to an existing task. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
}

impl TaskInput {
    fn check(self, partial: bool) -> Result<TaskChanges, FieldErrors> {
        let mut errors = FieldErrors::new();

        let title = required_text(&mut errors, "title", self.title, partial);
        if let Some(ref t) = title {
            if t.chars().count() > TITLE_MAX_CHARS {
                errors.add(
                    "title",
                    format!(
                        "Ensure this field has no more than {} characters.",
                        TITLE_MAX_CHARS
                    ),
                );
            }
        }

        let description = optional_text(&mut errors, "description", self.description);

        let status = match self.status {
            None => None,
            Some(None) => {
                errors.add("status", MSG_NULL);
                None
            }
            Some(Some(raw)) => {
                let choice = match raw {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                match choice.parse::<TaskStatus>() {
                    Ok(status) => Some(status),
                    Err(msg) => {
                        errors.add("status", msg);
                        None
                    }
                }
            }
        };

        errors.into_result(TaskChanges {
            title,
            description,
            status,
        })
    }

    /// Validate a create payload: `title` is required.
    pub fn validate_new(self) -> Result<TaskDraft, FieldErrors> {
        let changes = self.check(false)?;
        match changes.title {
            Some(title) => Ok(TaskDraft {
                title,
                description: changes.description.flatten(),
                status: changes.status.unwrap_or_default(),
            }),
            None => Err(FieldErrors::single("title", MSG_REQUIRED)),
        }
    }

    /// Validate an update payload. A full update still requires `title`.
    pub fn validate_update(self, partial: bool) -> Result<TaskChanges, FieldErrors> {
        self.check(partial)
    }
}

/// JSON body accepted by comment create and update.
#[derive(Debug, Default, Deserialize)]
pub struct CommentInput {
    #[serde(default, deserialize_with = "double_option")]
    pub task: Option<Option<Value>>,
    #[serde(default, deserialize_with = "double_option")]
    pub text: Option<Option<Value>>,
}

/// Validated comment fields. On create both are present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentChanges {
    pub task: Option<String>,
    pub text: Option<String>,
}

impl CommentInput {
    /// Structural validation only; the caller checks that `task` exists.
    /// Returns the fields that passed together with any errors.
    pub fn check(self, partial: bool) -> (CommentChanges, FieldErrors) {
        let mut errors = FieldErrors::new();
        let task = required_text(&mut errors, "task", self.task, partial);
        let text = required_text(&mut errors, "text", self.text, partial);
        (CommentChanges { task, text }, errors)
    }

    pub fn validate(self, partial: bool) -> Result<CommentChanges, FieldErrors> {
        let (changes, errors) = self.check(partial);
        errors.into_result(changes)
    }
}

/// Message for a `task` reference that does not resolve.
pub fn invalid_task_reference(task_id: &str) -> String {
    format!("Invalid pk \"{}\" - object does not exist.", task_id)
}
