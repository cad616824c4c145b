//! Error types and the uniform HTTP error envelope.
//!
//! Every failure that reaches a client is rendered by [`ApiError`]'s
//! `IntoResponse` implementation:
//!
//! ```json
//! {"status_code": 400, "errors": {"title": ["This field is required."]}, "detail": "..."}
//! ```
//!
//! `errors` keeps the original per-field map or message object; `detail` is a
//! fixed, human-readable note.

use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::types::invalid_task_reference;

/// Generic note attached to every error envelope.
pub const ERROR_NOTE: &str = "An error occurred. Please consult the API documentation.";

/// Per-field validation messages, keyed by field name.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.0.get(field)
    }

    /// Merge another set of errors into this one.
    pub fn extend(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    /// `Ok(value)` when no errors were recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

/// Storage-level conditions the API layer needs to classify.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("task not found: {0}")]
    TaskNotFound(String),
}

/// Failure returned by request handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(FieldErrors),
    #[error("{0}")]
    Parse(String),
    #[error("Not found.")]
    NotFound,
    #[error("Method \"{0}\" not allowed.")]
    MethodNotAllowed(Method),
    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,
    #[error("Invalid token.")]
    InvalidToken,
    #[error("Unsupported media type \"{0}\" in request.")]
    UnsupportedMediaType(String),
    #[error("Request body is too large.")]
    PayloadTooLarge,
    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

/// Result type for request handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Wire shape of the error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub status_code: u16,
    pub errors: Value,
    pub detail: &'static str,
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(FieldErrors::single(field, message))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Parse(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::NotAuthenticated | ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The original error detail, placed under `errors` in the envelope.
    pub fn errors(&self) -> Value {
        match self {
            ApiError::Validation(fields) => json!(fields),
            // Internal details stay in the log.
            ApiError::Internal(_) => json!({ "detail": "A server error occurred." }),
            other => json!({ "detail": other.to_string() }),
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            status_code: self.status().as_u16(),
            errors: self.errors(),
            detail: ERROR_NOTE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), "Request failed: {}", self);
        } else {
            warn!(status = status.as_u16(), "Request rejected: {}", self);
        }

        let mut response = (status, Json(self.envelope())).into_response();
        if matches!(self, ApiError::NotAuthenticated | ApiError::InvalidToken) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Token"));
        }
        response
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(errors)
    }
}

// Storage returns anyhow errors; classify the typed ones we know about.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<StoreError>() {
            Ok(StoreError::NotFound) => ApiError::NotFound,
            Ok(StoreError::TaskNotFound(task_id)) => {
                ApiError::field("task", invalid_task_reference(&task_id))
            }
            Err(err) => ApiError::Internal(err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge,
            _ => ApiError::Parse(format!("JSON parse error - {}", rejection.body_text())),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Parse(format!("Multipart form parse error - {}", rejection.body_text()))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        match err.status() {
            StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge,
            _ => ApiError::Parse(format!("Multipart form parse error - {}", err.body_text())),
        }
    }
}
