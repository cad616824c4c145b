//! Request body extractors that reject with the API error envelope.

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{HeaderMap, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// JSON body. A missing or non-JSON content type is a 415, malformed JSON a 400.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = content_type(req.headers());
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(JsonRejection::MissingJsonContentType(_)) => {
                Err(ApiError::UnsupportedMediaType(content_type))
            }
            Err(rejection) => Err(rejection.into()),
        }
    }
}

/// An uploaded file part.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// State of the `file` field in a submitted form.
#[derive(Debug, Clone, Default)]
pub enum FilePart {
    #[default]
    Absent,
    /// The field was sent as plain text rather than a file.
    NotAFile,
    Upload(Upload),
}

/// File resource body: `multipart/form-data` with `task` and `file` parts,
/// or a JSON object that can only carry `task`.
#[derive(Debug, Clone, Default)]
pub struct FileForm {
    pub task: Option<String>,
    pub file: FilePart,
}

#[derive(Debug, Default, Deserialize)]
struct FileJson {
    #[serde(default)]
    task: Option<Value>,
}

/// A JSON `task` reference in text form. Non-string values keep their JSON
/// text so the lookup reports them under `task`.
fn task_reference(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

impl<S> FromRequest<S> for FileForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = content_type(req.headers());

        match essence(&content_type).as_str() {
            "multipart/form-data" => {
                let mut multipart = Multipart::from_request(req, state).await?;
                let mut form = FileForm::default();

                while let Some(field) = multipart.next_field().await? {
                    let name = field.name().map(str::to_owned);
                    match name.as_deref() {
                        Some("task") => form.task = Some(field.text().await?),
                        Some("file") => {
                            let Some(file_name) = field.file_name().map(str::to_owned) else {
                                form.file = FilePart::NotAFile;
                                continue;
                            };
                            let content_type = field
                                .content_type()
                                .map(str::to_owned)
                                .unwrap_or_else(|| {
                                    mime_guess::from_path(&file_name)
                                        .first_or_octet_stream()
                                        .to_string()
                                });
                            let bytes = field.bytes().await?;
                            form.file = FilePart::Upload(Upload {
                                name: file_name,
                                content_type,
                                bytes,
                            });
                        }
                        _ => {}
                    }
                }
                Ok(form)
            }
            "application/json" => {
                let ApiJson(body) = ApiJson::<FileJson>::from_request(req, state).await?;
                Ok(FileForm {
                    task: body.task.and_then(task_reference),
                    file: FilePart::Absent,
                })
            }
            _ => Err(ApiError::UnsupportedMediaType(content_type)),
        }
    }
}
