//! `/files/` resource and media downloads.
//!
//! Uploads are written to the media directory before the record is stored;
//! if storing the record fails the new blob is removed again. Replacing or
//! deleting a record removes the old blob.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use super::AppState;
use super::comments::parse_id;
use super::extract::{FileForm, FilePart, Upload};
use super::resource::Resource;
use crate::db::files::StoredBlob;
use crate::error::{ApiError, ApiResult, FieldErrors};
use crate::media::{UPLOAD_DIR, sanitize_file_name};
use crate::query::{ListParams, PageRequest};
use crate::types::{MSG_BLANK, MSG_REQUIRED, Principal, TaskFile, invalid_task_reference};

const MSG_NO_FILE: &str = "No file was submitted.";
const MSG_NOT_A_FILE: &str =
    "The submitted data was not a file. Check the encoding type on the form.";
const MSG_EMPTY_FILE: &str = "The submitted file is empty.";

/// Validated file form. On create both fields are present.
struct FileChanges {
    task: Option<String>,
    upload: Option<Upload>,
}

fn validate(state: &AppState, form: FileForm, partial: bool) -> ApiResult<FileChanges> {
    let mut errors = FieldErrors::new();

    let task = match form.task {
        None => {
            if !partial {
                errors.add("task", MSG_REQUIRED);
            }
            None
        }
        Some(task_id) if task_id.trim().is_empty() => {
            errors.add("task", MSG_BLANK);
            None
        }
        Some(task_id) => {
            if !state.db.task_exists(&task_id)? {
                errors.add("task", invalid_task_reference(&task_id));
            }
            Some(task_id)
        }
    };

    let upload = match form.file {
        FilePart::Absent => {
            if !partial {
                errors.add("file", MSG_NO_FILE);
            }
            None
        }
        FilePart::NotAFile => {
            errors.add("file", MSG_NOT_A_FILE);
            None
        }
        FilePart::Upload(upload) if upload.name.is_empty() => {
            errors.add("file", MSG_NO_FILE);
            None
        }
        FilePart::Upload(upload) if upload.bytes.is_empty() => {
            errors.add("file", MSG_EMPTY_FILE);
            None
        }
        FilePart::Upload(upload) => Some(upload),
    };

    Ok(errors.into_result(FileChanges { task, upload })?)
}

fn save(state: &AppState, upload: &Upload) -> ApiResult<StoredBlob> {
    Ok(state
        .media
        .save(&upload.name, &upload.content_type, &upload.bytes)?)
}

pub struct FileResource;

impl Resource for FileResource {
    const NAME: &'static str = "files";

    type Record = TaskFile;
    type Input = FileForm;

    fn list(
        state: &AppState,
        _params: &ListParams,
        page: PageRequest,
    ) -> ApiResult<(Vec<TaskFile>, u64)> {
        Ok(state.db.list_files(page)?)
    }

    fn retrieve(state: &AppState, id: &str) -> ApiResult<TaskFile> {
        state.db.get_file(parse_id(id)?)?.ok_or(ApiError::NotFound)
    }

    fn create(state: &AppState, user: &Principal, form: FileForm) -> ApiResult<TaskFile> {
        let changes = validate(state, form, false)?;
        let (Some(task_id), Some(upload)) = (changes.task, changes.upload) else {
            return Err(ApiError::field("file", MSG_NO_FILE));
        };

        let blob = save(state, &upload)?;
        match state.db.create_file(&task_id, &blob) {
            Ok(file) => {
                info!(
                    file_id = file.id,
                    task_id = %file.task,
                    size = file.size,
                    user = %user.username,
                    "File uploaded"
                );
                Ok(file)
            }
            Err(e) => {
                state.media.remove_all([&blob.path]);
                Err(e.into())
            }
        }
    }

    fn update(
        state: &AppState,
        user: &Principal,
        id: &str,
        form: FileForm,
        partial: bool,
    ) -> ApiResult<TaskFile> {
        let file_id = parse_id(id)?;
        if state.db.get_file(file_id)?.is_none() {
            return Err(ApiError::NotFound);
        }

        let changes = validate(state, form, partial)?;
        let blob = changes
            .upload
            .as_ref()
            .map(|upload| save(state, upload))
            .transpose()?;

        match state
            .db
            .update_file(file_id, changes.task.as_deref(), blob.as_ref())
        {
            Ok((file, replaced)) => {
                state.media.remove_all(replaced.iter());
                info!(file_id, task_id = %file.task, user = %user.username, "File updated");
                Ok(file)
            }
            Err(e) => {
                state.media.remove_all(blob.iter().map(|b| &b.path));
                Err(e.into())
            }
        }
    }

    fn destroy(state: &AppState, user: &Principal, id: &str) -> ApiResult<()> {
        let file_id = parse_id(id)?;
        let path = state.db.delete_file(file_id)?;
        state.media.remove_all([&path]);
        info!(file_id, user = %user.username, "File deleted");
        Ok(())
    }
}

/// `GET /media/task_files/{name}`: serve the stored bytes of an upload.
pub async fn download(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let path = format!("{}/{}", UPLOAD_DIR, name);
    let file = state
        .db
        .get_file_by_path(&path)?
        .ok_or(ApiError::NotFound)?;

    let bytes = match state.media.read(&file.path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %file.path, "Stored file is unreadable: {:#}", e);
            return Err(ApiError::NotFound);
        }
    };

    let disposition = format!(
        "inline; filename=\"{}\"",
        sanitize_file_name(&file.name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, file.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
