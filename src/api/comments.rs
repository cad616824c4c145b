//! `/comments/` resource.

use tracing::info;

use super::AppState;
use super::extract::ApiJson;
use super::resource::Resource;
use crate::error::{ApiError, ApiResult};
use crate::query::{ListParams, PageRequest};
use crate::types::{
    Comment, CommentChanges, CommentInput, MSG_REQUIRED, Principal, invalid_task_reference,
};

/// Parse a numeric record id. Anything else cannot name a record.
pub(crate) fn parse_id(id: &str) -> ApiResult<i64> {
    id.parse().map_err(|_| ApiError::NotFound)
}

/// Validate a comment body, reporting an unknown `task` alongside any
/// structural errors.
fn validate(state: &AppState, input: CommentInput, partial: bool) -> ApiResult<CommentChanges> {
    let (changes, mut errors) = input.check(partial);
    if let Some(task_id) = &changes.task {
        if !state.db.task_exists(task_id)? {
            errors.add("task", invalid_task_reference(task_id));
        }
    }
    Ok(errors.into_result(changes)?)
}

pub struct CommentResource;

impl Resource for CommentResource {
    const NAME: &'static str = "comments";

    type Record = Comment;
    type Input = ApiJson<CommentInput>;

    fn list(
        state: &AppState,
        _params: &ListParams,
        page: PageRequest,
    ) -> ApiResult<(Vec<Comment>, u64)> {
        Ok(state.db.list_comments(page)?)
    }

    fn retrieve(state: &AppState, id: &str) -> ApiResult<Comment> {
        state
            .db
            .get_comment(parse_id(id)?)?
            .ok_or(ApiError::NotFound)
    }

    fn create(
        state: &AppState,
        user: &Principal,
        ApiJson(input): Self::Input,
    ) -> ApiResult<Comment> {
        let changes = validate(state, input, false)?;
        let (Some(task_id), Some(text)) = (changes.task, changes.text) else {
            return Err(ApiError::field("text", MSG_REQUIRED));
        };
        let comment = state.db.create_comment(&task_id, &text)?;
        info!(
            comment_id = comment.id,
            task_id = %comment.task,
            user = %user.username,
            "Comment created"
        );
        Ok(comment)
    }

    fn update(
        state: &AppState,
        user: &Principal,
        id: &str,
        ApiJson(input): Self::Input,
        partial: bool,
    ) -> ApiResult<Comment> {
        let comment_id = parse_id(id)?;
        if state.db.get_comment(comment_id)?.is_none() {
            return Err(ApiError::NotFound);
        }
        let changes = validate(state, input, partial)?;
        let comment = state.db.update_comment(comment_id, &changes)?;
        info!(comment_id, user = %user.username, "Comment updated");
        Ok(comment)
    }

    fn destroy(state: &AppState, user: &Principal, id: &str) -> ApiResult<()> {
        let comment_id = parse_id(id)?;
        state.db.delete_comment(comment_id)?;
        info!(comment_id, user = %user.username, "Comment deleted");
        Ok(())
    }
}
