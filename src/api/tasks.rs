//! `/tasks/` resource.

use tracing::info;

use super::AppState;
use super::extract::ApiJson;
use super::resource::Resource;
use crate::error::{ApiError, ApiResult};
use crate::query::{ListParams, PageRequest, TaskQuery};
use crate::types::{Principal, Task, TaskInput};

pub struct TaskResource;

impl Resource for TaskResource {
    const NAME: &'static str = "tasks";

    type Record = Task;
    type Input = ApiJson<TaskInput>;

    fn list(
        state: &AppState,
        params: &ListParams,
        page: PageRequest,
    ) -> ApiResult<(Vec<Task>, u64)> {
        let query = TaskQuery::from_params(params, page);
        Ok(state.db.query_tasks(&query)?)
    }

    fn retrieve(state: &AppState, id: &str) -> ApiResult<Task> {
        state.db.get_task(id)?.ok_or(ApiError::NotFound)
    }

    fn create(state: &AppState, user: &Principal, ApiJson(input): Self::Input) -> ApiResult<Task> {
        let draft = input.validate_new()?;
        let task = state.db.create_task(&draft)?;
        info!(task_id = %task.id, status = %task.status, user = %user.username, "Task created");
        Ok(task)
    }

    fn update(
        state: &AppState,
        user: &Principal,
        id: &str,
        ApiJson(input): Self::Input,
        partial: bool,
    ) -> ApiResult<Task> {
        if !state.db.task_exists(id)? {
            return Err(ApiError::NotFound);
        }
        let changes = input.validate_update(partial)?;
        let task = state.db.update_task(id, &changes)?;
        info!(task_id = %task.id, status = %task.status, user = %user.username, "Task updated");
        Ok(task)
    }

    fn destroy(state: &AppState, user: &Principal, id: &str) -> ApiResult<()> {
        let paths = state.db.delete_task(id)?;
        state.media.remove_all(&paths);
        info!(task_id = %id, files = paths.len(), user = %user.username, "Task deleted");
        Ok(())
    }
}
