//! Generic REST resource plumbing.
//!
//! Each resource implements [`Resource`] with plain synchronous storage
//! calls; [`resource_routes`] wires the standard list/create/retrieve/
//! update/partial-update/destroy handlers under `/{NAME}/` and
//! `/{NAME}/{id}/`.

use axum::Json;
use axum::Router;
use axum::extract::{Extension, FromRequest, Path, Query, State};
use axum::http::{StatusCode, Uri};
use axum::routing::get;
use serde::Serialize;

use super::{AppState, method_not_allowed};
use crate::error::ApiResult;
use crate::query::{ListParams, Page, PageRequest};
use crate::types::Principal;

pub trait Resource: Send + Sync + 'static {
    /// Collection path segment, e.g. `tasks`.
    const NAME: &'static str;

    type Record: Serialize + Send + 'static;
    type Input: FromRequest<AppState> + Send + 'static;

    /// One page of records and the total count before pagination.
    fn list(
        state: &AppState,
        params: &ListParams,
        page: PageRequest,
    ) -> ApiResult<(Vec<Self::Record>, u64)>;

    fn retrieve(state: &AppState, id: &str) -> ApiResult<Self::Record>;

    fn create(state: &AppState, user: &Principal, input: Self::Input) -> ApiResult<Self::Record>;

    /// Full (`partial == false`) or partial update.
    fn update(
        state: &AppState,
        user: &Principal,
        id: &str,
        input: Self::Input,
        partial: bool,
    ) -> ApiResult<Self::Record>;

    fn destroy(state: &AppState, user: &Principal, id: &str) -> ApiResult<()>;
}

/// Collection URL of a resource.
pub fn collection_path<R: Resource>() -> String {
    format!("/{}/", R::NAME)
}

/// Routes for one resource. Unsupported methods answer 405.
pub fn resource_routes<R: Resource>() -> Router<AppState> {
    Router::new()
        .route(
            &collection_path::<R>(),
            get(list::<R>)
                .post(create::<R>)
                .fallback(method_not_allowed),
        )
        .route(
            &format!("/{}/{{id}}/", R::NAME),
            get(retrieve::<R>)
                .put(replace::<R>)
                .patch(modify::<R>)
                .delete(destroy::<R>)
                .fallback(method_not_allowed),
        )
}

async fn list<R: Resource>(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
    uri: Uri,
) -> ApiResult<Json<Page<R::Record>>> {
    let params = ListParams::new(pairs);
    let page = params.page(state.page_size);
    let (results, count) = R::list(&state, &params, page)?;
    Ok(Json(Page::new(results, count, page, &params, uri.path())))
}

async fn create<R: Resource>(
    State(state): State<AppState>,
    Extension(user): Extension<Principal>,
    input: R::Input,
) -> ApiResult<(StatusCode, Json<R::Record>)> {
    let record = R::create(&state, &user, input)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn retrieve<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<R::Record>> {
    Ok(Json(R::retrieve(&state, &id)?))
}

async fn replace<R: Resource>(
    State(state): State<AppState>,
    Extension(user): Extension<Principal>,
    Path(id): Path<String>,
    input: R::Input,
) -> ApiResult<Json<R::Record>> {
    Ok(Json(R::update(&state, &user, &id, input, false)?))
}

async fn modify<R: Resource>(
    State(state): State<AppState>,
    Extension(user): Extension<Principal>,
    Path(id): Path<String>,
    input: R::Input,
) -> ApiResult<Json<R::Record>> {
    Ok(Json(R::update(&state, &user, &id, input, true)?))
}

async fn destroy<R: Resource>(
    State(state): State<AppState>,
    Extension(user): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    R::destroy(&state, &user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
