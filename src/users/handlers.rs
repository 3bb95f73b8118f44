use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    state::AppState,
    users::{
        dto::{CreateUserRequest, UpdateUserRequest, UserView},
        error::ServiceResult,
        extract::{JsonBody, PathParam},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateUserRequest>,
) -> ServiceResult<(StatusCode, HeaderMap, Json<UserView>)> {
    let ctx = state.op_context();
    let user = state.users.create_user(&ctx, payload).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/v1/users/{}", user.id)) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(user)))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> ServiceResult<Json<Vec<UserView>>> {
    let ctx = state.op_context();
    Ok(Json(state.users.list_users(&ctx).await?))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<u64>,
) -> ServiceResult<Json<UserView>> {
    let ctx = state.op_context();
    Ok(Json(state.users.get_user(&ctx, id).await?))
}

#[instrument(skip(state, body))]
pub async fn update_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<u64>,
    JsonBody(mut body): JsonBody<UpdateUserRequest>,
) -> ServiceResult<Json<UserView>> {
    body.id = id;
    let ctx = state.op_context();
    Ok(Json(state.users.update_user(&ctx, body).await?))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<u64>,
) -> ServiceResult<StatusCode> {
    let ctx = state.op_context();
    state.users.delete_user(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
