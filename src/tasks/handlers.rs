use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::gate::{session_gate, AuthUser},
    error::AppError,
    state::AppState,
    tasks::{
        dto::{ListTasksQuery, MessageResponse, TaskListResponse, TaskResponse},
        validation,
    },
};

pub fn task_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), session_gate))
}

// A malformed id can never match a row, so it gets the same 404.
fn task_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound)
}

fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    payload.map(|Json(v)| v).map_err(AppError::from)
}

#[instrument(skip(state, q))]
pub async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    q: Result<Query<ListTasksQuery>, QueryRejection>,
) -> Result<Json<TaskListResponse>, AppError> {
    let Query(q) = q?;
    let filter = validation::list_filter(q.status.as_deref(), q.search.as_deref())?;
    let tasks = state.tasks.list(user_id, &filter).await?;
    Ok(Json(TaskListResponse { tasks }))
}

#[instrument(skip(state, payload))]
pub async fn create_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskResponse>), AppError> {
    let new_task = validation::new_task(&json_body(payload)?)?;
    let task = state.tasks.create(user_id, new_task).await?;
    info!(%user_id, task_id = %task.id, "task created");
    Ok((StatusCode::CREATED, Json(TaskResponse { task })))
}

#[instrument(skip(state))]
pub async fn get_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, AppError> {
    let id = task_id(&id)?;
    let task = state.tasks.find(user_id, id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(TaskResponse { task }))
}

#[instrument(skip(state, payload))]
pub async fn update_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<TaskResponse>, AppError> {
    let id = task_id(&id)?;
    // ownership is settled before the body is looked at
    if state.tasks.find(user_id, id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    let patch = validation::task_patch(&json_body(payload)?)?;
    let task = state
        .tasks
        .update(user_id, id, patch)
        .await?
        .ok_or(AppError::NotFound)?;
    info!(%user_id, task_id = %task.id, "task updated");
    Ok(Json(TaskResponse { task }))
}

#[instrument(skip(state))]
pub async fn delete_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = task_id(&id)?;
    if !state.tasks.delete(user_id, id).await? {
        return Err(AppError::NotFound);
    }
    info!(%user_id, task_id = %id, "task deleted");
    Ok(Json(MessageResponse {
        message: "Task deleted successfully".into(),
    }))
}
