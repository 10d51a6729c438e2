//! Task status endpoints

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::Task;
use crate::AppState;

/// Parse a task id from a URL segment
pub(crate) fn parse_task_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid task id: {}", raw)))
}

/// GET /status/:task_id
pub async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    let task_id = parse_task_id(&task_id)?;
    let task = state.store.get(task_id).await?;
    Ok(Json(task))
}

/// GET /tasks
///
/// Every known task, newest first.
pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<Json<Vec<Task>>> {
    Ok(Json(state.store.list().await?))
}

/// Build status routes
pub fn status_routes() -> Router<AppState> {
    Router::new()
        .route("/status/:task_id", get(get_status))
        .route("/tasks", get(list_tasks))
}
