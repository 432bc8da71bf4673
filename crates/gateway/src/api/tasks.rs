//! Task read surface: listings, detail, delete, cancel, and the
//! per-task relation pages.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use ad_domain::TaskState;
use ad_store::{Chat, History, PageRequest, Task, Unit};

use crate::state::AppState;

use super::error_response;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(request): Query<PageRequest>,
) -> Response {
    let page = async {
        let mut conn = state.store.acquire().await?;
        Task::page(&mut conn, request).await
    }
    .await;

    match page {
        Ok(page) => Json(json!({ "result": page })).into_response(),
        Err(err) => error_response(err),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /tasks/:task_id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Response {
    let detail = async {
        let mut conn = state.store.acquire().await?;
        Task::get_detail(&mut conn, task_id).await
    }
    .await;

    match detail {
        Ok(detail) => Json(json!({ "result": detail })).into_response(),
        Err(err) => error_response(err),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /tasks/:task_id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Response {
    let deleted = async {
        let mut tx = state.store.begin().await?;
        let task = Task::get(&mut *tx, task_id).await?;
        Task::delete(&mut *tx, &task).await?;
        tx.commit().await.map_err(ad_store::from_sql)?;
        Ok::<_, ad_domain::Error>(task)
    }
    .await;

    match deleted {
        Ok(task) => {
            state.notifier.task_refresh(&task.session_id);
            Json(json!({ "result": true })).into_response()
        }
        Err(err) => error_response(err),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /tasks/:task_id/cancel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Response {
    let cancelled = async {
        let mut tx = state.store.begin().await?;
        let task = Task::get(&mut *tx, task_id).await?;
        if task.state.is_terminal() {
            return Ok(None);
        }
        Task::set_state(&mut *tx, task_id, TaskState::Cancelled).await?;
        tx.commit().await.map_err(ad_store::from_sql)?;
        Ok::<_, ad_domain::Error>(Some(task))
    }
    .await;

    match cancelled {
        Ok(Some(task)) => {
            state.notifier.task_refresh(&task.session_id);
            Json(json!({ "result": true })).into_response()
        }
        Ok(None) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "task is already in a terminal state" })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-task relation pages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_units(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Query(request): Query<PageRequest>,
) -> Response {
    let page = async {
        let mut conn = state.store.acquire().await?;
        Unit::page_by_task(&mut conn, task_id, request).await
    }
    .await;

    match page {
        Ok(page) => Json(json!({ "result": page })).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn list_chats(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Query(request): Query<PageRequest>,
) -> Response {
    let page = async {
        let mut conn = state.store.acquire().await?;
        Chat::page_by_task(&mut conn, task_id, request).await
    }
    .await;

    match page {
        Ok(page) => Json(json!({ "result": page })).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn list_histories(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Query(request): Query<PageRequest>,
) -> Response {
    let page = async {
        let mut conn = state.store.acquire().await?;
        History::page_by_task(&mut conn, task_id, request).await
    }
    .await;

    match page {
        Ok(page) => Json(json!({ "result": page })).into_response(),
        Err(err) => error_response(err),
    }
}
