//! HTTP surface: thin command receivers over the engine and the store.

mod audits;
mod dispatch;
mod tasks;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use ad_domain::Error;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        // ── Dispatch commands ─────────────────────────────────────────
        .route("/task-dispatch/create", post(dispatch::create_task))
        .route("/task-dispatch/refactor", post(dispatch::refactor_task))
        .route("/task-dispatch/chat", post(dispatch::add_user_message))
        .route("/task-dispatch/run/:task_id", post(dispatch::run_task))
        // ── Read surface ──────────────────────────────────────────────
        .route("/tasks", get(tasks::list_tasks))
        .route(
            "/tasks/:task_id",
            get(tasks::get_task).delete(tasks::delete_task),
        )
        .route("/tasks/:task_id/cancel", post(tasks::cancel_task))
        .route("/tasks/:task_id/units", get(tasks::list_units))
        .route("/tasks/:task_id/chats", get(tasks::list_chats))
        .route("/tasks/:task_id/histories", get(tasks::list_histories))
        .route("/audits-log/:session_id", get(audits::list_audits))
}

/// Map engine/store errors onto boundary responses. Engine failures that
/// already moved a task to FAILED never reach this path; what does is
/// lookups and validation.
pub(crate) fn error_response(err: Error) -> Response {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        tracing::error!(error = %err, "request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}
