//! Dispatch command endpoints.
//!
//! - `POST /task-dispatch/create`       create or answer conversationally
//! - `POST /task-dispatch/refactor`     rewrite a task (async side-effect)
//! - `POST /task-dispatch/chat`         user reply to a waiting task
//! - `POST /task-dispatch/run/:task_id` publish straight to running-tasks

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use ad_domain::{ChatRole, McpServerInfos};
use ad_store::{Chat, Task};

use crate::engine::{CreateOutcome, CreateTaskRequest};
use crate::scheduler::{TaskMessage, RUNNING_TOPIC};
use crate::state::AppState;

use super::error_response;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /task-dispatch/create
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateTaskBody {
    pub owner: String,
    pub original_user_input: String,
    #[serde(default = "d_timezone")]
    pub owner_timezone: String,
    pub session_id: String,
    #[serde(default)]
    pub mcp_server_infos: McpServerInfos,
}

fn d_timezone() -> String {
    "UTC".into()
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskBody>,
) -> impl IntoResponse {
    let request = CreateTaskRequest {
        owner: body.owner,
        original_user_input: body.original_user_input,
        owner_timezone: body.owner_timezone,
        session_id: body.session_id,
        mcp_server_infos: body.mcp_server_infos,
    };

    // The reply is 201 either way; a failed analysis degrades to a
    // conversational error string rather than an HTTP error.
    let result = match state.engine.create_task(request).await {
        Ok(CreateOutcome::Task(task)) => json!({ "result": task }),
        Ok(CreateOutcome::Reply(reply)) => json!({ "result": reply }),
        Err(err) => {
            tracing::error!(error = %err, "create_task failed");
            json!({ "result": err.to_string() })
        }
    };

    (StatusCode::CREATED, Json(result))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /task-dispatch/refactor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct RefactorTaskBody {
    pub task_id: i64,
    pub update_user_prompt: String,
}

pub async fn refactor_task(
    State(state): State<AppState>,
    Json(body): Json<RefactorTaskBody>,
) -> impl IntoResponse {
    // Kick the rewrite off asynchronously; its progress is visible through
    // the task state (UPDATING -> SCHEDULING) and the audit log.
    let engine = state.engine.clone();
    tokio::spawn(async move {
        let _ = engine.refactor_task(body.task_id, &body.update_user_prompt).await;
    });

    Json(json!({ "result": true }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /task-dispatch/chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct AddUserMessageBody {
    pub task_id: i64,
    pub message: String,
}

pub async fn add_user_message(
    State(state): State<AppState>,
    Json(body): Json<AddUserMessageBody>,
) -> axum::response::Response {
    // Persist the user's chat synchronously so the caller sees it echoed.
    let chat = async {
        let mut tx = state.store.begin().await?;
        Task::get(&mut *tx, body.task_id).await?;
        let chat = Chat::create(&mut *tx, body.task_id, ChatRole::User, &body.message).await?;
        tx.commit().await.map_err(ad_store::from_sql)?;
        Ok::<_, ad_domain::Error>(chat)
    }
    .await;

    let chat = match chat {
        Ok(chat) => chat,
        Err(err) => return error_response(err),
    };

    // The merge runs in the background; failures leave the task state
    // untouched and are audited by the engine.
    let engine = state.engine.clone();
    let message = body.message.clone();
    tokio::spawn(async move {
        let _ = engine.waiting_task(body.task_id, &message).await;
    });

    Json(json!({ "result": chat })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /task-dispatch/run/:task_id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn run_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> axum::response::Response {
    if let Err(err) = state
        .broker
        .send(RUNNING_TOPIC, TaskMessage { task_id })
        .await
    {
        return error_response(err);
    }
    (StatusCode::ACCEPTED, Json(json!({ "result": true }))).into_response()
}
