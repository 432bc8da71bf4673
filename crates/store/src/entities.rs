//! Row types for the six persisted tables.
//!
//! Every table carries the common columns `(id, created_at, updated_at,
//! is_deleted, deleted_at)`; "live" rows are those with `is_deleted = 0`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

use ad_domain::{ChatRole, McpServerInfos, TaskState, UnitState};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: i64,
    pub session_id: String,
    pub workspace_id: i64,
    pub owner: String,
    pub owner_timezone: String,
    pub name: String,
    pub original_user_input: String,
    /// Comma-joined; see `ad_domain::keywords`.
    pub keywords: String,
    pub mcp_server_infos: Json<McpServerInfos>,
    #[sqlx(try_from = "String")]
    pub state: TaskState,
    pub priority: i64,
    pub expect_execute_time: DateTime<Utc>,
    /// Last admission instant; None until first admitted.
    pub lasted_execute_time: Option<DateTime<Utc>>,
    pub curr_round_id: Option<String>,
    pub prev_round_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub is_deleted: bool,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn keyword_list(&self) -> Vec<String> {
        ad_domain::keywords::split(&self.keywords)
    }
}

/// Insert payload for a new task. State always starts at Initial.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub session_id: String,
    pub workspace_id: i64,
    pub owner: String,
    pub owner_timezone: String,
    pub name: String,
    pub original_user_input: String,
    pub keywords: Vec<String>,
    pub mcp_server_infos: McpServerInfos,
    pub expect_execute_time: DateTime<Utc>,
    pub priority: i64,
}

/// A task with its most recent chats and histories attached.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    /// Most recent rows, returned in `created_at` ascending order.
    pub chats: Vec<Chat>,
    pub histories: Vec<History>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workspace
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Workspace {
    pub id: i64,
    /// Requirement document, written once at creation.
    pub prd: String,
    /// Execution plan, rewritten every round.
    pub process: Option<String>,
    /// Final outcome, written when the task finishes.
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub is_deleted: bool,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Unit
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Unit {
    pub id: i64,
    pub task_id: i64,
    pub round_id: String,
    pub name: String,
    pub objective: String,
    /// Filled when the unit completes.
    pub output: Option<String>,
    #[sqlx(try_from = "String")]
    pub state: UnitState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub is_deleted: bool,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewUnit {
    pub task_id: i64,
    pub round_id: String,
    pub name: String,
    pub objective: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Chat {
    pub id: i64,
    pub task_id: i64,
    #[sqlx(try_from = "String")]
    pub role: ChatRole,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub is_deleted: bool,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// History
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One snapshot per planner state decision.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct History {
    pub id: i64,
    pub task_id: i64,
    #[sqlx(try_from = "String")]
    pub state: TaskState,
    pub process: String,
    pub thinking: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub is_deleted: bool,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Audit log
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Append-only observability row. Never soft-deleted; the common columns
/// exist for schema uniformity only.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditLog {
    pub id: i64,
    pub session_id: String,
    /// JSON blob: `{thinking, message, tokens}` or `{thinking, task}`.
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub is_deleted: bool,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}
