//! Task repository: admission, review, round bookkeeping, cascades, and
//! the listing surface.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{MySqlConnection, QueryBuilder};

use ad_domain::{keywords, Error, Result, TaskState};

use crate::entities::{Chat, History, NewTask, Task, TaskDetail};
use crate::paginator::{Page, PageRequest};
use crate::{from_sql, last_insert_id};

const COLS: &str = "id, session_id, workspace_id, owner, owner_timezone, name, \
                    original_user_input, keywords, mcp_server_infos, state, priority, \
                    expect_execute_time, lasted_execute_time, curr_round_id, \
                    prev_round_id, created_at, updated_at, is_deleted, deleted_at";

/// Embedded-relation window used by `get` and the paginator.
const RELATION_LIMIT: i64 = 10;

/// The admission claim. The ordering makes admission deterministic: oldest
/// due first, ties broken by priority then insertion order; SKIP LOCKED
/// keeps concurrent schedulers disjoint.
const DISPATCH_SELECT: &str = "SELECT id FROM tasks \
     WHERE is_deleted = FALSE \
       AND state IN ('initial', 'scheduled') \
       AND expect_execute_time < NOW() \
     ORDER BY expect_execute_time ASC, priority DESC, created_at ASC \
     FOR UPDATE SKIP LOCKED";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State buckets for listing filters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBucket {
    Waiting,
    Finished,
    /// Failed or cancelled.
    Failed,
    /// Activating, queuing, initial, or scheduling.
    InProgress,
}

impl StateBucket {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "finished" => Some(Self::Finished),
            "failed" => Some(Self::Failed),
            "in_progress" => Some(Self::InProgress),
            _ => None,
        }
    }

    pub fn states(self) -> &'static [TaskState] {
        match self {
            Self::Waiting => &[TaskState::Waiting],
            Self::Finished => &[TaskState::Finished],
            Self::Failed => &[TaskState::Failed, TaskState::Cancelled],
            Self::InProgress => &[
                TaskState::Activating,
                TaskState::Queuing,
                TaskState::Initial,
                TaskState::Scheduling,
            ],
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CRUD
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Task {
    pub async fn create(conn: &mut MySqlConnection, new: &NewTask) -> Result<Task> {
        let stored_keywords = keywords::join(&new.keywords).unwrap_or_default();
        sqlx::query(
            "INSERT INTO tasks (session_id, workspace_id, owner, owner_timezone, name, \
             original_user_input, keywords, mcp_server_infos, state, priority, \
             expect_execute_time) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'initial', ?, ?)",
        )
        .bind(&new.session_id)
        .bind(new.workspace_id)
        .bind(&new.owner)
        .bind(&new.owner_timezone)
        .bind(&new.name)
        .bind(&new.original_user_input)
        .bind(&stored_keywords)
        .bind(Json(&new.mcp_server_infos))
        .bind(new.priority)
        .bind(new.expect_execute_time)
        .execute(&mut *conn)
        .await
        .map_err(from_sql)?;
        let id = last_insert_id(conn).await?;
        Self::get(conn, id).await
    }

    pub async fn find(conn: &mut MySqlConnection, id: i64) -> Result<Option<Task>> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {COLS} FROM tasks WHERE id = ? AND is_deleted = FALSE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(from_sql)
    }

    pub async fn get(conn: &mut MySqlConnection, id: i64) -> Result<Task> {
        Self::find(conn, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))
    }

    /// Load a task with its most recent chats and histories embedded.
    pub async fn get_detail(conn: &mut MySqlConnection, id: i64) -> Result<TaskDetail> {
        let task = Self::get(conn, id).await?;
        let chats = Chat::recent_for_task(conn, id, RELATION_LIMIT).await?;
        let histories = History::recent_for_task(conn, id, RELATION_LIMIT).await?;
        Ok(TaskDetail {
            task,
            chats,
            histories,
        })
    }

    // ── State transitions ───────────────────────────────────────────

    pub async fn set_state(
        conn: &mut MySqlConnection,
        id: i64,
        state: TaskState,
    ) -> Result<()> {
        sqlx::query("UPDATE tasks SET state = ? WHERE id = ? AND is_deleted = FALSE")
            .bind(state.as_str())
            .bind(id)
            .execute(conn)
            .await
            .map_err(from_sql)?;
        Ok(())
    }

    /// Admission transition used by `call_soon`: mark enqueued and stamp
    /// the admission time.
    pub async fn set_queuing(conn: &mut MySqlConnection, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET state = 'enqueued', lasted_execute_time = NOW() \
             WHERE id = ? AND is_deleted = FALSE",
        )
        .bind(id)
        .execute(conn)
        .await
        .map_err(from_sql)?;
        Ok(())
    }

    /// Round rollover: remember the old round, install the fresh one.
    pub async fn set_rounds(
        conn: &mut MySqlConnection,
        id: i64,
        prev_round_id: Option<&str>,
        curr_round_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET prev_round_id = ?, curr_round_id = ? \
             WHERE id = ? AND is_deleted = FALSE",
        )
        .bind(prev_round_id)
        .bind(curr_round_id)
        .bind(id)
        .execute(conn)
        .await
        .map_err(from_sql)?;
        Ok(())
    }

    pub async fn set_expect_execute_time(
        conn: &mut MySqlConnection,
        id: i64,
        when: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET expect_execute_time = ? WHERE id = ? AND is_deleted = FALSE",
        )
        .bind(when)
        .bind(id)
        .execute(conn)
        .await
        .map_err(from_sql)?;
        Ok(())
    }

    /// First step of a refactor: freeze the task and forget its rounds.
    pub async fn begin_update(conn: &mut MySqlConnection, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET state = 'updating', curr_round_id = NULL, \
             prev_round_id = NULL, lasted_execute_time = NULL \
             WHERE id = ? AND is_deleted = FALSE",
        )
        .bind(id)
        .execute(conn)
        .await
        .map_err(from_sql)?;
        Ok(())
    }

    /// Final step of a refactor: install the regenerated identity and
    /// hand the task back to the scheduler. An empty keyword list leaves
    /// the stored column untouched.
    pub async fn apply_refactor(
        conn: &mut MySqlConnection,
        id: i64,
        name: &str,
        new_keywords: &[String],
        expect_execute_time: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET name = ?, keywords = COALESCE(?, keywords), \
             expect_execute_time = ?, state = 'scheduled' \
             WHERE id = ? AND is_deleted = FALSE",
        )
        .bind(name)
        .bind(keywords::join(new_keywords))
        .bind(expect_execute_time)
        .bind(id)
        .execute(conn)
        .await
        .map_err(from_sql)?;
        Ok(())
    }

    // ── Admission and review ────────────────────────────────────────

    /// Atomically claim every due task: select with SKIP LOCKED, flip the
    /// claimed rows to enqueued, and return their ids. Must run inside a
    /// transaction; concurrent schedulers get disjoint sets.
    pub async fn get_dispatch_tasks_id(conn: &mut MySqlConnection) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(DISPATCH_SELECT)
            .fetch_all(&mut *conn)
            .await
            .map_err(from_sql)?;
        let ids: Vec<i64> = rows.into_iter().map(|(id,)| id).collect();

        if ids.is_empty() {
            return Ok(ids);
        }

        let mut qb = QueryBuilder::new(
            "UPDATE tasks SET state = 'enqueued', lasted_execute_time = NOW() WHERE id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in &ids {
            sep.push_bind(id);
        }
        qb.push(")");
        qb.build().execute(conn).await.map_err(from_sql)?;

        Ok(ids)
    }

    /// Tasks that have sat in enqueued/activating past the staleness
    /// threshold: a crashed worker's leftovers.
    pub async fn get_review_tasks_id(
        conn: &mut MySqlConnection,
        stale_minutes: i64,
    ) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM tasks \
             WHERE is_deleted = FALSE \
               AND state IN ('activating', 'enqueued') \
               AND lasted_execute_time < NOW() - INTERVAL ? MINUTE",
        )
        .bind(stale_minutes)
        .fetch_all(conn)
        .await
        .map_err(from_sql)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    // ── Cascades ────────────────────────────────────────────────────

    /// Refactor cascade: soft-delete chats, units, and history; the task
    /// and its workspace survive.
    pub async fn refactor(conn: &mut MySqlConnection, task_id: i64) -> Result<()> {
        for table in ["tasks_chat", "tasks_unit", "tasks_history"] {
            sqlx::query(&format!(
                "UPDATE {table} SET is_deleted = TRUE, deleted_at = NOW() \
                 WHERE task_id = ? AND is_deleted = FALSE"
            ))
            .bind(task_id)
            .execute(&mut *conn)
            .await
            .map_err(from_sql)?;
        }
        Ok(())
    }

    /// Full delete cascade: workspace, relations, then the task itself.
    pub async fn delete(conn: &mut MySqlConnection, task: &Task) -> Result<()> {
        sqlx::query(
            "UPDATE tasks_workspace SET is_deleted = TRUE, deleted_at = NOW() \
             WHERE id = ? AND is_deleted = FALSE",
        )
        .bind(task.workspace_id)
        .execute(&mut *conn)
        .await
        .map_err(from_sql)?;

        Self::refactor(conn, task.id).await?;

        sqlx::query(
            "UPDATE tasks SET is_deleted = TRUE, deleted_at = NOW() WHERE id = ?",
        )
        .bind(task.id)
        .execute(conn)
        .await
        .map_err(from_sql)?;
        Ok(())
    }

    /// True if a live task still references the workspace.
    pub async fn workspace_has_bind(
        conn: &mut MySqlConnection,
        workspace_id: i64,
    ) -> Result<bool> {
        let (bound,): (bool,) = sqlx::query_as(
            "SELECT EXISTS( \
               SELECT 1 FROM tasks WHERE workspace_id = ? AND is_deleted = FALSE \
             )",
        )
        .bind(workspace_id)
        .fetch_one(conn)
        .await
        .map_err(from_sql)?;
        Ok(bound)
    }

    // ── Listing surface ─────────────────────────────────────────────

    /// Tasks of the given sessions, newest first, optionally filtered to
    /// a state bucket.
    pub async fn by_session_ids(
        conn: &mut MySqlConnection,
        session_ids: &[String],
        bucket: Option<StateBucket>,
    ) -> Result<Vec<Task>> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::new(format!(
            "SELECT {COLS} FROM tasks WHERE is_deleted = FALSE AND session_id IN ("
        ));
        let mut sep = qb.separated(", ");
        for sid in session_ids {
            sep.push_bind(sid);
        }
        qb.push(")");

        if let Some(bucket) = bucket {
            qb.push(" AND state IN (");
            let mut sep = qb.separated(", ");
            for state in bucket.states() {
                sep.push_bind(state.as_str());
            }
            qb.push(")");
        }

        qb.push(" ORDER BY created_at DESC");

        qb.build_query_as().fetch_all(conn).await.map_err(from_sql)
    }

    pub async fn count_by_state(
        conn: &mut MySqlConnection,
        session_ids: &[String],
        state: TaskState,
    ) -> Result<i64> {
        if session_ids.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::new(
            "SELECT COUNT(*) FROM tasks WHERE is_deleted = FALSE AND state = ",
        );
        qb.push_bind(state.as_str());
        qb.push(" AND session_id IN (");
        let mut sep = qb.separated(", ");
        for sid in session_ids {
            sep.push_bind(sid);
        }
        qb.push(")");

        let (count,): (i64,) = qb
            .build_query_as()
            .fetch_one(conn)
            .await
            .map_err(from_sql)?;
        Ok(count)
    }

    /// Natural-language fulltext search over the keywords column, ordered
    /// by relevance.
    pub async fn search_by_keywords(
        conn: &mut MySqlConnection,
        session_ids: &[String],
        query: &str,
    ) -> Result<Vec<Task>> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::new(format!(
            "SELECT {COLS} FROM tasks WHERE is_deleted = FALSE AND session_id IN ("
        ));
        let mut sep = qb.separated(", ");
        for sid in session_ids {
            sep.push_bind(sid);
        }
        qb.push(") AND MATCH(keywords) AGAINST (");
        qb.push_bind(query);
        qb.push(" IN NATURAL LANGUAGE MODE) ORDER BY MATCH(keywords) AGAINST (");
        qb.push_bind(query);
        qb.push(" IN NATURAL LANGUAGE MODE) DESC");

        qb.build_query_as().fetch_all(conn).await.map_err(from_sql)
    }

    /// Paginated listing with embedded recent chats and histories, loaded
    /// in one ranked window query per relation.
    pub async fn page(
        conn: &mut MySqlConnection,
        request: PageRequest,
    ) -> Result<Page<TaskDetail>> {
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE is_deleted = FALSE")
                .fetch_one(&mut *conn)
                .await
                .map_err(from_sql)?;

        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {COLS} FROM tasks WHERE is_deleted = FALSE \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(request.limit())
        .bind(request.offset())
        .fetch_all(&mut *conn)
        .await
        .map_err(from_sql)?;

        let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
        let mut chats = Chat::recent_for_tasks(conn, &ids, RELATION_LIMIT).await?;
        let mut histories = History::recent_for_tasks(conn, &ids, RELATION_LIMIT).await?;

        let items = tasks
            .into_iter()
            .map(|task| {
                let id = task.id;
                TaskDetail {
                    task,
                    chats: chats.remove(&id).unwrap_or_default(),
                    histories: histories.remove(&id).unwrap_or_default(),
                }
            })
            .collect();

        Ok(Page::new(items, total, request))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_select_claims_with_skip_locked() {
        assert!(DISPATCH_SELECT.contains("FOR UPDATE SKIP LOCKED"));
        assert!(DISPATCH_SELECT.contains("state IN ('initial', 'scheduled')"));
        assert!(DISPATCH_SELECT.contains("expect_execute_time < NOW()"));
    }

    #[test]
    fn dispatch_select_ordering() {
        let order = DISPATCH_SELECT
            .split("ORDER BY")
            .nth(1)
            .expect("ordering clause");
        assert!(order.contains("expect_execute_time ASC"));
        assert!(order.contains("priority DESC"));
        assert!(order.contains("created_at ASC"));
    }

    #[test]
    fn state_bucket_parsing() {
        assert_eq!(StateBucket::parse("waiting"), Some(StateBucket::Waiting));
        assert_eq!(StateBucket::parse("finished"), Some(StateBucket::Finished));
        assert_eq!(StateBucket::parse("failed"), Some(StateBucket::Failed));
        assert_eq!(
            StateBucket::parse("in_progress"),
            Some(StateBucket::InProgress)
        );
        assert_eq!(StateBucket::parse("queued"), None);
    }

    #[test]
    fn failed_bucket_includes_cancelled() {
        let states = StateBucket::Failed.states();
        assert!(states.contains(&TaskState::Failed));
        assert!(states.contains(&TaskState::Cancelled));
    }

    #[test]
    fn in_progress_bucket_matches_domain_predicate() {
        for state in StateBucket::InProgress.states() {
            assert!(state.is_in_progress());
        }
    }
}
