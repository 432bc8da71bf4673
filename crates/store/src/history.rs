//! History repository: one snapshot per planner state decision.

use std::collections::HashMap;

use sqlx::{MySqlConnection, QueryBuilder};

use ad_domain::{Result, TaskState};

use crate::entities::History;
use crate::paginator::{Page, PageRequest};
use crate::{from_sql, last_insert_id};

const COLS: &str =
    "id, task_id, state, process, thinking, created_at, updated_at, is_deleted, deleted_at";

impl History {
    pub async fn create(
        conn: &mut MySqlConnection,
        task_id: i64,
        state: TaskState,
        process: &str,
        thinking: &str,
    ) -> Result<i64> {
        sqlx::query(
            "INSERT INTO tasks_history (task_id, state, process, thinking) VALUES (?, ?, ?, ?)",
        )
        .bind(task_id)
        .bind(state.as_str())
        .bind(process)
        .bind(thinking)
        .execute(&mut *conn)
        .await
        .map_err(from_sql)?;
        last_insert_id(conn).await
    }

    /// The `limit` most recent snapshots of one task, ascending.
    pub async fn recent_for_task(
        conn: &mut MySqlConnection,
        task_id: i64,
        limit: i64,
    ) -> Result<Vec<History>> {
        let mut rows = sqlx::query_as::<_, History>(&format!(
            "SELECT {COLS} FROM tasks_history \
             WHERE task_id = ? AND is_deleted = FALSE \
             ORDER BY created_at DESC LIMIT ?"
        ))
        .bind(task_id)
        .bind(limit)
        .fetch_all(conn)
        .await
        .map_err(from_sql)?;
        rows.reverse();
        Ok(rows)
    }

    /// Batch variant: most recent `limit` snapshots per listed task.
    pub async fn recent_for_tasks(
        conn: &mut MySqlConnection,
        task_ids: &[i64],
        limit: i64,
    ) -> Result<HashMap<i64, Vec<History>>> {
        if task_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb = QueryBuilder::new(
            "SELECT * FROM ( \
               SELECT h.*, ROW_NUMBER() OVER ( \
                 PARTITION BY h.task_id ORDER BY h.created_at DESC \
               ) AS rn \
               FROM tasks_history h WHERE h.is_deleted = FALSE AND h.task_id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in task_ids {
            sep.push_bind(id);
        }
        qb.push(") ) ranked WHERE ranked.rn <= ");
        qb.push_bind(limit);
        qb.push(" ORDER BY ranked.task_id, ranked.created_at ASC");

        let rows: Vec<History> = qb
            .build_query_as()
            .fetch_all(conn)
            .await
            .map_err(from_sql)?;

        let mut grouped: HashMap<i64, Vec<History>> = HashMap::new();
        for row in rows {
            grouped.entry(row.task_id).or_default().push(row);
        }
        Ok(grouped)
    }

    pub async fn page_by_task(
        conn: &mut MySqlConnection,
        task_id: i64,
        request: PageRequest,
    ) -> Result<Page<History>> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks_history WHERE task_id = ? AND is_deleted = FALSE",
        )
        .bind(task_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(from_sql)?;

        let items = sqlx::query_as::<_, History>(&format!(
            "SELECT {COLS} FROM tasks_history \
             WHERE task_id = ? AND is_deleted = FALSE \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(task_id)
        .bind(request.limit())
        .bind(request.offset())
        .fetch_all(conn)
        .await
        .map_err(from_sql)?;

        Ok(Page::new(items, total, request))
    }
}
