//! Chat repository: messages exchanged between a task and its user.

use std::collections::HashMap;

use sqlx::{MySqlConnection, QueryBuilder};

use ad_domain::{ChatRole, Error, Result};

use crate::entities::Chat;
use crate::paginator::{Page, PageRequest};
use crate::{from_sql, last_insert_id};

const COLS: &str =
    "id, task_id, role, message, created_at, updated_at, is_deleted, deleted_at";

impl Chat {
    pub async fn create(
        conn: &mut MySqlConnection,
        task_id: i64,
        role: ChatRole,
        message: &str,
    ) -> Result<Chat> {
        sqlx::query("INSERT INTO tasks_chat (task_id, role, message) VALUES (?, ?, ?)")
            .bind(task_id)
            .bind(role.as_str())
            .bind(message)
            .execute(&mut *conn)
            .await
            .map_err(from_sql)?;
        let id = last_insert_id(conn).await?;
        Self::get(conn, id).await
    }

    pub async fn get(conn: &mut MySqlConnection, id: i64) -> Result<Chat> {
        sqlx::query_as::<_, Chat>(&format!(
            "SELECT {COLS} FROM tasks_chat WHERE id = ? AND is_deleted = FALSE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(from_sql)?
        .ok_or_else(|| Error::NotFound(format!("chat {id}")))
    }

    /// The most recent live chat for `(task, role)`, if any.
    pub async fn last_message(
        conn: &mut MySqlConnection,
        task_id: i64,
        role: ChatRole,
    ) -> Result<Option<Chat>> {
        sqlx::query_as::<_, Chat>(&format!(
            "SELECT {COLS} FROM tasks_chat \
             WHERE task_id = ? AND role = ? AND is_deleted = FALSE \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(task_id)
        .bind(role.as_str())
        .fetch_optional(conn)
        .await
        .map_err(from_sql)
    }

    /// The `limit` most recent chats of one task, in ascending order.
    pub async fn recent_for_task(
        conn: &mut MySqlConnection,
        task_id: i64,
        limit: i64,
    ) -> Result<Vec<Chat>> {
        let mut chats = sqlx::query_as::<_, Chat>(&format!(
            "SELECT {COLS} FROM tasks_chat \
             WHERE task_id = ? AND is_deleted = FALSE \
             ORDER BY created_at DESC LIMIT ?"
        ))
        .bind(task_id)
        .bind(limit)
        .fetch_all(conn)
        .await
        .map_err(from_sql)?;
        chats.reverse();
        Ok(chats)
    }

    /// Batch variant of [`recent_for_task`]: the `limit` most recent chats
    /// of each listed task, via a ranked window over all of them.
    pub async fn recent_for_tasks(
        conn: &mut MySqlConnection,
        task_ids: &[i64],
        limit: i64,
    ) -> Result<HashMap<i64, Vec<Chat>>> {
        if task_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb = QueryBuilder::new(
            "SELECT * FROM ( \
               SELECT c.*, ROW_NUMBER() OVER ( \
                 PARTITION BY c.task_id ORDER BY c.created_at DESC \
               ) AS rn \
               FROM tasks_chat c WHERE c.is_deleted = FALSE AND c.task_id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in task_ids {
            sep.push_bind(id);
        }
        qb.push(") ) ranked WHERE ranked.rn <= ");
        qb.push_bind(limit);
        qb.push(" ORDER BY ranked.task_id, ranked.created_at ASC");

        let rows: Vec<Chat> = qb
            .build_query_as()
            .fetch_all(conn)
            .await
            .map_err(from_sql)?;

        let mut grouped: HashMap<i64, Vec<Chat>> = HashMap::new();
        for chat in rows {
            grouped.entry(chat.task_id).or_default().push(chat);
        }
        Ok(grouped)
    }

    pub async fn page_by_task(
        conn: &mut MySqlConnection,
        task_id: i64,
        request: PageRequest,
    ) -> Result<Page<Chat>> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks_chat WHERE task_id = ? AND is_deleted = FALSE",
        )
        .bind(task_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(from_sql)?;

        let items = sqlx::query_as::<_, Chat>(&format!(
            "SELECT {COLS} FROM tasks_chat \
             WHERE task_id = ? AND is_deleted = FALSE \
             ORDER BY created_at ASC LIMIT ? OFFSET ?"
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
