//! Unit repository: the sub-steps of a round.

use sqlx::MySqlConnection;

use ad_domain::{Error, Result};

use crate::entities::{NewUnit, Unit};
use crate::paginator::{Page, PageRequest};
use crate::{from_sql, last_insert_id};

const COLS: &str = "id, task_id, round_id, name, objective, output, state, \
                    created_at, updated_at, is_deleted, deleted_at";

impl Unit {
    pub async fn create(conn: &mut MySqlConnection, new: &NewUnit) -> Result<Unit> {
        sqlx::query(
            "INSERT INTO tasks_unit (task_id, round_id, name, objective, state) \
             VALUES (?, ?, ?, ?, 'CREATED')",
        )
        .bind(new.task_id)
        .bind(&new.round_id)
        .bind(&new.name)
        .bind(&new.objective)
        .execute(&mut *conn)
        .await
        .map_err(from_sql)?;
        let id = last_insert_id(conn).await?;
        Self::get(conn, id).await
    }

    pub async fn get(conn: &mut MySqlConnection, id: i64) -> Result<Unit> {
        sqlx::query_as::<_, Unit>(&format!(
            "SELECT {COLS} FROM tasks_unit WHERE id = ? AND is_deleted = FALSE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(from_sql)?
        .ok_or_else(|| Error::NotFound(format!("unit {id}")))
    }

    /// Terminal unit states are absorbing, so both transitions below guard
    /// on the state column instead of trusting the caller.
    pub async fn set_running(conn: &mut MySqlConnection, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE tasks_unit SET state = 'RUNNING' \
             WHERE id = ? AND state = 'CREATED' AND is_deleted = FALSE",
        )
        .bind(id)
        .execute(conn)
        .await
        .map_err(from_sql)?;
        Ok(())
    }

    pub async fn set_complete(
        conn: &mut MySqlConnection,
        id: i64,
        output: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE tasks_unit SET state = 'COMPLETE', output = ? \
             WHERE id = ? AND state NOT IN ('COMPLETE', 'CANCELLED') \
               AND is_deleted = FALSE",
        )
        .bind(output)
        .bind(id)
        .execute(conn)
        .await
        .map_err(from_sql)?;
        Ok(())
    }

    /// Ids of units in a round that still have work to do.
    pub async fn round_units_id(
        conn: &mut MySqlConnection,
        round_id: &str,
    ) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM tasks_unit \
             WHERE round_id = ? AND state NOT IN ('COMPLETE', 'CANCELLED') \
               AND is_deleted = FALSE",
        )
        .bind(round_id)
        .fetch_all(conn)
        .await
        .map_err(from_sql)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Completed units of a round, full rows.
    pub async fn round_units(
        conn: &mut MySqlConnection,
        round_id: &str,
    ) -> Result<Vec<Unit>> {
        sqlx::query_as::<_, Unit>(&format!(
            "SELECT {COLS} FROM tasks_unit \
             WHERE round_id = ? AND state = 'COMPLETE' AND is_deleted = FALSE"
        ))
        .bind(round_id)
        .fetch_all(conn)
        .await
        .map_err(from_sql)
    }

    /// Flip every non-terminal unit of a round to CANCELLED.
    pub async fn clear_round_units(
        conn: &mut MySqlConnection,
        round_id: &str,
    ) -> Result<u64> {
        let done = sqlx::query(
            "UPDATE tasks_unit SET state = 'CANCELLED' \
             WHERE round_id = ? AND state NOT IN ('COMPLETE', 'CANCELLED') \
               AND is_deleted = FALSE",
        )
        .bind(round_id)
        .execute(conn)
        .await
        .map_err(from_sql)?;
        Ok(done.rows_affected())
    }

    /// All completed units of a task across every round.
    pub async fn completed_by_task(
        conn: &mut MySqlConnection,
        task_id: i64,
    ) -> Result<Vec<Unit>> {
        sqlx::query_as::<_, Unit>(&format!(
            "SELECT {COLS} FROM tasks_unit \
             WHERE task_id = ? AND state = 'COMPLETE' AND is_deleted = FALSE \
             ORDER BY created_at ASC"
        ))
        .bind(task_id)
        .fetch_all(conn)
        .await
        .map_err(from_sql)
    }

    pub async fn page_by_task(
        conn: &mut MySqlConnection,
        task_id: i64,
        request: PageRequest,
    ) -> Result<Page<Unit>> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks_unit WHERE task_id = ? AND is_deleted = FALSE",
        )
        .bind(task_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(from_sql)?;

        let items = sqlx::query_as::<_, Unit>(&format!(
            "SELECT {COLS} FROM tasks_unit \
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
