//! Workspace repository: the `{prd, process, result}` artefact of a task.

use sqlx::MySqlConnection;

use ad_domain::{Error, Result};

use crate::entities::Workspace;
use crate::{from_sql, last_insert_id};

const COLS: &str =
    "id, prd, process, result, created_at, updated_at, is_deleted, deleted_at";

impl Workspace {
    pub async fn create(conn: &mut MySqlConnection, prd: &str) -> Result<Workspace> {
        sqlx::query("INSERT INTO tasks_workspace (prd) VALUES (?)")
            .bind(prd)
            .execute(&mut *conn)
            .await
            .map_err(from_sql)?;
        let id = last_insert_id(conn).await?;
        Self::get(conn, id).await
    }

    pub async fn find(conn: &mut MySqlConnection, id: i64) -> Result<Option<Workspace>> {
        sqlx::query_as::<_, Workspace>(&format!(
            "SELECT {COLS} FROM tasks_workspace WHERE id = ? AND is_deleted = FALSE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(from_sql)
    }

    pub async fn get(conn: &mut MySqlConnection, id: i64) -> Result<Workspace> {
        Self::find(conn, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("workspace {id}")))
    }

    /// Rewrite the execution plan for the next round.
    pub async fn set_process(
        conn: &mut MySqlConnection,
        id: i64,
        process: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE tasks_workspace SET process = ? WHERE id = ? AND is_deleted = FALSE")
            .bind(process)
            .bind(id)
            .execute(conn)
            .await
            .map_err(from_sql)?;
        Ok(())
    }

    /// Record the final outcome when a task finishes.
    pub async fn set_result(
        conn: &mut MySqlConnection,
        id: i64,
        result: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE tasks_workspace SET result = ? WHERE id = ? AND is_deleted = FALSE")
            .bind(result)
            .bind(id)
            .execute(conn)
            .await
            .map_err(from_sql)?;
        Ok(())
    }

    /// Refactor path: replace the PRD and wipe derived artefacts.
    pub async fn reset_for_refactor(
        conn: &mut MySqlConnection,
        id: i64,
        prd: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE tasks_workspace SET prd = ?, process = NULL, result = NULL \
             WHERE id = ? AND is_deleted = FALSE",
        )
        .bind(prd)
        .bind(id)
        .execute(conn)
        .await
        .map_err(from_sql)?;
        Ok(())
    }
}
