//! Audit-log repository: append-only observability rows.

use sqlx::MySqlConnection;

use ad_domain::Result;

use crate::entities::AuditLog;
use crate::paginator::{Page, PageRequest};
use crate::{from_sql, last_insert_id};

const COLS: &str =
    "id, session_id, message, created_at, updated_at, is_deleted, deleted_at";

impl AuditLog {
    pub async fn create(
        conn: &mut MySqlConnection,
        session_id: &str,
        message: &str,
    ) -> Result<i64> {
        sqlx::query("INSERT INTO audits_log (session_id, message) VALUES (?, ?)")
            .bind(session_id)
            .bind(message)
            .execute(&mut *conn)
            .await
            .map_err(from_sql)?;
        last_insert_id(conn).await
    }

    pub async fn page_by_session(
        conn: &mut MySqlConnection,
        session_id: &str,
        request: PageRequest,
    ) -> Result<Page<AuditLog>> {
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM audits_log WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&mut *conn)
                .await
                .map_err(from_sql)?;

        let items = sqlx::query_as::<_, AuditLog>(&format!(
            "SELECT {COLS} FROM audits_log \
             WHERE session_id = ? \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(session_id)
        .bind(request.limit())
        .bind(request.offset())
        .fetch_all(conn)
        .await
        .map_err(from_sql)?;

        Ok(Page::new(items, total, request))
    }
}
