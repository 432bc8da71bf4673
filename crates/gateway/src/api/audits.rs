//! Audit-log read surface.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use ad_store::{AuditLog, PageRequest};

use crate::state::AppState;

use super::error_response;

/// `GET /audits-log/:session_id`: the audit trail of one session,
/// newest first.
pub async fn list_audits(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(request): Query<PageRequest>,
) -> Response {
    let page = async {
        let mut conn = state.store.acquire().await?;
        AuditLog::page_by_session(&mut conn, &session_id, request).await
    }
    .await;

    match page {
        Ok(page) => Json(json!({ "result": page })).into_response(),
        Err(err) => error_response(err),
    }
}
