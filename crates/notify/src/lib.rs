//! `ad-notify`: fire-and-forget client for the external session service.
//!
//! The engine informs the session layer about task state changes so the
//! UI can refresh. None of these calls may abort the engine: the three
//! notification channels spawn their request and only log failures. The
//! one synchronous call is the session-info lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ad_domain::config::NotifierConfig;
use ad_domain::{Error, Result, TaskState};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Metadata the session service returns for a session id.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
}

/// Payload of the provision channel: a waiting task asking the user for
/// structured input.
#[derive(Debug, Clone, Serialize)]
pub struct TaskProvision {
    pub session_id: String,
    pub task_id: i64,
    pub task_name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub state: TaskState,
    pub replenish: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct TaskResult {
    session_id: String,
    task_id: i64,
    task_name: String,
    state: TaskState,
}

#[derive(Debug, Clone, Serialize)]
struct TaskRefresh {
    session_id: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Notifier
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionNotifier {
    http: reqwest::Client,
    /// None when no base URL is configured: every channel is a no-op.
    base_url: Option<String>,
}

impl SessionNotifier {
    pub fn from_config(cfg: &NotifierConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| Error::Notify(e.to_string()))?;

        let base_url = if cfg.base_url.is_empty() {
            None
        } else {
            Some(cfg.base_url.trim_end_matches('/').to_string())
        };

        Ok(Self { http, base_url })
    }

    /// Tell the session layer to refresh its task list.
    pub fn task_refresh(&self, session_id: &str) {
        self.post_and_forget(
            "session/task-refresh",
            TaskRefresh {
                session_id: session_id.to_string(),
            },
        );
    }

    /// Surface a waiting task's question and replenish items to the user.
    pub fn task_provision(&self, provision: TaskProvision) {
        self.post_and_forget("session/task-provision", provision);
    }

    /// Announce a terminal result (finished or failed).
    pub fn task_result_notify(
        &self,
        session_id: &str,
        task_id: i64,
        task_name: &str,
        state: TaskState,
    ) {
        self.post_and_forget(
            "session/task-result",
            TaskResult {
                session_id: session_id.to_string(),
                task_id,
                task_name: task_name.to_string(),
                state,
            },
        );
    }

    /// Synchronous lookup of the user/agent behind a session.
    pub async fn get_info_by_session_id(&self, session_id: &str) -> Result<SessionInfo> {
        let base = self
            .base_url
            .as_ref()
            .ok_or_else(|| Error::Notify("notifier is not configured".into()))?;

        let response = self
            .http
            .get(format!("{base}/session/{session_id}/info"))
            .send()
            .await
            .map_err(|e| Error::Notify(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Notify(format!(
                "session info lookup returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Notify(format!("bad session info payload: {e}")))
    }

    fn post_and_forget<T: Serialize + Send + 'static>(&self, path: &str, payload: T) {
        let Some(base) = &self.base_url else {
            tracing::debug!(path, "notifier disabled, dropping notification");
            return;
        };

        let url = format!("{base}/{path}");
        let http = self.http.clone();
        tokio::spawn(async move {
            match http.post(&url).json(&payload).send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(url = %url, status = %response.status(), "notification rejected");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "notification failed");
                }
            }
        });
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_payload_shape() {
        let provision = TaskProvision {
            session_id: "s1".into(),
            task_id: 7,
            task_name: "weekly report".into(),
            description: "confirm attendees".into(),
            created_at: Utc::now(),
            state: TaskState::Waiting,
            replenish: vec!["A".into(), "B".into()],
        };
        let json = serde_json::to_value(&provision).unwrap();
        assert_eq!(json["task_id"], 7);
        assert_eq!(json["state"], "waiting");
        assert_eq!(json["replenish"][1], "B");
    }

    #[test]
    fn session_info_parses_camel_case() {
        let info: SessionInfo =
            serde_json::from_str(r#"{"userId":"u1","agentId":"a1"}"#).unwrap();
        assert_eq!(info.user_id, "u1");
        assert_eq!(info.agent_id, "a1");
    }

    #[tokio::test]
    async fn disabled_notifier_drops_silently() {
        let notifier = SessionNotifier::from_config(&NotifierConfig::default()).unwrap();
        // No base URL configured: all channels are no-ops and the lookup
        // reports the misconfiguration.
        notifier.task_refresh("s1");
        let err = notifier.get_info_by_session_id("s1").await.unwrap_err();
        assert!(matches!(err, Error::Notify(_)));
    }
}
