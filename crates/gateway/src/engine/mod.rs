//! The task engine: the state machine that drives a task from creation
//! through rounds of unit execution to a terminal state.
//!
//! The engine is stateless; it owns nothing but handles to its
//! collaborators (store, broker, LLM facade, notifier, usage ledger).
//! Each entrypoint corresponds to one queue consumer or one ingress call,
//! and each starts with a state guard so duplicate deliveries are safe.

mod create;
mod execute;
mod refactor;
mod review;
mod running;
mod waiting;

pub use create::{CreateOutcome, CreateTaskRequest};

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use ad_broker::Broker;
use ad_domain::{Result, TaskState};
use ad_llm::{ChatContext, StructuredLlm, TokenUsage, UnitContext, UsageLedger};
use ad_notify::SessionNotifier;
use ad_store::{AuditLog, Chat, Store, Task, Unit};

use crate::scheduler::{TaskMessage, READY_TOPIC};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TaskEngine {
    pub(crate) store: Store,
    pub(crate) broker: Arc<Broker>,
    pub(crate) llm: Arc<dyn StructuredLlm>,
    pub(crate) notifier: Arc<SessionNotifier>,
    pub(crate) usage: Arc<UsageLedger>,
}

impl TaskEngine {
    pub fn new(
        store: Store,
        broker: Arc<Broker>,
        llm: Arc<dyn StructuredLlm>,
        notifier: Arc<SessionNotifier>,
        usage: Arc<UsageLedger>,
    ) -> Self {
        Self {
            store,
            broker,
            llm,
            notifier,
            usage,
        }
    }

    // ── call_soon ───────────────────────────────────────────────────

    /// Push a due task onto the ready topic ahead of the admission sweep.
    ///
    /// Only admissible states are promoted; a task that is already
    /// enqueued (or anything else) is left alone, which makes the call
    /// idempotent. A task that is not yet due stays put for the admission
    /// producer.
    pub async fn call_soon(&self, task_id: i64) -> Result<()> {
        let promoted = {
            let mut tx = self.store.begin().await?;
            let task = Task::get(&mut *tx, task_id).await?;

            if !task.state.is_admissible() {
                tracing::debug!(task_id, state = %task.state, "call_soon: nothing to do");
                return Ok(());
            }
            if task.expect_execute_time > Utc::now() {
                tracing::debug!(task_id, "call_soon: not due yet, admission will pick it up");
                return Ok(());
            }

            Task::set_queuing(&mut *tx, task_id).await?;
            tx.commit().await.map_err(ad_store::from_sql)?;
            task
        };

        self.notifier.task_refresh(&promoted.session_id);
        self.broker.send(READY_TOPIC, TaskMessage { task_id }).await?;
        tracing::info!(task_id, "task enqueued on ready topic");
        Ok(())
    }

    // ── Failure path ────────────────────────────────────────────────

    /// Terminal failure used by the execute/running paths: flip to FAILED
    /// (terminal states stay untouched), audit the error, and notify.
    pub(crate) async fn fail_task(&self, task_id: i64, err: &ad_domain::Error) {
        let failed = async {
            let mut tx = self.store.begin().await?;
            let Some(task) = Task::find(&mut *tx, task_id).await? else {
                return Ok(None);
            };
            if task.state.is_terminal() {
                return Ok(None);
            }

            Task::set_state(&mut *tx, task_id, TaskState::Failed).await?;
            self.write_audit(
                &mut *tx,
                &task.session_id,
                &format!("{err}"),
                &format!("task {task_id} failed"),
                &TokenUsage::default(),
            )
            .await?;
            tx.commit().await.map_err(ad_store::from_sql)?;
            Ok::<_, ad_domain::Error>(Some(task))
        }
        .await;

        match failed {
            Ok(Some(task)) => {
                self.notifier.task_result_notify(
                    &task.session_id,
                    task_id,
                    &task.name,
                    TaskState::Failed,
                );
                self.notifier.task_refresh(&task.session_id);
            }
            Ok(None) => {}
            Err(inner) => {
                tracing::error!(task_id, error = %inner, "failed to record task failure");
            }
        }
    }

    // ── Audit ───────────────────────────────────────────────────────

    pub(crate) async fn write_audit(
        &self,
        conn: &mut sqlx::MySqlConnection,
        session_id: &str,
        thinking: &str,
        message: &str,
        tokens: &TokenUsage,
    ) -> Result<()> {
        let blob = audit_blob(thinking, message, tokens);
        tracing::info!(session_id, message, "audit");
        AuditLog::create(conn, session_id, &blob).await?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pure helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The JSON body of an audit row.
pub(crate) fn audit_blob(thinking: &str, message: &str, tokens: &TokenUsage) -> String {
    json!({
        "thinking": thinking,
        "message": message,
        "tokens": {
            "input_tokens": tokens.input_tokens,
            "output_tokens": tokens.output_tokens,
            "cached_tokens": tokens.cached_tokens,
        },
    })
    .to_string()
}

/// What a ready worker does with a task that left the QUEUING state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GuardAction {
    /// Normal path: claim the task and run the round.
    Proceed,
    /// Duplicate delivery, user cancellation, or terminal state.
    Drop,
    /// Admissible again (e.g. reclaimed by review): re-arm via call_soon.
    Rearm,
}

pub(crate) fn ready_guard(state: TaskState) -> GuardAction {
    match state {
        TaskState::Queuing => GuardAction::Proceed,
        TaskState::Initial | TaskState::Scheduling => GuardAction::Rearm,
        // Cancelled/terminal, a concurrently running round, an in-flight
        // refactor, or a user wait: this delivery has nothing to do.
        TaskState::Cancelled
        | TaskState::Failed
        | TaskState::Finished
        | TaskState::Activating
        | TaskState::Updating
        | TaskState::Waiting => GuardAction::Drop,
    }
}

/// The JSON envelope stored in the assistant chat row and surfaced to the
/// user when a task pauses for input.
pub(crate) fn waiting_envelope(message: &str, replenish: &[String]) -> String {
    json!({ "message": message, "replenish": replenish }).to_string()
}

/// Recover `(message, replenish)` from a stored waiting envelope. A chat
/// written before the envelope format (or by hand) passes through as-is.
pub(crate) fn parse_waiting_envelope(raw: &str) -> (String, Vec<String>) {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) if value.get("message").is_some() => {
            let message = value["message"].as_str().unwrap_or(raw).to_string();
            let replenish = value["replenish"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            (message, replenish)
        }
        _ => (raw.to_string(), Vec::new()),
    }
}

pub(crate) fn unit_contexts(units: &[Unit]) -> Vec<UnitContext> {
    units
        .iter()
        .map(|unit| UnitContext {
            name: unit.name.clone(),
            objective: unit.objective.clone(),
            output: unit.output.clone().unwrap_or_default(),
            created_at: ad_domain::clock::format_utc(unit.created_at),
        })
        .collect()
}

pub(crate) fn chat_contexts(chats: &[Chat]) -> Vec<ChatContext> {
    chats
        .iter()
        .map(|chat| ChatContext {
            role: chat.role.as_str().to_string(),
            message: chat.message.clone(),
            created_at: ad_domain::clock::format_utc(chat.created_at),
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_guard_claims_only_queuing() {
        assert_eq!(ready_guard(TaskState::Queuing), GuardAction::Proceed);
    }

    #[test]
    fn ready_guard_drops_terminal_and_busy_states() {
        for state in [
            TaskState::Cancelled,
            TaskState::Failed,
            TaskState::Finished,
            TaskState::Activating,
            TaskState::Updating,
            TaskState::Waiting,
        ] {
            assert_eq!(ready_guard(state), GuardAction::Drop, "{state}");
        }
    }

    #[test]
    fn ready_guard_rearms_admissible_states() {
        assert_eq!(ready_guard(TaskState::Initial), GuardAction::Rearm);
        assert_eq!(ready_guard(TaskState::Scheduling), GuardAction::Rearm);
    }

    #[test]
    fn audit_blob_shape() {
        let blob = audit_blob(
            "because",
            "task created",
            &TokenUsage {
                input_tokens: 10,
                output_tokens: 2,
                cached_tokens: 1,
            },
        );
        let value: serde_json::Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(value["thinking"], "because");
        assert_eq!(value["message"], "task created");
        assert_eq!(value["tokens"]["input_tokens"], 10);
        assert_eq!(value["tokens"]["cached_tokens"], 1);
    }

    #[test]
    fn waiting_envelope_roundtrip() {
        let envelope = waiting_envelope(
            "confirm attendees",
            &["A".to_string(), "B".to_string()],
        );
        let (message, replenish) = parse_waiting_envelope(&envelope);
        assert_eq!(message, "confirm attendees");
        assert_eq!(replenish, vec!["A", "B"]);
    }

    #[test]
    fn waiting_envelope_tolerates_plain_text() {
        let (message, replenish) = parse_waiting_envelope("just a question");
        assert_eq!(message, "just a question");
        assert!(replenish.is_empty());
    }

    #[test]
    fn waiting_envelope_without_replenish() {
        let (message, replenish) = parse_waiting_envelope(r#"{"message":"m"}"#);
        assert_eq!(message, "m");
        assert!(replenish.is_empty());
    }
}
