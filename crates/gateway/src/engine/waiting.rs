//! User-reply ingress: merge an answer into the plan and re-queue.

use ad_domain::{ChatRole, Error, Result, TaskState};
use ad_llm::{prompts, run_structured, LlmRequest, MergeOutput, Phase, TokenUsage};
use ad_store::{Chat, Task, Workspace};

use super::{parse_waiting_envelope, TaskEngine};

impl TaskEngine {
    /// Handle the user's answer to a waiting task. On failure the task
    /// state is deliberately left as-is (audited instead) so an operator
    /// can replay the message.
    pub async fn waiting_task(&self, task_id: i64, user_message: &str) -> Result<()> {
        if let Err(err) = self.waiting_task_inner(task_id, user_message).await {
            tracing::error!(task_id, error = %err, "waiting_task failed, state not reset");
            self.audit_without_reset(task_id, &err).await;
            return Err(err);
        }
        Ok(())
    }

    async fn waiting_task_inner(&self, task_id: i64, user_message: &str) -> Result<()> {
        // Claim the reply: the task leaves WAITING immediately so a second
        // reply cannot race the merge.
        let (task, pending_question, process) = {
            let mut tx = self.store.begin().await?;
            let task = Task::get(&mut *tx, task_id).await?;
            if task.state.is_terminal() {
                tracing::info!(task_id, state = %task.state, "terminal task, ignoring reply");
                return Ok(());
            }

            let pending = Chat::last_message(&mut *tx, task_id, ChatRole::Assistant)
                .await?
                .ok_or_else(|| {
                    Error::State(format!("task {task_id} has no pending question"))
                })?;
            let workspace = Workspace::get(&mut *tx, task.workspace_id).await?;

            Task::set_state(&mut *tx, task_id, TaskState::Scheduling).await?;
            tx.commit().await.map_err(ad_store::from_sql)?;

            let (question, _replenish) = parse_waiting_envelope(&pending.message);
            (task, question, workspace.process.unwrap_or_default())
        };

        let (merged, tokens) = run_structured::<MergeOutput>(
            self.llm.as_ref(),
            LlmRequest::new(
                Phase::WaitingHandler,
                prompts::waiting_handler_messages(&process, &pending_question, user_message),
            ),
        )
        .await?;
        self.usage.record(&task.session_id, tokens);

        {
            let mut tx = self.store.begin().await?;
            Workspace::set_process(&mut *tx, task.workspace_id, &merged.process).await?;
            self.write_audit(
                &mut *tx,
                &task.session_id,
                &merged.thinking,
                &format!("plan updated from user reply: {user_message}"),
                &tokens,
            )
            .await?;
            tx.commit().await.map_err(ad_store::from_sql)?;
        }

        self.call_soon(task_id).await
    }

    /// Failure audit shared by the waiting and refactor paths.
    pub(crate) async fn audit_without_reset(&self, task_id: i64, err: &Error) {
        let audit = async {
            let mut tx = self.store.begin().await?;
            let Some(task) = Task::find(&mut *tx, task_id).await? else {
                return Ok(());
            };
            self.write_audit(
                &mut *tx,
                &task.session_id,
                &format!("{err}"),
                &format!("task {task_id}: handler failed, do not reset state"),
                &TokenUsage::default(),
            )
            .await?;
            tx.commit().await.map_err(ad_store::from_sql)?;
            Ok::<_, Error>(())
        }
        .await;

        if let Err(inner) = audit {
            tracing::error!(task_id, error = %inner, "failed to write failure audit");
        }
    }
}
