//! User-driven task rewrite.

use ad_domain::{clock, Result, TaskState};
use ad_llm::{prompts, run_structured, LlmRequest, Phase, RefactorOutput};
use ad_store::{Task, Workspace};

use super::TaskEngine;

impl TaskEngine {
    /// Rewrite a task from an update prompt: freeze it, regenerate its
    /// identity, drop its accumulated chats/units/history, and hand it
    /// back to the scheduler. Failures leave the task frozen in UPDATING
    /// (audited) for operator replay.
    pub async fn refactor_task(&self, task_id: i64, update_user_prompt: &str) -> Result<()> {
        if let Err(err) = self.refactor_task_inner(task_id, update_user_prompt).await {
            tracing::error!(task_id, error = %err, "refactor_task failed, state not reset");
            self.audit_without_reset(task_id, &err).await;
            return Err(err);
        }
        Ok(())
    }

    async fn refactor_task_inner(&self, task_id: i64, update_user_prompt: &str) -> Result<()> {
        // Freeze: UPDATING blocks all engine advancement and the round
        // pointers are forgotten.
        let (task, prd) = {
            let mut tx = self.store.begin().await?;
            let task = Task::get(&mut *tx, task_id).await?;
            if task.state.is_terminal() {
                return Err(ad_domain::Error::State(format!(
                    "task {task_id} is {} and cannot be refactored",
                    task.state
                )));
            }
            let workspace = Workspace::get(&mut *tx, task.workspace_id).await?;
            Task::begin_update(&mut *tx, task_id).await?;
            tx.commit().await.map_err(ad_store::from_sql)?;
            (task, workspace.prd)
        };
        self.notifier.task_refresh(&task.session_id);

        let (rewrite, tokens) = run_structured::<RefactorOutput>(
            self.llm.as_ref(),
            LlmRequest::new(
                Phase::Refactor,
                prompts::refactor_messages(&prd, update_user_prompt, &task.owner_timezone),
            ),
        )
        .await?;
        self.usage.record(&task.session_id, tokens);

        let expect_execute_time =
            clock::wall_clock_to_utc(&rewrite.expect_execute_time, &task.owner_timezone)?;

        {
            let mut tx = self.store.begin().await?;
            // History, chats, and units belong to the old task shape.
            Task::refactor(&mut *tx, task_id).await?;
            Task::apply_refactor(
                &mut *tx,
                task_id,
                &rewrite.name,
                &rewrite.keywords,
                expect_execute_time,
            )
            .await?;
            Workspace::reset_for_refactor(&mut *tx, task.workspace_id, &rewrite.prd).await?;
            self.write_audit(
                &mut *tx,
                &task.session_id,
                &rewrite.thinking,
                &format!("task refactored: {}", rewrite.name),
                &tokens,
            )
            .await?;
            tx.commit().await.map_err(ad_store::from_sql)?;
        }
        self.notifier.task_refresh(&task.session_id);

        self.call_soon(task_id).await
    }
}
