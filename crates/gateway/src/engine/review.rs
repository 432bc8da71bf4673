//! Review-worker path: reclaim tasks a crashed worker left behind.

use ad_domain::{Result, TaskState};
use ad_llm::TokenUsage;
use ad_store::Task;

use super::TaskEngine;

impl TaskEngine {
    /// A task surfaced by the review sweep has been stuck in an active
    /// state past the staleness threshold: declare it dead.
    pub async fn review_task(&self, task_id: i64) -> Result<()> {
        let task = {
            let mut tx = self.store.begin().await?;
            let Some(task) = Task::find(&mut *tx, task_id).await? else {
                return Ok(());
            };
            // The worker may have finished between the sweep and this
            // delivery; only still-reviewable states are reclaimed.
            if !task.state.is_reviewable() {
                tracing::info!(task_id, state = %task.state, "review: task recovered, skipping");
                return Ok(());
            }

            Task::set_state(&mut *tx, task_id, TaskState::Failed).await?;
            let last_seen = task
                .lasted_execute_time
                .map(ad_domain::clock::format_utc)
                .unwrap_or_else(|| "never".into());
            self.write_audit(
                &mut *tx,
                &task.session_id,
                "",
                &format!(
                    "task {task_id} reclaimed by review: stuck in {} since {last_seen}",
                    task.state
                ),
                &TokenUsage::default(),
            )
            .await?;
            tx.commit().await.map_err(ad_store::from_sql)?;
            task
        };

        self.notifier.task_result_notify(
            &task.session_id,
            task_id,
            &task.name,
            TaskState::Failed,
        );
        self.notifier.task_refresh(&task.session_id);
        tracing::warn!(task_id, "task marked FAILED by review sweep");
        Ok(())
    }
}
