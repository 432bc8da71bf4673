//! Running-worker path: a round has settled; fold its outputs into the
//! plan, decide the next state, and branch.

use ad_domain::{clock, Result, TaskState};
use ad_llm::{
    prompts, run_structured, LlmRequest, NextStateOutput, Phase, PlannerState,
    ResultOutput,
};
use ad_notify::TaskProvision;
use ad_store::{Chat, History, Task, Unit, Workspace};

use crate::scheduler::{TaskMessage, RUNNING_TOPIC};

use super::{chat_contexts, unit_contexts, waiting_envelope, TaskEngine};

impl TaskEngine {
    /// Entry point of the running consumer. A failure moves the task to
    /// FAILED with a full audit trail and is re-raised so the envelope
    /// lands on the dead-letter stream.
    pub async fn running_task(&self, task_id: i64) -> Result<()> {
        tracing::info!(task_id, "running worker picked up task");
        if let Err(err) = self.running_task_inner(task_id).await {
            tracing::error!(task_id, error = %err, "running_task failed");
            self.fail_task(task_id, &err).await;
            return Err(err);
        }
        Ok(())
    }

    async fn running_task_inner(&self, task_id: i64) -> Result<()> {
        let (task, workspace, curr_units, chats) = {
            let mut conn = self.store.acquire().await?;
            let Some(task) = Task::find(&mut conn, task_id).await? else {
                tracing::warn!(task_id, "task vanished, dropping running message");
                return Ok(());
            };

            // A refactor owns the task until it completes, and terminal
            // states absorb every late delivery.
            if task.state == TaskState::Updating {
                tracing::info!(task_id, "task is updating, skipping advancement");
                return Ok(());
            }
            if task.state.is_terminal() {
                tracing::info!(task_id, state = %task.state, "task is terminal, dropping");
                return Ok(());
            }

            let workspace = Workspace::get(&mut conn, task.workspace_id).await?;
            let curr_units = match task.curr_round_id.as_deref() {
                Some(round) => Unit::round_units(&mut conn, round).await?,
                None => Vec::new(),
            };
            let chats = Chat::recent_for_task(&mut conn, task_id, 10).await?;
            (task, workspace, curr_units, chats)
        };

        let process = workspace.process.clone().unwrap_or_default();

        let (verdict, tokens) = run_structured::<NextStateOutput>(
            self.llm.as_ref(),
            LlmRequest::new(
                Phase::NextState,
                prompts::next_state_messages(
                    &process,
                    &unit_contexts(&curr_units),
                    &chat_contexts(&chats),
                ),
            ),
        )
        .await?;
        self.usage.record(&task.session_id, tokens);

        let next_state = verdict.state.to_task_state();

        // Snapshot the decision and the rewritten plan.
        {
            let mut tx = self.store.begin().await?;
            History::create(&mut *tx, task_id, next_state, &verdict.process, &verdict.thinking)
                .await?;
            Workspace::set_process(&mut *tx, task.workspace_id, &verdict.process).await?;
            self.write_audit(
                &mut *tx,
                &task.session_id,
                &verdict.thinking,
                &format!("round settled, next state: {next_state}"),
                &tokens,
            )
            .await?;
            tx.commit().await.map_err(ad_store::from_sql)?;
        }

        match verdict.state {
            PlannerState::Activating => self.advance_next_round(&task).await?,
            PlannerState::Scheduling => self.reschedule(&task, &verdict).await?,
            PlannerState::Waiting => self.pause_for_user(&task, &verdict).await?,
            PlannerState::Finished => self.finish(&task, &workspace).await?,
            PlannerState::Failed => self.fail_by_planner(&task).await?,
        }

        self.notifier.task_refresh(&task.session_id);
        Ok(())
    }

    // ── Branches ────────────────────────────────────────────────────

    /// More work can run now: next round. The round rollover inside
    /// `generate_round` cancels this round's leftovers.
    async fn advance_next_round(&self, task: &Task) -> Result<()> {
        {
            let mut conn = self.store.acquire().await?;
            Task::set_state(&mut conn, task.id, TaskState::Activating).await?;
        }
        self.generate_round(task.id).await?;
        self.execute_round(task.id).await?;
        self.broker
            .send(RUNNING_TOPIC, TaskMessage { task_id: task.id })
            .await?;
        Ok(())
    }

    /// Nothing to do until a later instant: park for the admission sweep.
    async fn reschedule(&self, task: &Task, verdict: &NextStateOutput) -> Result<()> {
        let raw = verdict.next_execute_time.as_deref().ok_or_else(|| {
            ad_domain::Error::Llm("planner chose scheduled without next_execute_time".into())
        })?;
        let when = clock::wall_clock_to_utc(raw, &task.owner_timezone)?;

        let mut tx = self.store.begin().await?;
        if let Some(round) = task.curr_round_id.as_deref() {
            Unit::clear_round_units(&mut *tx, round).await?;
        }
        Task::set_expect_execute_time(&mut *tx, task.id, when).await?;
        Task::set_state(&mut *tx, task.id, TaskState::Scheduling).await?;
        tx.commit().await.map_err(ad_store::from_sql)?;

        tracing::info!(task_id = task.id, next = %when, "task rescheduled");
        Ok(())
    }

    /// User input required: store the question as an assistant chat and
    /// push it through the provision channel.
    async fn pause_for_user(&self, task: &Task, verdict: &NextStateOutput) -> Result<()> {
        let message = verdict.notify_user.clone().unwrap_or_else(|| {
            "The task needs more information to continue.".to_string()
        });
        let replenish = verdict.replenish.clone().unwrap_or_default();
        let envelope = waiting_envelope(&message, &replenish);

        let chat = {
            let mut tx = self.store.begin().await?;
            if let Some(round) = task.curr_round_id.as_deref() {
                Unit::clear_round_units(&mut *tx, round).await?;
            }
            Task::set_state(&mut *tx, task.id, TaskState::Waiting).await?;
            let chat =
                Chat::create(&mut *tx, task.id, ad_domain::ChatRole::Assistant, &envelope)
                    .await?;
            tx.commit().await.map_err(ad_store::from_sql)?;
            chat
        };

        self.notifier.task_provision(TaskProvision {
            session_id: task.session_id.clone(),
            task_id: task.id,
            task_name: task.name.clone(),
            description: message,
            created_at: chat.created_at,
            state: TaskState::Waiting,
            replenish,
        });
        Ok(())
    }

    /// Goal met: synthesise the result first, then transition, then
    /// notify, so a crash never yields a FINISHED task without a result.
    async fn finish(&self, task: &Task, workspace: &Workspace) -> Result<()> {
        // Re-read the plan: it was rewritten just before this branch and
        // the synthesiser must see the final version.
        let (all_units, process) = {
            let mut conn = self.store.acquire().await?;
            let all_units = Unit::completed_by_task(&mut conn, task.id).await?;
            let process = Workspace::get(&mut conn, task.workspace_id)
                .await?
                .process
                .unwrap_or_default();
            (all_units, process)
        };

        let (outcome, tokens) = run_structured::<ResultOutput>(
            self.llm.as_ref(),
            LlmRequest::new(
                Phase::Result,
                prompts::result_messages(&workspace.prd, &process, &unit_contexts(&all_units)),
            ),
        )
        .await?;
        self.usage.record(&task.session_id, tokens);

        let mut tx = self.store.begin().await?;
        Workspace::set_result(&mut *tx, task.workspace_id, &outcome.result).await?;
        if let Some(round) = task.curr_round_id.as_deref() {
            Unit::clear_round_units(&mut *tx, round).await?;
        }
        Task::set_state(&mut *tx, task.id, TaskState::Finished).await?;
        self.write_audit(
            &mut *tx,
            &task.session_id,
            &outcome.thinking,
            "task finished, result synthesised",
            &tokens,
        )
        .await?;
        tx.commit().await.map_err(ad_store::from_sql)?;

        self.notifier.task_result_notify(
            &task.session_id,
            task.id,
            &task.name,
            TaskState::Finished,
        );
        Ok(())
    }

    /// The planner declared the goal unreachable.
    async fn fail_by_planner(&self, task: &Task) -> Result<()> {
        let mut tx = self.store.begin().await?;
        if let Some(round) = task.curr_round_id.as_deref() {
            Unit::clear_round_units(&mut *tx, round).await?;
        }
        Task::set_state(&mut *tx, task.id, TaskState::Failed).await?;
        tx.commit().await.map_err(ad_store::from_sql)?;

        self.notifier.task_result_notify(
            &task.session_id,
            task.id,
            &task.name,
            TaskState::Failed,
        );
        Ok(())
    }
}
