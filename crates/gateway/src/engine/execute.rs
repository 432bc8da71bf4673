//! Ready-worker path: claim a queued task, plan it if fresh, dispatch a
//! round of units, and fan them out.

use futures_util::future::join_all;
use uuid::Uuid;

use ad_domain::{clock, Result, TaskState};
use ad_llm::{
    prompts, run_structured, ChatContext, LlmRequest, Phase, PlanOutput, UnitContext,
    UnitListOutput, UnitRunOutput,
};
use ad_store::{Chat, NewUnit, Task, Unit, Workspace};

use crate::scheduler::{TaskMessage, RUNNING_TOPIC};

use super::{chat_contexts, ready_guard, unit_contexts, GuardAction, TaskEngine};

impl TaskEngine {
    /// Entry point of the ready consumer. A failure moves the task to
    /// FAILED and is re-raised so the broker parks the envelope on the
    /// dead-letter stream.
    pub async fn execute_task(&self, task_id: i64) -> Result<()> {
        tracing::info!(task_id, "ready worker picked up task");
        if let Err(err) = self.execute_task_inner(task_id).await {
            tracing::error!(task_id, error = %err, "execute_task failed");
            self.fail_task(task_id, &err).await;
            return Err(err);
        }
        Ok(())
    }

    async fn execute_task_inner(&self, task_id: i64) -> Result<()> {
        // State guard + claim in one transaction.
        let task = {
            let mut tx = self.store.begin().await?;
            let Some(task) = Task::find(&mut *tx, task_id).await? else {
                tracing::warn!(task_id, "task vanished before execution, dropping");
                return Ok(());
            };

            match ready_guard(task.state) {
                GuardAction::Drop => {
                    tracing::info!(task_id, state = %task.state, "dropping delivery");
                    return Ok(());
                }
                GuardAction::Rearm => {
                    tracing::info!(task_id, state = %task.state, "re-arming task");
                    drop(tx);
                    return self.call_soon(task_id).await;
                }
                GuardAction::Proceed => {}
            }

            Task::set_state(&mut *tx, task_id, TaskState::Activating).await?;
            tx.commit().await.map_err(ad_store::from_sql)?;
            task
        };

        self.notifier.task_refresh(&task.session_id);

        // A task with no round history yet needs its first plan.
        if task.curr_round_id.is_none() && task.prev_round_id.is_none() {
            self.generate_plan(&task).await?;
        }

        self.generate_round(task_id).await?;
        self.execute_round(task_id).await?;

        self.broker
            .send(RUNNING_TOPIC, TaskMessage { task_id })
            .await?;
        Ok(())
    }

    // ── Planning ────────────────────────────────────────────────────

    /// Generate the first execution plan from the PRD and persist it.
    async fn generate_plan(&self, task: &Task) -> Result<()> {
        let workspace = {
            let mut conn = self.store.acquire().await?;
            Workspace::get(&mut conn, task.workspace_id).await?
        };

        let (plan, tokens) = run_structured::<PlanOutput>(
            self.llm.as_ref(),
            LlmRequest::new(Phase::Planner, prompts::planner_messages(&workspace.prd)),
        )
        .await?;
        self.usage.record(&task.session_id, tokens);

        let mut tx = self.store.begin().await?;
        Workspace::set_process(&mut *tx, task.workspace_id, &plan.process).await?;
        self.write_audit(
            &mut *tx,
            &task.session_id,
            &plan.thinking,
            "execution plan generated",
            &tokens,
        )
        .await?;
        tx.commit().await.map_err(ad_store::from_sql)?;
        Ok(())
    }

    // ── Round dispatch ──────────────────────────────────────────────

    /// Derive the next batch of units from the current plan and install a
    /// fresh round. The rollover transaction also cancels any leftover
    /// non-terminal units of the outgoing round, so at most one round is
    /// ever live.
    pub(super) async fn generate_round(&self, task_id: i64) -> Result<()> {
        let (task, process) = {
            let mut conn = self.store.acquire().await?;
            let task = Task::get(&mut conn, task_id).await?;
            let workspace = Workspace::get(&mut conn, task.workspace_id).await?;
            let process = workspace.process.unwrap_or(workspace.prd);
            (task, process)
        };

        let (batch, tokens) = run_structured::<UnitListOutput>(
            self.llm.as_ref(),
            LlmRequest::new(
                Phase::UnitGenerator,
                prompts::unit_generator_messages(&process),
            ),
        )
        .await?;
        self.usage.record(&task.session_id, tokens);

        let round_id = Uuid::new_v4().to_string();

        let mut tx = self.store.begin().await?;
        if let Some(old_round) = task.curr_round_id.as_deref() {
            Unit::clear_round_units(&mut *tx, old_round).await?;
        }
        Task::set_rounds(&mut *tx, task_id, task.curr_round_id.as_deref(), &round_id)
            .await?;
        for spec in &batch.unit_list {
            Unit::create(
                &mut *tx,
                &NewUnit {
                    task_id,
                    round_id: round_id.clone(),
                    name: spec.name.clone(),
                    objective: spec.objective.clone(),
                },
            )
            .await?;
        }
        self.write_audit(
            &mut *tx,
            &task.session_id,
            &batch.thinking,
            &format!(
                "round {round_id} dispatched with {} units",
                batch.unit_list.len()
            ),
            &tokens,
        )
        .await?;
        tx.commit().await.map_err(ad_store::from_sql)?;

        tracing::info!(task_id, round_id = %round_id, units = batch.unit_list.len(), "round dispatched");
        Ok(())
    }

    // ── Unit fan-out ────────────────────────────────────────────────

    /// Run every open unit of the current round in parallel and wait for
    /// the whole round to settle.
    pub(super) async fn execute_round(&self, task_id: i64) -> Result<()> {
        let (task, unit_ids, prev_units, prd, prd_created_at, chats) = {
            let mut conn = self.store.acquire().await?;
            let task = Task::get(&mut conn, task_id).await?;

            let curr_round = task.curr_round_id.clone().ok_or_else(|| {
                ad_domain::Error::State(format!("task {task_id} has no current round"))
            })?;
            let unit_ids = Unit::round_units_id(&mut conn, &curr_round).await?;

            let prev_units = match task.prev_round_id.as_deref() {
                Some(prev_round) => Unit::round_units(&mut conn, prev_round).await?,
                None => Vec::new(),
            };

            let workspace = Workspace::get(&mut conn, task.workspace_id).await?;
            let chats = Chat::recent_for_task(&mut conn, task_id, 10).await?;

            (
                task,
                unit_ids,
                unit_contexts(&prev_units),
                workspace.prd,
                clock::format_utc(workspace.created_at),
                chat_contexts(&chats),
            )
        };

        let runs = unit_ids.iter().map(|&unit_id| {
            self.execute_unit(&task, unit_id, &prev_units, &prd, &prd_created_at, &chats)
        });
        for outcome in join_all(runs).await {
            outcome?;
        }
        Ok(())
    }

    /// Run one unit: flip to RUNNING, call the executor phase with the
    /// task's tool endpoints bound, store the output, flip to COMPLETE.
    async fn execute_unit(
        &self,
        task: &Task,
        unit_id: i64,
        prev_units: &[UnitContext],
        prd: &str,
        prd_created_at: &str,
        chats: &[ChatContext],
    ) -> Result<()> {
        let unit = {
            let mut conn = self.store.acquire().await?;
            let unit = Unit::get(&mut conn, unit_id).await?;
            Unit::set_running(&mut conn, unit_id).await?;
            unit
        };

        let request = LlmRequest::new(
            Phase::UnitExecutor,
            prompts::unit_executor_messages(
                &unit.objective,
                prd,
                prd_created_at,
                prev_units,
                chats,
            ),
        )
        .with_mcp_servers(task.mcp_server_infos.0.clone());

        let (run, tokens) = run_structured::<UnitRunOutput>(self.llm.as_ref(), request).await?;
        self.usage.record(&task.session_id, tokens);

        let mut tx = self.store.begin().await?;
        Unit::set_complete(&mut *tx, unit_id, &run.output).await?;
        self.write_audit(
            &mut *tx,
            &task.session_id,
            &run.thinking,
            &format!("unit {} completed", unit.name),
            &tokens,
        )
        .await?;
        tx.commit().await.map_err(ad_store::from_sql)?;

        tracing::info!(task_id = task.id, unit_id, unit = %unit.name, "unit completed");
        Ok(())
    }
}
