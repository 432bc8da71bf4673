//! Task admission from a raw user utterance.

use ad_domain::{clock, McpServerInfos, Result};
use ad_llm::{prompts, run_structured, AnalystOutput, LlmRequest, Phase};
use ad_store::{NewTask, Task, Workspace};

use super::TaskEngine;

/// Ingress payload of `POST /task-dispatch/create`.
#[derive(Debug, Clone)]
pub struct CreateTaskRequest {
    pub owner: String,
    pub original_user_input: String,
    pub owner_timezone: String,
    pub session_id: String,
    pub mcp_server_infos: McpServerInfos,
}

/// Either a persisted task or a conversational reply when the utterance
/// did not warrant one.
#[derive(Debug)]
pub enum CreateOutcome {
    Task(Task),
    Reply(String),
}

impl TaskEngine {
    /// Analyse the utterance; when it is a real task, persist workspace
    /// and task in one transaction and arm the scheduler.
    pub async fn create_task(&self, request: CreateTaskRequest) -> Result<CreateOutcome> {
        let messages = prompts::analyst_messages(
            &request.owner,
            &request.original_user_input,
            &request.owner_timezone,
        );
        let (analysis, tokens) = run_structured::<AnalystOutput>(
            self.llm.as_ref(),
            LlmRequest::new(Phase::Analyst, messages),
        )
        .await?;
        self.usage.record(&request.session_id, tokens);

        if !analysis.is_splittable {
            let mut tx = self.store.begin().await?;
            self.write_audit(
                &mut *tx,
                &request.session_id,
                &analysis.thinking,
                "no task created, replying conversationally",
                &tokens,
            )
            .await?;
            tx.commit().await.map_err(ad_store::from_sql)?;
            return Ok(CreateOutcome::Reply(analysis.thinking));
        }

        let expect_execute_time = clock::wall_clock_to_utc(
            &analysis.expect_execute_time,
            &request.owner_timezone,
        )?;

        let task = {
            let mut tx = self.store.begin().await?;
            let workspace = Workspace::create(&mut *tx, &analysis.prd).await?;
            let task = Task::create(
                &mut *tx,
                &NewTask {
                    session_id: request.session_id.clone(),
                    workspace_id: workspace.id,
                    owner: request.owner.clone(),
                    owner_timezone: request.owner_timezone.clone(),
                    name: analysis.name.clone(),
                    original_user_input: request.original_user_input.clone(),
                    keywords: analysis.keywords.clone(),
                    mcp_server_infos: request.mcp_server_infos.clone(),
                    expect_execute_time,
                    priority: 0,
                },
            )
            .await?;
            self.write_audit(
                &mut *tx,
                &request.session_id,
                &analysis.thinking,
                &format!("task created: {}", task.id),
                &tokens,
            )
            .await?;
            tx.commit().await.map_err(ad_store::from_sql)?;
            task
        };

        self.call_soon(task.id).await?;
        Ok(CreateOutcome::Task(task))
    }
}
