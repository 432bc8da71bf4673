//! Scheduler wiring: the two producer loops and the three queue
//! consumers.
//!
//! The control flow looks cyclic (ready feeds running, running feeds
//! ready) but every hop goes through the broker, so each worker run is an
//! independent message bounded by the task state machine.

use serde::{Deserialize, Serialize};

use ad_broker::ConsumerOptions;
use ad_domain::Result;
use ad_store::Task;

use crate::state::AppState;

pub const READY_TOPIC: &str = "ready-tasks";
pub const RUNNING_TOPIC: &str = "running-tasks";
pub const REVIEW_TOPIC: &str = "review-tasks";

/// The only message shape that crosses the queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: i64,
}

pub struct Dispatch;

impl Dispatch {
    /// Start both producer loops and all three consumers. Called once at
    /// boot; consumers live until broker shutdown.
    pub async fn start(state: &AppState) -> Result<()> {
        let scheduler = &state.config.scheduler;

        // ── Consumers ───────────────────────────────────────────────
        {
            let engine = state.engine.clone();
            state
                .broker
                .consumer(
                    READY_TOPIC,
                    move |message: TaskMessage| {
                        let engine = engine.clone();
                        async move { engine.execute_task(message.task_id).await }
                    },
                    ConsumerOptions {
                        group_id: None,
                        listeners: scheduler.ready_listeners,
                        workers_per_listener: scheduler.ready_workers,
                    },
                )
                .await?;
        }

        {
            let engine = state.engine.clone();
            state
                .broker
                .consumer(
                    RUNNING_TOPIC,
                    move |message: TaskMessage| {
                        let engine = engine.clone();
                        async move { engine.running_task(message.task_id).await }
                    },
                    ConsumerOptions {
                        group_id: None,
                        listeners: scheduler.running_listeners,
                        workers_per_listener: scheduler.running_workers,
                    },
                )
                .await?;
        }

        {
            let engine = state.engine.clone();
            state
                .broker
                .consumer(
                    REVIEW_TOPIC,
                    move |message: TaskMessage| {
                        let engine = engine.clone();
                        async move { engine.review_task(message.task_id).await }
                    },
                    ConsumerOptions {
                        group_id: None,
                        listeners: scheduler.review_listeners,
                        workers_per_listener: scheduler.review_workers,
                    },
                )
                .await?;
        }

        // ── Producers ───────────────────────────────────────────────
        tokio::spawn(admission_producer(state.clone()));
        tokio::spawn(review_producer(state.clone()));

        tracing::info!(
            admission_secs = scheduler.admission_interval_secs,
            review_secs = scheduler.review_interval_secs,
            "scheduler started"
        );
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admission producer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every tick: atomically claim all due tasks (they flip to enqueued in
/// the same transaction) and publish each to the ready topic. Transient
/// failures are logged and retried on the next cycle.
async fn admission_producer(state: AppState) {
    let period =
        std::time::Duration::from_secs(state.config.scheduler.admission_interval_secs);
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;

        let claimed = async {
            let mut tx = state.store.begin().await?;
            let ids = Task::get_dispatch_tasks_id(&mut *tx).await?;
            tx.commit().await.map_err(ad_store::from_sql)?;
            Ok::<_, ad_domain::Error>(ids)
        }
        .await;

        let ids = match claimed {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, "admission sweep failed, retrying next cycle");
                continue;
            }
        };

        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "admission claimed due tasks");
        }
        for task_id in ids {
            if let Err(e) = state.broker.send(READY_TOPIC, TaskMessage { task_id }).await {
                // The row is already enqueued; the review sweep recovers
                // it if this publish never lands.
                tracing::error!(task_id, error = %e, "failed to publish admitted task");
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Review producer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Liveness sweep: any task stuck in enqueued/activating past the
/// staleness threshold is surfaced for the review worker to fail. This is
/// how a crashed worker's task gets reclaimed.
async fn review_producer(state: AppState) {
    let period =
        std::time::Duration::from_secs(state.config.scheduler.review_interval_secs);
    let stale_minutes = state.config.scheduler.review_stale_minutes;
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;

        let stuck = async {
            let mut conn = state.store.acquire().await?;
            Task::get_review_tasks_id(&mut conn, stale_minutes).await
        }
        .await;

        let ids = match stuck {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, "review sweep failed, retrying next cycle");
                continue;
            }
        };

        if !ids.is_empty() {
            tracing::warn!(count = ids.len(), "review sweep found stuck tasks");
        }
        for task_id in ids {
            if let Err(e) = state
                .broker
                .send(REVIEW_TOPIC, TaskMessage { task_id })
                .await
            {
                tracing::error!(task_id, error = %e, "failed to publish review task");
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names_are_fixed() {
        assert_eq!(READY_TOPIC, "ready-tasks");
        assert_eq!(RUNNING_TOPIC, "running-tasks");
        assert_eq!(REVIEW_TOPIC, "review-tasks");
    }

    #[test]
    fn task_message_wire_shape() {
        let json = serde_json::to_string(&TaskMessage { task_id: 42 }).unwrap();
        assert_eq!(json, r#"{"task_id":42}"#);
        let back: TaskMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, 42);
    }
}
