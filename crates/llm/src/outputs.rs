//! Typed planner outputs, one struct per phase.
//!
//! Field names are part of the prompt contract: the assets under
//! `assets/` describe exactly these shapes, and the engine relies on them.

use serde::{Deserialize, Serialize};

use ad_domain::TaskState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Planner-proposed state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The subset of task states the next-state planner may propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlannerState {
    #[serde(rename = "activating")]
    Activating,
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "scheduled")]
    Scheduling,
    #[serde(rename = "finished")]
    Finished,
    #[serde(rename = "failed")]
    Failed,
}

impl PlannerState {
    pub fn to_task_state(self) -> TaskState {
        match self {
            Self::Activating => TaskState::Activating,
            Self::Waiting => TaskState::Waiting,
            Self::Scheduling => TaskState::Scheduling,
            Self::Finished => TaskState::Finished,
            Self::Failed => TaskState::Failed,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Phase outputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Analyst verdict on a raw user utterance. When `is_splittable` is false
/// only `thinking` is meaningful; the other fields default.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalystOutput {
    pub is_splittable: bool,
    #[serde(default)]
    pub name: String,
    /// Wall clock in the owner's timezone, `%Y-%m-%d %H:%M:%S`.
    #[serde(default)]
    pub expect_execute_time: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub prd: String,
    pub thinking: String,
}

/// First execution plan generated from the PRD.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanOutput {
    pub process: String,
    pub thinking: String,
}

/// One sub-step proposed by the unit generator.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitSpec {
    pub name: String,
    pub objective: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitListOutput {
    pub unit_list: Vec<UnitSpec>,
    pub thinking: String,
}

/// Result of executing one unit.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitRunOutput {
    pub output: String,
    pub thinking: String,
}

/// The round verdict: updated plan plus the next task state, with the
/// state-dependent extras.
#[derive(Debug, Clone, Deserialize)]
pub struct NextStateOutput {
    pub process: String,
    pub state: PlannerState,
    /// Required when `state` is waiting.
    #[serde(default)]
    pub notify_user: Option<String>,
    /// Concrete items the user should supply, waiting only.
    #[serde(default)]
    pub replenish: Option<Vec<String>>,
    /// Required when `state` is scheduled; wall clock, owner timezone.
    #[serde(default)]
    pub next_execute_time: Option<String>,
    pub thinking: String,
}

/// Plan rewritten after the user answered a waiting notification.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeOutput {
    pub process: String,
    pub thinking: String,
}

/// Final user-facing result synthesised when the task finishes.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultOutput {
    pub result: String,
    pub thinking: String,
}

/// Regenerated task identity after a user-driven refactor.
#[derive(Debug, Clone, Deserialize)]
pub struct RefactorOutput {
    pub name: String,
    pub expect_execute_time: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub prd: String,
    pub thinking: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt context inputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A completed unit as shown to downstream planner phases.
#[derive(Debug, Clone, Serialize)]
pub struct UnitContext {
    pub name: String,
    pub objective: String,
    pub output: String,
    pub created_at: String,
}

/// A chat line as shown to planner phases.
#[derive(Debug, Clone, Serialize)]
pub struct ChatContext {
    pub role: String,
    pub message: String,
    pub created_at: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyst_output_non_splittable_defaults() {
        let parsed: AnalystOutput = serde_json::from_str(
            r#"{"is_splittable": false, "thinking": "4"}"#,
        )
        .unwrap();
        assert!(!parsed.is_splittable);
        assert_eq!(parsed.thinking, "4");
        assert!(parsed.name.is_empty());
        assert!(parsed.keywords.is_empty());
    }

    #[test]
    fn analyst_output_full() {
        let parsed: AnalystOutput = serde_json::from_str(
            r##"{
                "is_splittable": true,
                "name": "Weekly report",
                "expect_execute_time": "2025-03-10 09:00:00",
                "keywords": ["weekly", "report"],
                "prd": "# Background ...",
                "thinking": "recurring reporting task"
            }"##,
        )
        .unwrap();
        assert!(parsed.is_splittable);
        assert_eq!(parsed.keywords, vec!["weekly", "report"]);
        assert_eq!(parsed.expect_execute_time, "2025-03-10 09:00:00");
    }

    #[test]
    fn planner_state_wire_values() {
        assert_eq!(
            serde_json::from_str::<PlannerState>("\"scheduled\"").unwrap(),
            PlannerState::Scheduling
        );
        assert_eq!(
            serde_json::from_str::<PlannerState>("\"activating\"").unwrap(),
            PlannerState::Activating
        );
        assert!(serde_json::from_str::<PlannerState>("\"cancelled\"").is_err());
    }

    #[test]
    fn planner_state_maps_into_task_state() {
        assert_eq!(
            PlannerState::Scheduling.to_task_state(),
            TaskState::Scheduling
        );
        assert_eq!(PlannerState::Finished.to_task_state(), TaskState::Finished);
    }

    #[test]
    fn next_state_waiting_with_replenish() {
        let parsed: NextStateOutput = serde_json::from_str(
            r##"{
                "process": "# Plan ...",
                "state": "waiting",
                "notify_user": "confirm attendees",
                "replenish": ["A", "B"],
                "thinking": "need confirmation"
            }"##,
        )
        .unwrap();
        assert_eq!(parsed.state, PlannerState::Waiting);
        assert_eq!(parsed.notify_user.as_deref(), Some("confirm attendees"));
        assert_eq!(parsed.replenish.as_deref(), Some(&["A".to_string(), "B".to_string()][..]));
        assert!(parsed.next_execute_time.is_none());
    }

    #[test]
    fn next_state_scheduling_carries_time() {
        let parsed: NextStateOutput = serde_json::from_str(
            r#"{
                "process": "p",
                "state": "scheduled",
                "next_execute_time": "2025-03-11 08:00:00",
                "thinking": "retry tomorrow"
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.state, PlannerState::Scheduling);
        assert_eq!(
            parsed.next_execute_time.as_deref(),
            Some("2025-03-11 08:00:00")
        );
    }

    #[test]
    fn unit_list_parses() {
        let parsed: UnitListOutput = serde_json::from_str(
            r#"{
                "unit_list": [
                    {"name": "draft", "objective": "write the draft"},
                    {"name": "review", "objective": "review the draft"}
                ],
                "thinking": "two steps"
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.unit_list.len(), 2);
        assert_eq!(parsed.unit_list[1].name, "review");
    }
}
