//! Prompt bundles, one static asset per engine phase.
//!
//! Assets embed the current UTC wall clock and the context blocks each
//! phase needs. The JSON shapes they describe must stay in lockstep with
//! `outputs.rs`; the tests at the bottom pin the field names.

use chrono::Utc;
use serde_json::json;

use ad_domain::clock;

use crate::client::ChatMessage;
use crate::outputs::{ChatContext, UnitContext};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Phase
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Analyst,
    Planner,
    UnitGenerator,
    UnitExecutor,
    NextState,
    WaitingHandler,
    Result,
    Refactor,
}

impl Phase {
    /// Stable name, also the key for per-phase timeout overrides.
    pub fn name(self) -> &'static str {
        match self {
            Self::Analyst => "analyst",
            Self::Planner => "planner",
            Self::UnitGenerator => "unit_generator",
            Self::UnitExecutor => "unit_executor",
            Self::NextState => "next_state",
            Self::WaitingHandler => "waiting_handler",
            Self::Result => "result",
            Self::Refactor => "refactor",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Assets
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const ANALYST: &str = include_str!("../assets/analyst.md");
const PLANNER: &str = include_str!("../assets/planner.md");
const UNIT_GENERATOR: &str = include_str!("../assets/unit_generator.md");
const UNIT_EXECUTOR: &str = include_str!("../assets/unit_executor.md");
const NEXT_STATE: &str = include_str!("../assets/next_state.md");
const WAITING_HANDLER: &str = include_str!("../assets/waiting_handler.md");
const RESULT: &str = include_str!("../assets/result.md");
const REFACTOR: &str = include_str!("../assets/refactor.md");

/// Replace `{{key}}` placeholders. Unknown placeholders are left alone so
/// a drifted asset fails loudly in tests rather than silently rendering.
fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

fn now() -> String {
    clock::format_utc(Utc::now())
}

fn to_json(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "[]".into())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-phase builders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn analyst_messages(
    owner: &str,
    original_user_input: &str,
    owner_timezone: &str,
) -> Vec<ChatMessage> {
    let system = fill(ANALYST, &[("now", &now()), ("timezone", owner_timezone)]);
    let user = to_json(&json!({
        "owner": owner,
        "original_user_input": original_user_input,
        "owner_timezone": owner_timezone,
    }));
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn planner_messages(prd: &str) -> Vec<ChatMessage> {
    let system = fill(PLANNER, &[("now", &now())]);
    vec![ChatMessage::system(system), ChatMessage::user(prd)]
}

pub fn unit_generator_messages(process: &str) -> Vec<ChatMessage> {
    let system = fill(UNIT_GENERATOR, &[("now", &now())]);
    vec![ChatMessage::system(system), ChatMessage::user(process)]
}

pub fn unit_executor_messages(
    objective: &str,
    prd: &str,
    prd_created_at: &str,
    prev_units: &[UnitContext],
    chats: &[ChatContext],
) -> Vec<ChatMessage> {
    let system = fill(
        UNIT_EXECUTOR,
        &[
            ("now", now().as_str()),
            ("prd", prd),
            ("prd_created_at", prd_created_at),
            ("prev_units", &to_json(&prev_units)),
            ("chats", &to_json(&chats)),
        ],
    );
    vec![ChatMessage::system(system), ChatMessage::user(objective)]
}

pub fn next_state_messages(
    process: &str,
    curr_units: &[UnitContext],
    chats: &[ChatContext],
) -> Vec<ChatMessage> {
    let system = fill(
        NEXT_STATE,
        &[
            ("now", now().as_str()),
            ("curr_units", &to_json(&curr_units)),
            ("chats", &to_json(&chats)),
        ],
    );
    vec![ChatMessage::system(system), ChatMessage::user(process)]
}

pub fn waiting_handler_messages(
    process: &str,
    notify_user: &str,
    user_message: &str,
) -> Vec<ChatMessage> {
    let system = fill(WAITING_HANDLER, &[("now", &now())]);
    let user = to_json(&json!({
        "process": process,
        "notify_user": notify_user,
        "user_message": user_message,
    }));
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn result_messages(
    prd: &str,
    process: &str,
    all_units: &[UnitContext],
) -> Vec<ChatMessage> {
    let system = fill(RESULT, &[("now", &now())]);
    let user = to_json(&json!({
        "prd": prd,
        "process": process,
        "all_units": all_units,
    }));
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn refactor_messages(
    prd: &str,
    update_user_prompt: &str,
    owner_timezone: &str,
) -> Vec<ChatMessage> {
    let system = fill(REFACTOR, &[("now", &now()), ("timezone", owner_timezone)]);
    let user = to_json(&json!({
        "original_prd": prd,
        "update_user_prompt": update_user_prompt,
    }));
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MessageRole;

    #[test]
    fn phase_names_are_stable() {
        assert_eq!(Phase::Analyst.name(), "analyst");
        assert_eq!(Phase::UnitGenerator.name(), "unit_generator");
        assert_eq!(Phase::WaitingHandler.name(), "waiting_handler");
    }

    #[test]
    fn fill_replaces_all_occurrences() {
        let out = fill("{{a}} and {{a}} and {{b}}", &[("a", "x"), ("b", "y")]);
        assert_eq!(out, "x and x and y");
    }

    #[test]
    fn no_asset_leaves_placeholders_unrendered() {
        let unit = UnitContext {
            name: "n".into(),
            objective: "o".into(),
            output: "out".into(),
            created_at: "2025-01-01 00:00:00".into(),
        };
        let chat = ChatContext {
            role: "user".into(),
            message: "hi".into(),
            created_at: "2025-01-01 00:00:00".into(),
        };

        let bundles = [
            analyst_messages("alice", "do things", "UTC"),
            planner_messages("# PRD"),
            unit_generator_messages("# plan"),
            unit_executor_messages("obj", "# PRD", "2025-01-01 00:00:00", &[unit.clone()], &[chat.clone()]),
            next_state_messages("# plan", &[unit.clone()], &[chat.clone()]),
            waiting_handler_messages("# plan", "confirm", "ok"),
            result_messages("# PRD", "# plan", &[unit]),
            refactor_messages("# PRD", "change it", "UTC"),
        ];
        for messages in bundles {
            for msg in messages {
                assert!(
                    !msg.content.contains("{{"),
                    "unrendered placeholder in: {}",
                    msg.content
                );
            }
        }
    }

    #[test]
    fn system_prompts_embed_wall_clock() {
        let messages = planner_messages("# PRD");
        let system = &messages[0].content;
        // The clock renders as %Y-%m-%d %H:%M:%S; check the date half.
        let today = Utc::now().format("%Y-%m-%d").to_string();
        assert!(system.contains(&today), "clock missing from: {system}");
    }

    #[test]
    fn assets_pin_output_field_names() {
        assert!(ANALYST.contains("is_splittable"));
        assert!(ANALYST.contains("expect_execute_time"));
        assert!(ANALYST.contains("keywords"));
        assert!(ANALYST.contains("prd"));
        assert!(PLANNER.contains("process"));
        assert!(UNIT_GENERATOR.contains("unit_list"));
        assert!(UNIT_GENERATOR.contains("objective"));
        assert!(UNIT_EXECUTOR.contains("output"));
        assert!(NEXT_STATE.contains("notify_user"));
        assert!(NEXT_STATE.contains("replenish"));
        assert!(NEXT_STATE.contains("next_execute_time"));
        assert!(WAITING_HANDLER.contains("process"));
        assert!(RESULT.contains("result"));
        assert!(REFACTOR.contains("expect_execute_time"));
        for asset in [
            ANALYST,
            PLANNER,
            UNIT_GENERATOR,
            UNIT_EXECUTOR,
            NEXT_STATE,
            WAITING_HANDLER,
            RESULT,
            REFACTOR,
        ] {
            assert!(asset.contains("thinking"), "asset missing thinking field");
        }
    }

    #[test]
    fn analyst_user_message_is_json_payload() {
        let messages = analyst_messages("alice", "book a room", "Asia/Shanghai");
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].role, MessageRole::User);
        let payload: serde_json::Value =
            serde_json::from_str(&messages[1].content).unwrap();
        assert_eq!(payload["owner"], "alice");
        assert_eq!(payload["owner_timezone"], "Asia/Shanghai");
    }

    #[test]
    fn next_state_system_contains_units_and_chats() {
        let unit = UnitContext {
            name: "draft".into(),
            objective: "write".into(),
            output: "done".into(),
            created_at: "2025-01-01 00:00:00".into(),
        };
        let messages = next_state_messages("# plan", &[unit], &[]);
        assert!(messages[0].content.contains("\"draft\""));
        assert_eq!(messages[1].content, "# plan");
    }
}
