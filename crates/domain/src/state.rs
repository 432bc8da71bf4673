//! Task, unit, and chat-role state machines.
//!
//! Wire strings are fixed by the persisted schema: task states are lower
//! case with two historical aliases (`enqueued` for Queuing, `scheduled`
//! for Scheduling), unit states are upper case.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Just created, waiting for admission.
    #[serde(rename = "initial")]
    Initial,
    /// Claimed by admission, sitting on the ready topic.
    #[serde(rename = "enqueued")]
    Queuing,
    /// A ready worker is driving a round.
    #[serde(rename = "activating")]
    Activating,
    /// Paused for user input.
    #[serde(rename = "waiting")]
    Waiting,
    /// Re-scheduled for a future `expect_execute_time`.
    #[serde(rename = "scheduled")]
    Scheduling,
    #[serde(rename = "finished")]
    Finished,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "cancelled")]
    Cancelled,
    /// A refactor is rewriting the task; engine advancement is blocked.
    #[serde(rename = "updating")]
    Updating,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Queuing => "enqueued",
            Self::Activating => "activating",
            Self::Waiting => "waiting",
            Self::Scheduling => "scheduled",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Updating => "updating",
        }
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }

    /// States eligible for admission (due tasks move to Queuing).
    pub fn is_admissible(self) -> bool {
        matches!(self, Self::Initial | Self::Scheduling)
    }

    /// States the review sweep treats as possibly stuck.
    pub fn is_reviewable(self) -> bool {
        matches!(self, Self::Activating | Self::Queuing)
    }

    /// The "in progress" bucket exposed by listing filters.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            Self::Activating | Self::Queuing | Self::Initial | Self::Scheduling
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(Self::Initial),
            "enqueued" => Ok(Self::Queuing),
            "activating" => Ok(Self::Activating),
            "waiting" => Ok(Self::Waiting),
            "scheduled" => Ok(Self::Scheduling),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "updating" => Ok(Self::Updating),
            other => Err(crate::Error::State(format!("unknown task state: {other}"))),
        }
    }
}

impl TryFrom<String> for TaskState {
    type Error = crate::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Unit state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnitState {
    Created,
    Running,
    Complete,
    Cancelled,
}

impl UnitState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// A unit never leaves Complete or Cancelled.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled)
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UnitState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "RUNNING" => Ok(Self::Running),
            "COMPLETE" => Ok(Self::Complete),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(crate::Error::State(format!("unknown unit state: {other}"))),
        }
    }
}

impl TryFrom<String> for UnitState {
    type Error = crate::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat role
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    System,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChatRole {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            "assistant" => Ok(Self::Assistant),
            other => Err(crate::Error::State(format!("unknown chat role: {other}"))),
        }
    }
}

impl TryFrom<String> for ChatRole {
    type Error = crate::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_state_wire_aliases() {
        assert_eq!(TaskState::Queuing.as_str(), "enqueued");
        assert_eq!(TaskState::Scheduling.as_str(), "scheduled");
        assert_eq!("enqueued".parse::<TaskState>().unwrap(), TaskState::Queuing);
        assert_eq!(
            "scheduled".parse::<TaskState>().unwrap(),
            TaskState::Scheduling
        );
    }

    #[test]
    fn task_state_serde_roundtrip() {
        for state in [
            TaskState::Initial,
            TaskState::Queuing,
            TaskState::Activating,
            TaskState::Waiting,
            TaskState::Scheduling,
            TaskState::Finished,
            TaskState::Failed,
            TaskState::Cancelled,
            TaskState::Updating,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
            let back: TaskState = serde_json::from_str(&json).unwrap();
            assert_eq!(back, state);
        }
    }

    #[test]
    fn terminal_states_are_absorbing_set() {
        assert!(TaskState::Finished.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Waiting.is_terminal());
        assert!(!TaskState::Updating.is_terminal());
    }

    #[test]
    fn admissible_and_reviewable_buckets() {
        assert!(TaskState::Initial.is_admissible());
        assert!(TaskState::Scheduling.is_admissible());
        assert!(!TaskState::Queuing.is_admissible());

        assert!(TaskState::Queuing.is_reviewable());
        assert!(TaskState::Activating.is_reviewable());
        assert!(!TaskState::Waiting.is_reviewable());
    }

    #[test]
    fn in_progress_bucket() {
        for state in [
            TaskState::Activating,
            TaskState::Queuing,
            TaskState::Initial,
            TaskState::Scheduling,
        ] {
            assert!(state.is_in_progress(), "{state} should be in progress");
        }
        assert!(!TaskState::Waiting.is_in_progress());
        assert!(!TaskState::Finished.is_in_progress());
    }

    #[test]
    fn unit_state_uppercase_wire() {
        assert_eq!(
            serde_json::to_string(&UnitState::Complete).unwrap(),
            "\"COMPLETE\""
        );
        assert_eq!("RUNNING".parse::<UnitState>().unwrap(), UnitState::Running);
    }

    #[test]
    fn unit_terminal_states() {
        assert!(UnitState::Complete.is_terminal());
        assert!(UnitState::Cancelled.is_terminal());
        assert!(!UnitState::Created.is_terminal());
        assert!(!UnitState::Running.is_terminal());
    }

    #[test]
    fn chat_role_roundtrip() {
        assert_eq!(
            serde_json::to_string(&ChatRole::Assistant).unwrap(),
            "\"assistant\""
        );
        assert_eq!("user".parse::<ChatRole>().unwrap(), ChatRole::User);
        assert!("operator".parse::<ChatRole>().is_err());
    }
}
