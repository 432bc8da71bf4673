use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler loop configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Admission producer period, seconds.
    #[serde(default = "d_admission_interval")]
    pub admission_interval_secs: u64,
    /// Review producer period, seconds.
    #[serde(default = "d_review_interval")]
    pub review_interval_secs: u64,
    /// A reviewable task untouched for this long is declared dead.
    #[serde(default = "d_review_stale")]
    pub review_stale_minutes: i64,

    #[serde(default = "d_five")]
    pub ready_listeners: usize,
    #[serde(default = "d_ten")]
    pub ready_workers: usize,
    #[serde(default = "d_five")]
    pub running_listeners: usize,
    #[serde(default = "d_ten")]
    pub running_workers: usize,
    #[serde(default = "d_one")]
    pub review_listeners: usize,
    #[serde(default = "d_ten")]
    pub review_workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            admission_interval_secs: d_admission_interval(),
            review_interval_secs: d_review_interval(),
            review_stale_minutes: d_review_stale(),
            ready_listeners: d_five(),
            ready_workers: d_ten(),
            running_listeners: d_five(),
            running_workers: d_ten(),
            review_listeners: d_one(),
            review_workers: d_ten(),
        }
    }
}

fn d_admission_interval() -> u64 {
    60
}

fn d_review_interval() -> u64 {
    1200
}

fn d_review_stale() -> i64 {
    20
}

fn d_five() -> usize {
    5
}

fn d_ten() -> usize {
    10
}

fn d_one() -> usize {
    1
}
