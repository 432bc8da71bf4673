use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM facade configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`.
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key. The key itself never
    /// appears in config files.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// Default request timeout, seconds.
    #[serde(default = "d_timeout_secs")]
    pub timeout_secs: u64,
    /// Per-phase timeout overrides, keyed by phase name
    /// (`analyst`, `planner`, `unit_executor`, ...).
    #[serde(default)]
    pub phase_timeout_secs: HashMap<String, u64>,
}

impl LlmConfig {
    /// Effective timeout for one phase.
    pub fn timeout_for(&self, phase: &str) -> std::time::Duration {
        let secs = self
            .phase_timeout_secs
            .get(phase)
            .copied()
            .unwrap_or(self.timeout_secs);
        std::time::Duration::from_secs(secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            model: d_model(),
            timeout_secs: d_timeout_secs(),
            phase_timeout_secs: HashMap::new(),
        }
    }
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn d_api_key_env() -> String {
    "AD_LLM_API_KEY".into()
}

fn d_model() -> String {
    "gpt-4.1".into()
}

fn d_timeout_secs() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_override_wins() {
        let mut cfg = LlmConfig::default();
        cfg.phase_timeout_secs.insert("unit_executor".into(), 300);
        assert_eq!(
            cfg.timeout_for("unit_executor"),
            std::time::Duration::from_secs(300)
        );
        assert_eq!(
            cfg.timeout_for("analyst"),
            std::time::Duration::from_secs(120)
        );
    }
}
