mod database;
mod llm;
mod notifier;
mod redis;
mod scheduler;
mod server;

pub use database::*;
pub use llm::*;
pub use notifier::*;
pub use redis::*;
pub use scheduler::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ConfigIssue {
    ConfigIssue {
        severity: ConfigSeverity::Error,
        field: field.to_string(),
        message: message.into(),
    }
}

fn warn(field: &str, message: impl Into<String>) -> ConfigIssue {
    ConfigIssue {
        severity: ConfigSeverity::Warning,
        field: field.to_string(),
        message: message.into(),
    }
}

impl Config {
    /// Validate the whole tree. Errors should abort startup; warnings are
    /// logged and boot continues.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.database.dsn.is_empty() {
            issues.push(err("database.dsn", "must be set"));
        } else if !self.database.dsn.starts_with("mysql://") {
            issues.push(err("database.dsn", "expected a mysql:// DSN"));
        }

        match (&self.redis.url, self.redis.sentinels.is_empty()) {
            (None, true) => {
                issues.push(err(
                    "redis",
                    "either redis.url or redis.sentinels must be set",
                ));
            }
            (None, false) if self.redis.master_name.is_empty() => {
                issues.push(err(
                    "redis.master_name",
                    "required when sentinels are configured",
                ));
            }
            (Some(_), false) => {
                issues.push(warn(
                    "redis",
                    "both url and sentinels set; url wins",
                ));
            }
            _ => {}
        }

        if self.llm.base_url.is_empty() {
            issues.push(err("llm.base_url", "must be set"));
        }
        if std::env::var(&self.llm.api_key_env).is_err() {
            issues.push(warn(
                "llm.api_key_env",
                format!("env var {} is not set; LLM calls will fail", self.llm.api_key_env),
            ));
        }

        if self.notifier.base_url.is_empty() {
            issues.push(warn(
                "notifier.base_url",
                "not set; session notifications are disabled",
            ));
        }

        for (field, value) in [
            ("scheduler.ready_listeners", self.scheduler.ready_listeners),
            ("scheduler.ready_workers", self.scheduler.ready_workers),
            ("scheduler.running_listeners", self.scheduler.running_listeners),
            ("scheduler.running_workers", self.scheduler.running_workers),
            ("scheduler.review_listeners", self.scheduler.review_listeners),
            ("scheduler.review_workers", self.scheduler.review_workers),
        ] {
            if value == 0 {
                issues.push(err(field, "must be at least 1"));
            }
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            database: DatabaseConfig {
                dsn: "mysql://user:pw@localhost/dispatch".into(),
                ..Default::default()
            },
            redis: RedisConfig {
                url: Some("redis://localhost:6379/0".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn valid_config_has_no_errors() {
        let issues = valid_config().validate();
        assert!(
            issues.iter().all(|i| i.severity == ConfigSeverity::Warning),
            "unexpected errors: {issues:?}"
        );
    }

    #[test]
    fn missing_dsn_is_an_error() {
        let mut cfg = valid_config();
        cfg.database.dsn.clear();
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "database.dsn" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn non_mysql_dsn_is_an_error() {
        let mut cfg = valid_config();
        cfg.database.dsn = "postgres://x".into();
        assert!(cfg
            .validate()
            .iter()
            .any(|i| i.field == "database.dsn"));
    }

    #[test]
    fn redis_requires_url_or_sentinels() {
        let mut cfg = valid_config();
        cfg.redis.url = None;
        assert!(cfg
            .validate()
            .iter()
            .any(|i| i.field == "redis" && i.severity == ConfigSeverity::Error));

        cfg.redis.sentinels = vec!["127.0.0.1:26379".into()];
        // Sentinels without a master name is still an error.
        assert!(cfg
            .validate()
            .iter()
            .any(|i| i.field == "redis.master_name"));

        cfg.redis.master_name = "mymaster".into();
        assert!(cfg
            .validate()
            .iter()
            .all(|i| i.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn zero_worker_counts_are_errors() {
        let mut cfg = valid_config();
        cfg.scheduler.ready_workers = 0;
        assert!(cfg
            .validate()
            .iter()
            .any(|i| i.field == "scheduler.ready_workers"));
    }

    #[test]
    fn empty_toml_deserialises_to_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.scheduler.admission_interval_secs, 60);
        assert_eq!(cfg.scheduler.review_interval_secs, 1200);
        assert_eq!(cfg.server.port, 8700);
    }
}
