use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{ArmadaError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Branch that integration branches fork from and PRs target.
    pub default_branch: String,

    /// Upper bound on concurrently dispatched workers per batch.
    pub max_parallel_workers: usize,

    /// Total worker sessions a single mission may consume.
    pub max_sessions: u32,

    /// Wall-clock budget for a mission, in hours.
    pub max_elapsed_hours: u64,

    /// Planner output above this count fails the mission outright.
    pub max_work_items: usize,

    /// The planner writes work items to the store asynchronously; the
    /// scheduler polls until they appear or this window closes.
    pub planner_settle_ms: u64,
    pub planner_settle_attempts: u32,

    /// Agent CLI invoked for planner, worker, reviewer, and repair sessions.
    pub agent_command: String,
    pub worker_timeout_secs: u64,
    pub model: Option<String>,
    pub model_overrides: HashMap<String, String>,

    /// Shell command run with ARMADA_EVENT* env on every notification.
    pub notify_hook: Option<String>,

    /// Per-category glob overrides for the risk classifier, keyed by
    /// category name (`auth`, `migration`, ...). Unknown keys are rejected.
    pub high_risk_patterns: HashMap<String, Vec<String>>,

    pub health: HealthConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            max_parallel_workers: 3,
            max_sessions: 50,
            max_elapsed_hours: 6,
            max_work_items: 50,
            planner_settle_ms: 500,
            planner_settle_attempts: 10,
            agent_command: "claude".to_string(),
            worker_timeout_secs: 2700,
            model: None,
            model_overrides: HashMap::new(),
            notify_hook: None,
            high_risk_patterns: HashMap::new(),
            health: HealthConfig::default(),
        }
    }
}

impl ProjectConfig {
    pub async fn load(repo_state_dir: &Path) -> Result<Self> {
        let config_path = repo_state_dir.join("config.toml");
        let config: Self = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, repo_state_dir: &Path) -> Result<()> {
        self.validate()?;
        fs::create_dir_all(repo_state_dir).await?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ArmadaError::Config(e.to_string()))?;
        fs::write(repo_state_dir.join("config.toml"), content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.max_parallel_workers == 0 {
            errors.push("max_parallel_workers must be greater than 0");
        }
        if self.max_sessions == 0 {
            errors.push("max_sessions must be greater than 0");
        }
        if self.max_elapsed_hours == 0 {
            errors.push("max_elapsed_hours must be greater than 0");
        }
        if self.max_work_items == 0 {
            errors.push("max_work_items must be greater than 0");
        }
        if self.agent_command.is_empty() {
            errors.push("agent_command must not be empty");
        }
        if self.worker_timeout_secs == 0 {
            errors.push("worker_timeout_secs must be greater than 0");
        }
        if self.health.warn_inactive_minutes >= self.health.red_inactive_minutes {
            errors.push("health.warn_inactive_minutes must be less than red_inactive_minutes");
        }
        if self.health.thrash_threshold == 0 {
            errors.push("health.thrash_threshold must be greater than 0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ArmadaError::Config(errors.join("; ")))
        }
    }

    pub fn model_for(&self, agent: &str) -> Option<String> {
        self.model_overrides
            .get(agent)
            .cloned()
            .or_else(|| self.model.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds between patrol passes when running continuously.
    pub interval_secs: u64,
    /// Inactivity above this raises a warning.
    pub warn_inactive_minutes: i64,
    /// Inactivity above this raises a red alert.
    pub red_inactive_minutes: i64,
    /// A single file touched more than this many times counts as thrashing.
    pub thrash_threshold: usize,
    /// Number of recent commits inspected for thrash detection.
    pub thrash_window: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 120,
            warn_inactive_minutes: 10,
            red_inactive_minutes: 20,
            thrash_threshold: 10,
            thrash_window: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ProjectConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let config = ProjectConfig {
            max_parallel_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_health_thresholds_rejected() {
        let mut config = ProjectConfig::default();
        config.health.warn_inactive_minutes = 30;
        config.health.red_inactive_minutes = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn model_override_wins() {
        let mut config = ProjectConfig {
            model: Some("base-model".to_string()),
            ..Default::default()
        };
        config
            .model_overrides
            .insert("mission-planner".to_string(), "big-model".to_string());

        assert_eq!(
            config.model_for("mission-planner").as_deref(),
            Some("big-model")
        );
        assert_eq!(config.model_for("implementer").as_deref(), Some("base-model"));
    }
}
