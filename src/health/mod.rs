//! Mission health patrol.
//!
//! Periodically inspects in-flight work for the failure modes that burn
//! agent sessions without progress: stalled branches, test-failure loops
//! (the same failure signature over and over), and edit thrashing (one
//! file rewritten many times in a short commit window). Alerts are
//! appended to the mission's artifact log and posted to the reporter;
//! the patrol never mutates mission state itself.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::{HealthConfig, StatePaths};
use crate::error::Result;
use crate::git::GitRunner;
use crate::mission::{Mission, MissionStatus, WorkItemStatus};
use crate::notification::{EventType, MissionEvent, Reporter};
use crate::store::MissionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warning,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    WorkerStuck,
    TestFailureLoop,
    EditThrashing,
    SlowProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthAlert {
    pub level: AlertLevel,
    pub category: AlertCategory,
    pub objective: Option<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl HealthAlert {
    fn new(
        level: AlertLevel,
        category: AlertCategory,
        objective: Option<&str>,
        message: String,
    ) -> Self {
        Self {
            level,
            category,
            objective: objective.map(|s| s.to_string()),
            message,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct HealthReport {
    pub alerts: Vec<HealthAlert>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn has_red(&self) -> bool {
        self.alerts.iter().any(|a| a.level == AlertLevel::Red)
    }
}

/// Consecutive failures of the same signature for one objective.
#[derive(Debug, Default)]
struct FailureStreak {
    signature: String,
    count: u32,
}

pub struct HealthPatrol {
    paths: StatePaths,
    config: HealthConfig,
    failures: Mutex<HashMap<String, FailureStreak>>,
}

impl HealthPatrol {
    pub fn new(paths: StatePaths, config: HealthConfig) -> Self {
        Self {
            paths,
            config,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a test failure for an objective. Returns the current streak
    /// length; a changed signature starts a new streak.
    pub fn record_test_failure(&self, item_id: &str, signature: &str) -> u32 {
        let mut failures = self.failures.lock();
        let streak = failures.entry(item_id.to_string()).or_default();
        if streak.signature == signature {
            streak.count += 1;
        } else {
            streak.signature = signature.to_string();
            streak.count = 1;
        }
        streak.count
    }

    pub fn clear_failures(&self, item_id: &str) {
        self.failures.lock().remove(item_id);
    }

    /// Minutes since the last sign of life. An item that just started on an
    /// old branch is active: the clock runs from the later of the branch's
    /// last commit and the item's own start time.
    pub fn inactivity_minutes(
        last_commit: Option<DateTime<Utc>>,
        started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        let last_activity = match (last_commit, started_at) {
            (Some(c), Some(s)) => Some(c.max(s)),
            (Some(c), None) => Some(c),
            (None, Some(s)) => Some(s),
            (None, None) => None,
        };
        last_activity.map(|t| (now - t).num_minutes())
    }

    /// Inactivity escalation. Strictly more than the red threshold is a
    /// red alert, strictly more than the warn threshold a warning; the
    /// boundary minute itself does not alert.
    fn inactivity_level(&self, minutes: i64) -> Option<AlertLevel> {
        if minutes > self.config.red_inactive_minutes {
            Some(AlertLevel::Red)
        } else if minutes > self.config.warn_inactive_minutes {
            Some(AlertLevel::Warning)
        } else {
            None
        }
    }

    /// Files touched more often than `threshold` within the inspected
    /// commit window, most-touched first.
    pub fn detect_thrashing(&self, recent_files: &[String]) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for file in recent_files {
            *counts.entry(file.as_str()).or_insert(0) += 1;
        }
        let mut hot: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, n)| *n > self.config.thrash_threshold)
            .map(|(f, n)| (f.to_string(), n))
            .collect();
        hot.sort_by(|a, b| b.1.cmp(&a.1));
        hot
    }

    /// One patrol pass over a mission. Inspects each in-progress objective's
    /// branch in the main clone, persists any alerts, and posts them.
    pub async fn patrol(&self, mission: &Mission, reporter: &dyn Reporter) -> Result<HealthReport> {
        let mut report = HealthReport::default();
        let git = GitRunner::new(self.paths.clone_dir(&mission.repo));
        let now = Utc::now();

        for item in mission.items_by_status(WorkItemStatus::InProgress) {
            let Some(branch) = item.git_branch.as_deref() else {
                continue;
            };

            let last_commit = git.last_commit_time(branch).await?;
            if let Some(minutes) =
                Self::inactivity_minutes(last_commit, item.started_at, now)
            {
                match self.inactivity_level(minutes) {
                    Some(AlertLevel::Red) => report.alerts.push(HealthAlert::new(
                        AlertLevel::Red,
                        AlertCategory::WorkerStuck,
                        Some(item.id.as_str()),
                        format!("no commits on {} for {} minutes", branch, minutes),
                    )),
                    Some(AlertLevel::Warning) => report.alerts.push(HealthAlert::new(
                        AlertLevel::Warning,
                        AlertCategory::SlowProgress,
                        Some(item.id.as_str()),
                        format!("no commits on {} for {} minutes", branch, minutes),
                    )),
                    None => {}
                }
            }

            // A thrashing worker is burning sessions rewriting the same
            // file; stop the line rather than watch it churn.
            let recent = git.recent_files(branch, self.config.thrash_window).await?;
            for (file, touches) in self.detect_thrashing(&recent) {
                report.alerts.push(HealthAlert::new(
                    AlertLevel::Red,
                    AlertCategory::EditThrashing,
                    Some(item.id.as_str()),
                    format!("{} touched {} times in the last {} commits", file, touches, self.config.thrash_window),
                ));
            }
        }

        {
            let failures = self.failures.lock();
            for (item_id, streak) in failures.iter() {
                if streak.count >= 2 {
                    report.alerts.push(HealthAlert::new(
                        AlertLevel::Red,
                        AlertCategory::TestFailureLoop,
                        Some(item_id.as_str()),
                        format!(
                            "same test failure {} times in a row: {}",
                            streak.count, streak.signature
                        ),
                    ));
                }
            }
        }

        if !report.alerts.is_empty() {
            self.persist_alerts(mission, &report.alerts).await?;
            for alert in &report.alerts {
                let mut event = MissionEvent::new(EventType::HealthAlert, mission.mission_id.as_str())
                    .with_message(alert.message.as_str());
                if let Some(objective) = &alert.objective {
                    event = event.with_objective(objective.as_str());
                }
                reporter.notify(&event).await?;
            }
        } else {
            debug!(mission = %mission.mission_id, "patrol pass clean");
        }

        Ok(report)
    }

    /// One sweep over every in-progress mission of a repository. The
    /// `--watch` patrol mode calls this on a fixed interval.
    pub async fn patrol_all(
        &self,
        store: &MissionStore,
        repo: &str,
        reporter: &dyn Reporter,
    ) -> Result<usize> {
        let mut inspected = 0;
        for mission in store.list(repo).await? {
            if mission.status == MissionStatus::InProgress {
                self.patrol(&mission, reporter).await?;
                inspected += 1;
            }
        }
        Ok(inspected)
    }

    async fn persist_alerts(&self, mission: &Mission, alerts: &[HealthAlert]) -> Result<()> {
        let path = self
            .paths
            .health_alerts_file(&mission.repo, &mission.mission_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut lines = String::new();
        for alert in alerts {
            lines.push_str(&serde_json::to_string(alert)?);
            lines.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(lines.as_bytes()).await?;
        Ok(())
    }
}
