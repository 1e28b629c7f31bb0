use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MissionStatus, WorkItemStatus};
use crate::config::ProjectConfig;
use crate::error::{ArmadaError, Result};
use crate::risk::{ReviewerRole, RiskCategory};

/// The durable mission document. Exactly one per (repository, mission id);
/// `version` strictly increases and `updated_at` is rewritten on every
/// persisted mutation (both handled by the store, never by hand).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub mission_id: String,
    pub repo: String,
    pub description: String,
    pub status: MissionStatus,

    pub default_branch: String,
    pub integration_branch: String,

    #[serde(default)]
    pub work_items: Vec<WorkItem>,

    #[serde(default)]
    pub session_log: Vec<SessionLogEntry>,

    pub safety: SafetyLimits,

    #[serde(default)]
    pub pr: PrRef,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Mission {
    pub fn new(repo: impl Into<String>, description: impl Into<String>, config: &ProjectConfig) -> Self {
        let repo = repo.into();
        let now = Utc::now();
        let mission_id = format!(
            "mission-{}-{:03}",
            now.format("%Y%m%d"),
            now.timestamp_millis() % 1000
        );

        Self {
            integration_branch: format!("armada/{}/integration", mission_id),
            mission_id,
            repo,
            description: description.into(),
            status: MissionStatus::Planning,
            default_branch: config.default_branch.clone(),
            work_items: Vec::new(),
            session_log: Vec::new(),
            safety: SafetyLimits::new(config, now),
            pr: PrRef::default(),
            created_at: now,
            version: 0,
            updated_at: None,
        }
    }

    pub fn branch_for_item(&self, item_id: &str) -> String {
        format!("armada/{}/{}", self.mission_id, item_id)
    }

    pub fn item(&self, item_id: &str) -> Option<&WorkItem> {
        self.work_items.iter().find(|w| w.id == item_id)
    }

    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut WorkItem> {
        self.work_items.iter_mut().find(|w| w.id == item_id)
    }

    pub fn items_by_status(&self, status: WorkItemStatus) -> Vec<&WorkItem> {
        self.work_items
            .iter()
            .filter(|w| w.status == status)
            .collect()
    }

    /// Items eligible for dispatch: status `ready` and every dependency
    /// `done`. Dependencies in any other state (including failed) block.
    pub fn ready_items(&self) -> Vec<&WorkItem> {
        let done: HashSet<&str> = self
            .work_items
            .iter()
            .filter(|w| w.status == WorkItemStatus::Done)
            .map(|w| w.id.as_str())
            .collect();

        self.work_items
            .iter()
            .filter(|w| {
                w.status == WorkItemStatus::Ready
                    && w.depends_on.iter().all(|dep| done.contains(dep.as_str()))
            })
            .collect()
    }

    /// Promote blocked items whose dependencies have all completed.
    /// Returns how many items became ready.
    pub fn promote_unblocked(&mut self) -> usize {
        let done: HashSet<String> = self
            .work_items
            .iter()
            .filter(|w| w.status == WorkItemStatus::Done)
            .map(|w| w.id.clone())
            .collect();

        let mut promoted = 0;
        for item in &mut self.work_items {
            if item.status == WorkItemStatus::Blocked
                && item.depends_on.iter().all(|dep| done.contains(dep))
            {
                item.status = WorkItemStatus::Ready;
                promoted += 1;
            }
        }
        promoted
    }

    pub fn all_items_done(&self) -> bool {
        !self.work_items.is_empty()
            && self
                .work_items
                .iter()
                .all(|w| w.status == WorkItemStatus::Done)
    }

    pub fn progress(&self) -> Progress {
        let total = self.work_items.len();
        let done = self
            .work_items
            .iter()
            .filter(|w| w.status == WorkItemStatus::Done)
            .count();
        Progress {
            done,
            total,
            percent: if total > 0 {
                (done * 100 / total) as u8
            } else {
                0
            },
        }
    }

    /// Reject dangling dependency edges and cycles before any dispatch.
    pub fn validate_dependencies(&self) -> Result<()> {
        let index: HashMap<&str, usize> = self
            .work_items
            .iter()
            .enumerate()
            .map(|(i, w)| (w.id.as_str(), i))
            .collect();

        if index.len() != self.work_items.len() {
            return Err(ArmadaError::DependencyGraph(
                "duplicate work item ids".to_string(),
            ));
        }

        for item in &self.work_items {
            for dep in &item.depends_on {
                if !index.contains_key(dep.as_str()) {
                    return Err(ArmadaError::DependencyGraph(format!(
                        "{} depends on unknown item {}",
                        item.id, dep
                    )));
                }
            }
        }

        // Iterative DFS with three-color marking.
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }
        let mut marks = vec![Mark::White; self.work_items.len()];

        for start in 0..self.work_items.len() {
            if marks[start] != Mark::White {
                continue;
            }
            let mut stack = vec![(start, 0usize)];
            marks[start] = Mark::Grey;

            while let Some((node, edge)) = stack.pop() {
                let deps = &self.work_items[node].depends_on;
                if edge < deps.len() {
                    stack.push((node, edge + 1));
                    let next = index[deps[edge].as_str()];
                    match marks[next] {
                        Mark::White => {
                            marks[next] = Mark::Grey;
                            stack.push((next, 0));
                        }
                        Mark::Grey => {
                            return Err(ArmadaError::DependencyGraph(format!(
                                "dependency cycle involving {}",
                                self.work_items[next].id
                            )));
                        }
                        Mark::Black => {}
                    }
                } else {
                    marks[node] = Mark::Black;
                }
            }
        }

        Ok(())
    }
}

/// One schedulable unit of a mission's decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: WorkItemStatus,

    #[serde(default)]
    pub phase: u32,

    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Agent name the planner assigned this item to.
    #[serde(default)]
    pub assigned_to: String,

    #[serde(default)]
    pub risk_flags: Vec<RiskCategory>,

    /// Requires human approval before the mission proceeds past it.
    #[serde(default)]
    pub checkpoint: bool,
    pub checkpoint_message: Option<String>,

    /// Declared file scope; feeds the risk classifier.
    #[serde(default)]
    pub context_sources: Vec<String>,

    pub worker_slot: Option<usize>,
    pub git_branch: Option<String>,

    #[serde(default)]
    pub merged: bool,

    #[serde(default)]
    pub reviewed_by: Vec<ReviewerRole>,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub evidence_path: Option<String>,
}

impl WorkItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            status: WorkItemStatus::Ready,
            phase: 1,
            depends_on: Vec::new(),
            assigned_to: String::new(),
            risk_flags: Vec::new(),
            checkpoint: false,
            checkpoint_message: None,
            context_sources: Vec::new(),
            worker_slot: None,
            git_branch: None,
            merged: false,
            reviewed_by: Vec::new(),
            started_at: None,
            completed_at: None,
            error: None,
            evidence_path: None,
        }
    }

    pub fn with_depends_on(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_status(mut self, status: WorkItemStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_checkpoint(mut self, message: impl Into<String>) -> Self {
        self.checkpoint = true;
        self.checkpoint_message = Some(message.into());
        self
    }
}

/// Per-mission resource budget. The scheduler refuses to launch new work
/// once any limit is exceeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyLimits {
    pub max_sessions: u32,
    pub max_elapsed_hours: u64,
    pub max_parallel_workers: usize,
    #[serde(default)]
    pub session_count: u32,
    pub started_at: DateTime<Utc>,
}

impl SafetyLimits {
    pub fn new(config: &ProjectConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            max_sessions: config.max_sessions,
            max_elapsed_hours: config.max_elapsed_hours,
            max_parallel_workers: config.max_parallel_workers,
            session_count: 0,
            started_at,
        }
    }

    /// Returns the breach reason when a limit is exceeded.
    pub fn exceeded(&self, now: DateTime<Utc>) -> Option<String> {
        if self.session_count >= self.max_sessions {
            return Some(format!("session limit reached ({})", self.max_sessions));
        }
        let elapsed_hours = (now - self.started_at).num_seconds() as f64 / 3600.0;
        if elapsed_hours >= self.max_elapsed_hours as f64 {
            return Some(format!("time limit reached ({}h)", self.max_elapsed_hours));
        }
        None
    }
}

/// Immutable record of one worker invocation. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub session_id: String,
    pub agent: String,
    pub objective: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub exit_code: Option<i32>,
}

impl SessionLogEntry {
    pub fn new(
        agent: impl Into<String>,
        objective: impl Into<String>,
        started_at: DateTime<Utc>,
        exit_code: Option<i32>,
    ) -> Self {
        let ended_at = Utc::now();
        Self {
            session_id: format!("sess-{}", ended_at.timestamp_millis()),
            agent: agent.into(),
            objective: objective.into(),
            started_at,
            ended_at,
            exit_code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Open,
    Merged,
    Closed,
    Unknown,
}

impl PrState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Merged => "merged",
            Self::Closed => "closed",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrRef {
    pub number: Option<u64>,
    pub url: Option<String>,
    pub state: Option<PrState>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
    pub percent: u8,
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}% ({}/{})", self.percent, self.done, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mission_with(items: Vec<WorkItem>) -> Mission {
        let mut mission = Mission::new("api", "test mission", &ProjectConfig::default());
        mission.work_items = items;
        mission
    }

    #[test]
    fn ready_set_requires_done_dependencies() {
        let mission = mission_with(vec![
            WorkItem::new("A", "a", "").with_status(WorkItemStatus::Done),
            WorkItem::new("B", "b", "").with_depends_on(vec!["A".to_string()]),
            WorkItem::new("C", "c", "")
                .with_depends_on(vec!["A".to_string(), "D".to_string()]),
            WorkItem::new("D", "d", "").with_status(WorkItemStatus::InProgress),
        ]);

        let ready: Vec<&str> = mission.ready_items().iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ready, vec!["B"]);
    }

    #[test]
    fn ready_set_includes_empty_dependency_items() {
        let mission = mission_with(vec![
            WorkItem::new("A", "a", ""),
            WorkItem::new("B", "b", "").with_status(WorkItemStatus::Blocked),
        ]);
        let ready: Vec<&str> = mission.ready_items().iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ready, vec!["A"]);
    }

    #[test]
    fn blocked_items_promote_when_dependencies_complete() {
        let mut mission = mission_with(vec![
            WorkItem::new("A", "a", "").with_status(WorkItemStatus::Done),
            WorkItem::new("B", "b", "")
                .with_depends_on(vec!["A".to_string()])
                .with_status(WorkItemStatus::Blocked),
            WorkItem::new("C", "c", "")
                .with_depends_on(vec!["B".to_string()])
                .with_status(WorkItemStatus::Blocked),
        ]);

        assert_eq!(mission.promote_unblocked(), 1);
        assert_eq!(mission.item("B").unwrap().status, WorkItemStatus::Ready);
        assert_eq!(mission.item("C").unwrap().status, WorkItemStatus::Blocked);
        // Idempotent until something else completes.
        assert_eq!(mission.promote_unblocked(), 0);
    }

    #[test]
    fn dangling_dependency_rejected() {
        let mission = mission_with(vec![
            WorkItem::new("A", "a", "").with_depends_on(vec!["ghost".to_string()])
        ]);
        assert!(matches!(
            mission.validate_dependencies(),
            Err(ArmadaError::DependencyGraph(_))
        ));
    }

    #[test]
    fn dependency_cycle_rejected() {
        let mission = mission_with(vec![
            WorkItem::new("A", "a", "").with_depends_on(vec!["B".to_string()]),
            WorkItem::new("B", "b", "").with_depends_on(vec!["C".to_string()]),
            WorkItem::new("C", "c", "").with_depends_on(vec!["A".to_string()]),
        ]);
        assert!(matches!(
            mission.validate_dependencies(),
            Err(ArmadaError::DependencyGraph(_))
        ));
    }

    #[test]
    fn acyclic_graph_accepted() {
        let mission = mission_with(vec![
            WorkItem::new("A", "a", ""),
            WorkItem::new("B", "b", "").with_depends_on(vec!["A".to_string()]),
            WorkItem::new("C", "c", "")
                .with_depends_on(vec!["A".to_string(), "B".to_string()]),
        ]);
        assert!(mission.validate_dependencies().is_ok());
    }

    #[test]
    fn safety_session_limit() {
        let mut limits = SafetyLimits::new(&ProjectConfig::default(), Utc::now());
        assert!(limits.exceeded(Utc::now()).is_none());

        limits.session_count = limits.max_sessions;
        assert!(limits.exceeded(Utc::now()).unwrap().contains("session limit"));
    }

    #[test]
    fn safety_time_limit() {
        let started = Utc::now() - chrono::Duration::hours(7);
        let limits = SafetyLimits::new(&ProjectConfig::default(), started);
        assert!(limits.exceeded(Utc::now()).unwrap().contains("time limit"));
    }

    #[test]
    fn branch_names_are_mission_scoped() {
        let mission = mission_with(vec![]);
        let branch = mission.branch_for_item("obj-3");
        assert!(branch.starts_with("armada/mission-"));
        assert!(branch.ends_with("/obj-3"));
        assert!(mission.integration_branch.ends_with("/integration"));
    }

    #[test]
    fn progress_counts_done_only() {
        let mission = mission_with(vec![
            WorkItem::new("A", "a", "").with_status(WorkItemStatus::Done),
            WorkItem::new("B", "b", "").with_status(WorkItemStatus::Failed),
            WorkItem::new("C", "c", ""),
        ]);
        let p = mission.progress();
        assert_eq!((p.done, p.total, p.percent), (1, 3, 33));
    }
}
