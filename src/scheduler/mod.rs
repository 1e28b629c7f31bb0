//! The mission scheduler.
//!
//! Drives a mission through its whole lifecycle: planning, approval,
//! batched parallel execution of the work item graph, integration
//! merging, mandatory risk reviews, and the final pull request. All
//! durable state lives in the store; the scheduler re-reads the mission
//! document at every decision point, so a crashed run resumes from the
//! document alone.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{ProjectConfig, StatePaths};
use crate::error::{ArmadaError, Result};
use crate::evidence;
use crate::git::GitRunner;
use crate::health::HealthPatrol;
use crate::merge::IntegrationMerger;
use crate::mission::{
    Mission, MissionStatus, PrState, SessionLogEntry, WorkItem, WorkItemStatus,
};
use crate::notification::{EventType, MissionEvent, Reporter};
use crate::risk::{mandatory_reviewers, ReviewerRole, RiskClassifier};
use crate::store::MissionStore;
use crate::worker::{ConflictResolver, Planner, PrProvider, Worker, WorkerOutcome};
use crate::workspace::WorkspaceManager;

/// How one pass of the work loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Every work item is done.
    Completed,
    /// No item is runnable and at least one is not done.
    Failed(String),
    /// A checkpoint item needs human approval.
    CheckpointPaused(String),
    /// A safety limit tripped.
    SafetyPaused(String),
}

pub struct MissionScheduler {
    paths: StatePaths,
    config: ProjectConfig,
    repo: String,
    store: MissionStore,
    classifier: RiskClassifier,
    merger: IntegrationMerger,
    workspaces: WorkspaceManager,
    patrol: HealthPatrol,
    planner: Arc<dyn Planner>,
    worker: Arc<dyn Worker>,
    resolver: Arc<dyn ConflictResolver>,
    pr_provider: Arc<dyn PrProvider>,
    reporter: Arc<dyn Reporter>,
}

impl MissionScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        paths: StatePaths,
        config: ProjectConfig,
        repo: impl Into<String>,
        planner: Arc<dyn Planner>,
        worker: Arc<dyn Worker>,
        resolver: Arc<dyn ConflictResolver>,
        pr_provider: Arc<dyn PrProvider>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self> {
        let repo = repo.into();
        let store = MissionStore::new(paths.clone());
        Ok(Self {
            classifier: RiskClassifier::new(&config.high_risk_patterns)?,
            merger: IntegrationMerger::new(paths.clone(), store.clone()),
            workspaces: WorkspaceManager::new(paths.clone(), repo.clone()),
            patrol: HealthPatrol::new(paths.clone(), config.health.clone()),
            store,
            paths,
            config,
            repo,
            planner,
            worker,
            resolver,
            pr_provider,
            reporter,
        })
    }

    pub fn store(&self) -> &MissionStore {
        &self.store
    }

    /// Create a mission, run the planner, and leave it awaiting approval
    /// (or go straight into execution with `auto_approve`).
    pub async fn start(&self, description: &str, auto_approve: bool) -> Result<Mission> {
        let mission = Mission::new(self.repo.clone(), description, &self.config);
        self.store.create(&mission).await?;
        self.emit(&mission.mission_id, EventType::MissionCreated, Some(description))
            .await;

        if let Err(e) = self.planner.decompose(&mission).await {
            self.fail(&mission.mission_id, &format!("planning failed: {}", e))
                .await?;
            return Err(e);
        }
        self.store
            .increment_session_count(&self.repo, &mission.mission_id)
            .await?;

        let mission = self.settle_plan(&mission.mission_id).await?;
        let mission = self.classify_items(&mission.mission_id).await?;

        self.reporter
            .post(&format!(
                "plan ready: {} work items across {} phases",
                mission.work_items.len(),
                mission
                    .work_items
                    .iter()
                    .map(|w| w.phase)
                    .max()
                    .unwrap_or(1)
            ))
            .await?;
        let mission = self
            .set_status(&mission.mission_id, MissionStatus::PendingApproval)
            .await?;
        self.emit(&mission.mission_id, EventType::MissionPlanned, None)
            .await;

        if auto_approve {
            self.approve(&mission.mission_id).await
        } else {
            Ok(mission)
        }
    }

    /// Wait for the planner's work items to land in the store, then vet
    /// them. An empty or oversized plan fails the mission.
    async fn settle_plan(&self, mission_id: &str) -> Result<Mission> {
        let mut mission = self.store.read(&self.repo, mission_id).await?;
        let mut attempts = 0;
        while mission.work_items.is_empty() && attempts < self.config.planner_settle_attempts {
            tokio::time::sleep(Duration::from_millis(self.config.planner_settle_ms)).await;
            mission = self.store.read(&self.repo, mission_id).await?;
            attempts += 1;
        }

        if mission.work_items.is_empty() {
            self.fail(mission_id, "planner produced no work items").await?;
            return Err(ArmadaError::Planning(
                "planner produced no work items".to_string(),
            ));
        }
        if mission.work_items.len() > self.config.max_work_items {
            let reason = format!(
                "planner produced {} work items (limit {})",
                mission.work_items.len(),
                self.config.max_work_items
            );
            self.fail(mission_id, &reason).await?;
            return Err(ArmadaError::Planning(reason));
        }
        if let Err(e) = mission.validate_dependencies() {
            self.fail(mission_id, &format!("invalid plan: {}", e)).await?;
            return Err(e);
        }

        Ok(mission)
    }

    /// Fill in risk flags for any item the planner left unclassified.
    async fn classify_items(&self, mission_id: &str) -> Result<Mission> {
        self.store
            .mutate(&self.repo, mission_id, |mission| {
                for item in &mut mission.work_items {
                    if item.risk_flags.is_empty() {
                        item.risk_flags = self.classifier.classify(item).into_iter().collect();
                    }
                }
                Ok(())
            })
            .await
    }

    /// Approve a pending mission and run it to its next stopping point.
    pub async fn approve(&self, mission_id: &str) -> Result<Mission> {
        let mission = self.store.read(&self.repo, mission_id).await?;
        if mission.status != MissionStatus::PendingApproval {
            return Err(ArmadaError::InvalidMissionState {
                expected: MissionStatus::PendingApproval.to_string(),
                actual: mission.status.to_string(),
            });
        }
        self.emit(mission_id, EventType::MissionApproved, None).await;
        self.execute(mission_id).await
    }

    /// Resume a mission stopped at a checkpoint (or still awaiting
    /// approval). The checkpointed item is re-armed and its checkpoint
    /// cleared, so approval is consumed exactly once.
    pub async fn resume(&self, mission_id: &str) -> Result<Mission> {
        let mission = self.store.read(&self.repo, mission_id).await?;
        if !mission.status.is_resumable() {
            return Err(ArmadaError::InvalidMissionState {
                expected: "checkpoint_paused or pending_approval".to_string(),
                actual: mission.status.to_string(),
            });
        }

        if mission.status == MissionStatus::PendingApproval {
            return self.approve(mission_id).await;
        }

        self.store
            .mutate(&self.repo, mission_id, |mission| {
                for item in &mut mission.work_items {
                    if item.status == WorkItemStatus::CheckpointPaused {
                        item.status = WorkItemStatus::Ready;
                        item.checkpoint = false;
                        self.patrol.clear_failures(&item.id);
                    }
                }
                mission.status = MissionStatus::InProgress;
                Ok(())
            })
            .await?;
        self.emit(mission_id, EventType::MissionResumed, None).await;

        self.run_to_completion(mission_id).await
    }

    /// Re-enter a mission an interrupted run left `in_progress`. Items
    /// that were mid-flight when the process died are re-armed; everything
    /// else resumes from the persisted document.
    pub async fn recover(&self, mission_id: &str) -> Result<Mission> {
        let mission = self.store.read(&self.repo, mission_id).await?;
        if mission.status != MissionStatus::InProgress {
            return Err(ArmadaError::InvalidMissionState {
                expected: MissionStatus::InProgress.to_string(),
                actual: mission.status.to_string(),
            });
        }

        self.emit(mission_id, EventType::MissionResumed, Some("re-entering after interrupted run"))
            .await;
        self.merger.ensure_integration_branch(&mission).await?;
        self.reset_orphaned_items(mission_id).await?;
        self.run_to_completion(mission_id).await
    }

    /// Abort a mission from any non-terminal state and clean up.
    pub async fn abort(&self, mission_id: &str) -> Result<Mission> {
        let mission = self
            .set_status(mission_id, MissionStatus::Aborted)
            .await?;
        self.emit(mission_id, EventType::MissionAborted, None).await;

        if let Err(e) = self.workspaces.release_all().await {
            warn!(error = %e, "workspace cleanup failed during abort");
        }
        if mission.pr.number.is_some() {
            if let Err(e) = self.pr_provider.close(&mission).await {
                warn!(error = %e, "failed to close pull request during abort");
            }
        }
        Ok(mission)
    }

    /// Transition an approved mission into execution.
    async fn execute(&self, mission_id: &str) -> Result<Mission> {
        let mission = self
            .set_status(mission_id, MissionStatus::InProgress)
            .await?;
        self.emit(mission_id, EventType::MissionStarted, None).await;

        self.merger.ensure_integration_branch(&mission).await?;
        self.reset_orphaned_items(mission_id).await?;
        self.run_to_completion(mission_id).await
    }

    /// After a crash, `in_progress` items have no live worker behind them.
    /// Re-arm them so the loop re-dispatches from scratch.
    async fn reset_orphaned_items(&self, mission_id: &str) -> Result<()> {
        self.store
            .mutate(&self.repo, mission_id, |mission| {
                for item in &mut mission.work_items {
                    if item.status == WorkItemStatus::InProgress {
                        info!(item = %item.id, "resetting orphaned in-progress item");
                        item.status = WorkItemStatus::Ready;
                        item.worker_slot = None;
                        // A retried item starts with a clean failure streak.
                        self.patrol.clear_failures(&item.id);
                    }
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn run_to_completion(&self, mission_id: &str) -> Result<Mission> {
        match self.work_loop(mission_id).await? {
            LoopOutcome::Completed => self.finalize(mission_id).await,
            LoopOutcome::Failed(reason) => {
                self.fail(mission_id, &reason).await?;
                self.release_workspaces_best_effort().await;
                self.store.read(&self.repo, mission_id).await
            }
            LoopOutcome::CheckpointPaused(message) => {
                let mission = self
                    .set_status(mission_id, MissionStatus::CheckpointPaused)
                    .await?;
                self.emit(mission_id, EventType::MissionCheckpoint, Some(&message))
                    .await;
                Ok(mission)
            }
            LoopOutcome::SafetyPaused(reason) => {
                let mission = self.set_status(mission_id, MissionStatus::Paused).await?;
                self.emit(mission_id, EventType::MissionPaused, Some(&reason))
                    .await;
                self.release_workspaces_best_effort().await;
                Ok(mission)
            }
        }
    }

    /// The batch loop. Each iteration re-reads the mission, checks safety,
    /// pauses on checkpoints, dispatches one batch of ready items into
    /// worktrees, folds finished branches into integration, and runs any
    /// newly due reviews.
    async fn work_loop(&self, mission_id: &str) -> Result<LoopOutcome> {
        loop {
            let mut mission = self.store.read(&self.repo, mission_id).await?;

            if let Some(reason) = mission.safety.exceeded(Utc::now()) {
                return Ok(LoopOutcome::SafetyPaused(reason));
            }

            // Unblock items whose dependencies landed in the last batch.
            let mut scratch = mission.clone();
            if scratch.promote_unblocked() > 0 {
                mission = self
                    .store
                    .mutate(&self.repo, mission_id, |m| {
                        m.promote_unblocked();
                        Ok(())
                    })
                    .await?;
            }

            let ready: Vec<WorkItem> =
                mission.ready_items().into_iter().cloned().collect();
            if ready.is_empty() {
                if mission.all_items_done() {
                    return Ok(LoopOutcome::Completed);
                }
                let stuck: Vec<&str> = mission
                    .work_items
                    .iter()
                    .filter(|w| w.status != WorkItemStatus::Done)
                    .map(|w| w.id.as_str())
                    .collect();
                return Ok(LoopOutcome::Failed(format!(
                    "no runnable items; unfinished: {}",
                    stuck.join(", ")
                )));
            }

            if let Some(gate) = ready.iter().find(|w| w.checkpoint) {
                let message = gate
                    .checkpoint_message
                    .clone()
                    .unwrap_or_else(|| format!("{} requires approval", gate.id));
                self.store
                    .update_item(&self.repo, mission_id, &gate.id, |item| {
                        item.status = WorkItemStatus::CheckpointPaused;
                    })
                    .await?;
                return Ok(LoopOutcome::CheckpointPaused(message));
            }

            let batch: Vec<WorkItem> = ready
                .into_iter()
                .take(self.config.max_parallel_workers.min(
                    mission.safety.max_parallel_workers,
                ))
                .collect();

            self.dispatch_batch(&mission, batch).await?;

            let mission = self.store.read(&self.repo, mission_id).await?;
            self.merger
                .merge_completed(&mission, &self.resolver, self.reporter.as_ref())
                .await?;
            self.run_mandatory_reviews(mission_id).await?;

            let mission = self.store.read(&self.repo, mission_id).await?;
            if let Err(e) = self
                .patrol
                .patrol(&mission, self.reporter.as_ref())
                .await
            {
                warn!(error = %e, "health patrol pass failed");
            }
        }
    }

    /// Provision one worktree per batch item, run all workers in parallel,
    /// and record every outcome. The batch is a barrier: nothing new starts
    /// until every member finishes.
    async fn dispatch_batch(&self, mission: &Mission, batch: Vec<WorkItem>) -> Result<()> {
        let mut launched: Vec<(WorkItem, PathBuf, usize)> = Vec::new();

        for (slot, item) in batch.into_iter().enumerate() {
            let branch = mission.branch_for_item(&item.id);
            let workspace = self
                .workspaces
                .provision(slot, &branch, &mission.integration_branch)
                .await?;

            let updated = self
                .store
                .update_item(&self.repo, &mission.mission_id, &item.id, |i| {
                    i.status = WorkItemStatus::InProgress;
                    i.worker_slot = Some(slot);
                    i.git_branch = Some(branch.clone());
                    i.started_at = Some(Utc::now());
                })
                .await?;
            self.emit_objective(&mission.mission_id, EventType::ObjectiveStarted, &item.id)
                .await;

            // Workers see the item as persisted, slot and branch included.
            let item = updated
                .item(&item.id)
                .cloned()
                .ok_or_else(|| ArmadaError::ItemNotFound {
                    mission_id: mission.mission_id.clone(),
                    item_id: item.id.clone(),
                })?;
            launched.push((item, workspace, slot));
        }

        let mut tasks: JoinSet<(String, usize, Result<WorkerOutcome>)> = JoinSet::new();
        for (item, workspace, slot) in launched {
            let worker = Arc::clone(&self.worker);
            let mission = mission.clone();
            tasks.spawn(async move {
                let result = worker.execute(&workspace, &item, &mission).await;
                (item.id, slot, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (item_id, slot, result) = joined
                .map_err(|e| ArmadaError::Worker(format!("worker task panicked: {}", e)))?;
            self.record_outcome(&mission.mission_id, &item_id, result)
                .await?;
            if let Err(e) = self.workspaces.release(slot).await {
                warn!(slot, error = %e, "workspace release failed");
            }
        }

        Ok(())
    }

    async fn record_outcome(
        &self,
        mission_id: &str,
        item_id: &str,
        result: Result<WorkerOutcome>,
    ) -> Result<()> {
        let evidence_path = self.paths.evidence_file(&self.repo, mission_id, item_id);
        let evidence_found = evidence_path.exists();

        let (status, error, exit_code) = match &result {
            Ok(outcome) if outcome.success => (WorkItemStatus::Done, None, outcome.exit_code),
            Ok(outcome) => {
                self.patrol
                    .record_test_failure(item_id, &failure_signature(outcome));
                (
                    WorkItemStatus::Failed,
                    Some(format!("worker exited with {:?}", outcome.exit_code)),
                    outcome.exit_code,
                )
            }
            Err(e) => {
                self.patrol.record_test_failure(item_id, &e.to_string());
                (WorkItemStatus::Failed, Some(e.to_string()), None)
            }
        };

        let updated = self
            .store
            .update_item(&self.repo, mission_id, item_id, |item| {
                item.status = status;
                item.completed_at = Some(Utc::now());
                item.error = error.clone();
                if status == WorkItemStatus::Done && evidence_found {
                    item.evidence_path =
                        Some(evidence_path.to_string_lossy().to_string());
                }
            })
            .await?;

        let started_at = updated
            .item(item_id)
            .and_then(|i| i.started_at)
            .unwrap_or_else(Utc::now);
        let assigned = updated
            .item(item_id)
            .map(|i| i.assigned_to.clone())
            .unwrap_or_default();
        self.store
            .append_session_log(
                &self.repo,
                mission_id,
                SessionLogEntry::new(
                    if assigned.is_empty() { "implementer".to_string() } else { assigned },
                    item_id,
                    started_at,
                    exit_code,
                ),
            )
            .await?;

        match status {
            WorkItemStatus::Done => {
                self.patrol.clear_failures(item_id);
                self.emit_objective(mission_id, EventType::ObjectiveCompleted, item_id)
                    .await;
            }
            _ => {
                self.emit_objective(mission_id, EventType::ObjectiveFailed, item_id)
                    .await;
            }
        }
        Ok(())
    }

    /// Run every mandatory review that has not already passed. A reviewer
    /// that fails leaves the item un-recorded, so the next loop pass (or a
    /// resumed run) retries it. The human reviewer role is handled by the
    /// checkpoint mechanism, never invoked here.
    async fn run_mandatory_reviews(&self, mission_id: &str) -> Result<()> {
        let mission = self.store.read(&self.repo, mission_id).await?;
        let clone_dir = self.paths.clone_dir(&self.repo);
        let artifacts = self.paths.artifacts_dir(&self.repo, mission_id);
        let artifacts_hint = artifacts.to_string_lossy().to_string();

        for item in mission.items_by_status(WorkItemStatus::Done) {
            for role in mandatory_reviewers(item.risk_flags.iter()) {
                if role == ReviewerRole::Human || item.reviewed_by.contains(&role) {
                    continue;
                }

                let prompt = role.review_prompt(item, &artifacts_hint);
                let outcome = match self
                    .worker
                    .execute_specialist(&clone_dir, role.as_str(), &prompt, &mission)
                    .await
                {
                    Ok(outcome) => outcome,
                    // A reviewer that never ran is not a verdict; leave the
                    // item un-recorded so the next pass retries it.
                    Err(e) => {
                        warn!(role = %role, item = %item.id, error = %e, "review session failed to run");
                        self.reporter
                            .post(&format!(
                                "{} review of {} could not run, will retry: {}",
                                role, item.id, e
                            ))
                            .await?;
                        continue;
                    }
                };
                self.store
                    .increment_session_count(&self.repo, mission_id)
                    .await?;

                if outcome.success {
                    self.store
                        .update_item(&self.repo, mission_id, &item.id, |i| {
                            i.reviewed_by.push(role);
                        })
                        .await?;
                    self.emit_objective(mission_id, EventType::ReviewCompleted, &item.id)
                        .await;
                } else {
                    self.reporter
                        .post(&format!(
                            "{} review of {} did not pass, will retry",
                            role, item.id
                        ))
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Merge stragglers, run the last reviews, publish the integration
    /// branch, and open the pull request. The mission rests in `review`
    /// while the PR is open; `cleanup` completes it after the merge. A
    /// failed PR creation fails the mission.
    async fn finalize(&self, mission_id: &str) -> Result<Mission> {
        let mission = self.set_status(mission_id, MissionStatus::Merging).await?;
        self.merger
            .merge_completed(&mission, &self.resolver, self.reporter.as_ref())
            .await?;

        let mission = self.set_status(mission_id, MissionStatus::Review).await?;
        self.run_mandatory_reviews(mission_id).await?;

        let git = GitRunner::new(self.paths.clone_dir(&self.repo));
        if let Err(e) = git.push("origin", &mission.integration_branch).await {
            warn!(error = %e, "failed to push integration branch");
        }

        let mission = self.store.read(&self.repo, mission_id).await?;
        let bundles = evidence::read_all(&self.paths, &mission).await;
        let body = evidence::build_pr_body(&mission, &bundles);
        let title = format!("{}: {}", mission.mission_id, truncate(&mission.description, 60));

        match self.pr_provider.create(&mission, &title, &body).await {
            Ok(pr) => {
                let url = pr.url.clone().unwrap_or_default();
                self.store
                    .mutate(&self.repo, mission_id, |m| {
                        m.pr = pr.clone();
                        Ok(())
                    })
                    .await?;
                self.emit(mission_id, EventType::PrCreated, Some(&url)).await;
            }
            Err(e) => {
                self.release_workspaces_best_effort().await;
                self.fail(mission_id, &format!("pull request creation failed: {}", e))
                    .await?;
                return Err(e);
            }
        }

        self.release_workspaces_best_effort().await;
        self.store.read(&self.repo, mission_id).await
    }

    /// Current pull request state, persisted on the mission document.
    pub async fn pr_status(&self, mission_id: &str) -> Result<PrState> {
        let mission = self.store.read(&self.repo, mission_id).await?;
        if mission.pr.number.is_none() {
            return Err(ArmadaError::PullRequest(
                "mission has no pull request".to_string(),
            ));
        }

        let state = self.pr_provider.status(&mission).await?;
        self.store
            .mutate(&self.repo, mission_id, |m| {
                m.pr.state = Some(state);
                Ok(())
            })
            .await?;
        Ok(state)
    }

    /// Post-merge cleanup: once the pull request has merged, delete the
    /// mission's item and integration branches (locally and on the remote,
    /// best effort), sweep the worktrees, and complete the mission.
    pub async fn cleanup(&self, mission_id: &str) -> Result<Mission> {
        let mission = self.store.read(&self.repo, mission_id).await?;
        if mission.status != MissionStatus::Review {
            return Err(ArmadaError::InvalidMissionState {
                expected: MissionStatus::Review.to_string(),
                actual: mission.status.to_string(),
            });
        }
        if mission.pr.number.is_some() {
            let state = self.pr_provider.status(&mission).await?;
            if state != PrState::Merged {
                return Err(ArmadaError::PullRequest(format!(
                    "pull request for {} is {}, not merged",
                    mission.mission_id, state
                )));
            }
        }

        self.release_workspaces_best_effort().await;

        let git = GitRunner::new(self.paths.clone_dir(&self.repo));
        git.checkout(&mission.default_branch).await?;
        let mut branches: Vec<String> = mission
            .work_items
            .iter()
            .filter_map(|w| w.git_branch.clone())
            .collect();
        branches.push(mission.integration_branch.clone());
        for branch in branches {
            if git.branch_exists(&branch).await {
                if let Err(e) = git.delete_branch(&branch).await {
                    warn!(branch = %branch, error = %e, "local branch delete failed");
                }
            }
            if let Err(e) = git.push_delete("origin", &branch).await {
                debug!(branch = %branch, error = %e, "remote branch delete skipped");
            }
        }

        let mission = self
            .set_status(mission_id, MissionStatus::Completed)
            .await?;
        self.emit(mission_id, EventType::MissionCompleted, None).await;
        Ok(mission)
    }

    async fn fail(&self, mission_id: &str, reason: &str) -> Result<Mission> {
        let mission = self.set_status(mission_id, MissionStatus::Failed).await?;
        self.emit(mission_id, EventType::MissionFailed, Some(reason))
            .await;
        Ok(mission)
    }

    /// Validated status transition, persisted under the mission lock.
    async fn set_status(&self, mission_id: &str, target: MissionStatus) -> Result<Mission> {
        self.store
            .mutate(&self.repo, mission_id, |mission| {
                if !mission.status.can_transition_to(target) {
                    return Err(ArmadaError::InvalidStateTransition {
                        from: mission.status.to_string(),
                        to: target.to_string(),
                        allowed: mission
                            .status
                            .allowed_transitions()
                            .iter()
                            .map(|s| s.to_string())
                            .collect::<Vec<_>>()
                            .join(", "),
                    });
                }
                mission.status = target;
                Ok(())
            })
            .await
    }

    async fn release_workspaces_best_effort(&self) {
        if let Err(e) = self.workspaces.release_all().await {
            warn!(error = %e, "workspace sweep failed");
        }
    }

    async fn emit(&self, mission_id: &str, event_type: EventType, message: Option<&str>) {
        let mut event = MissionEvent::new(event_type, mission_id);
        if let Some(message) = message {
            event = event.with_message(message);
        }
        if let Err(e) = self.reporter.notify(&event).await {
            warn!(error = %e, "notification failed");
        }
    }

    async fn emit_objective(&self, mission_id: &str, event_type: EventType, item_id: &str) {
        let event = MissionEvent::new(event_type, mission_id).with_objective(item_id);
        if let Err(e) = self.reporter.notify(&event).await {
            warn!(error = %e, "notification failed");
        }
    }
}

/// Stable signature for a failed worker run, used to spot the same
/// failure recurring. The tail of stderr is where test runners put the
/// verdict; fall back to the exit code when there is none.
fn failure_signature(outcome: &WorkerOutcome) -> String {
    outcome
        .stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.to_string())
        .unwrap_or_else(|| format!("exit code {:?}", outcome.exit_code))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut.trim_end())
    }
}
