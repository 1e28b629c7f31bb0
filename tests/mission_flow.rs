//! End-to-end scheduler tests against a real temporary git repository,
//! with scripted stand-ins for the agent CLI and the PR provider.

use std::collections::HashSet;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use armada::config::{ProjectConfig, StatePaths};
use armada::error::{ArmadaError, Result};
use armada::mission::{Mission, MissionStatus, PrRef, PrState, WorkItem, WorkItemStatus};
use armada::notification::Reporter;
use armada::scheduler::MissionScheduler;
use armada::store::MissionStore;
use armada::worker::{ConflictResolver, Planner, PrProvider, Worker, WorkerOutcome};

const REPO: &str = "sandbox";

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git not available");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn branch_exists(dir: &Path, branch: &str) -> bool {
    Command::new("git")
        .args(["rev-parse", "--verify", "--quiet", branch])
        .current_dir(dir)
        .output()
        .expect("git not available")
        .status
        .success()
}

/// A throwaway clone at `<projects>/sandbox` with one commit on `main`.
fn init_repo(paths: &StatePaths) {
    let dir = paths.clone_dir(REPO);
    std::fs::create_dir_all(&dir).unwrap();
    git(&dir, &["init", "-b", "main"]);
    git(&dir, &["config", "user.email", "armada@test"]);
    git(&dir, &["config", "user.name", "armada"]);
    git(&dir, &["commit", "--allow-empty", "-m", "initial"]);
}

struct StaticPlanner {
    store: MissionStore,
    items: Vec<WorkItem>,
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn decompose(&self, mission: &Mission) -> Result<()> {
        let items = self.items.clone();
        self.store
            .mutate(&mission.repo, &mission.mission_id, |m| {
                m.work_items = items;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// Commits a marker per objective and records every call. With a
/// `conflict_file` set, every objective writes its own content to the
/// same path so sibling branches collide on merge.
#[derive(Default)]
struct ScriptedWorker {
    fail: HashSet<String>,
    conflict_file: Option<String>,
    fail_first_review: Mutex<bool>,
    executed: Mutex<Vec<String>>,
    reviews: Mutex<Vec<String>>,
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn execute(
        &self,
        workspace: &Path,
        item: &WorkItem,
        _mission: &Mission,
    ) -> Result<WorkerOutcome> {
        self.executed.lock().push(item.id.clone());
        let message = format!("work on {}", item.id);
        if let Some(name) = &self.conflict_file {
            std::fs::write(workspace.join(name), format!("{} content\n", item.id)).unwrap();
            git(workspace, &["add", name]);
            git(workspace, &["commit", "-m", &message]);
        } else {
            git(workspace, &["commit", "--allow-empty", "-m", &message]);
        }
        let success = !self.fail.contains(&item.id);
        Ok(WorkerOutcome {
            success,
            exit_code: Some(if success { 0 } else { 1 }),
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn execute_specialist(
        &self,
        _dir: &Path,
        agent: &str,
        _prompt: &str,
        _mission: &Mission,
    ) -> Result<WorkerOutcome> {
        self.reviews.lock().push(agent.to_string());
        let mut fail_first = self.fail_first_review.lock();
        if *fail_first {
            *fail_first = false;
            return Err(ArmadaError::Worker("agent connection reset".to_string()));
        }
        Ok(WorkerOutcome {
            success: true,
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

struct NoopResolver;

#[async_trait]
impl ConflictResolver for NoopResolver {
    async fn resolve(&self, _clone_dir: &Path, branch: &str, _mission: &Mission) -> Result<()> {
        Err(ArmadaError::MergeConflict {
            branch: branch.to_string(),
            message: "resolver not expected in this test".to_string(),
        })
    }
}

/// Concludes a conflicted merge by writing its own resolution.
#[derive(Default)]
struct ScriptedResolver {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ConflictResolver for ScriptedResolver {
    async fn resolve(&self, clone_dir: &Path, branch: &str, _mission: &Mission) -> Result<()> {
        self.calls.lock().push(branch.to_string());
        std::fs::write(clone_dir.join("shared.txt"), "resolved\n").unwrap();
        git(clone_dir, &["add", "shared.txt"]);
        git(clone_dir, &["commit", "-m", "resolve conflict"]);
        Ok(())
    }
}

struct FakePrProvider {
    created: Mutex<Vec<String>>,
    state: Mutex<PrState>,
    fail_create: Mutex<bool>,
}

impl Default for FakePrProvider {
    fn default() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            state: Mutex::new(PrState::Open),
            fail_create: Mutex::new(false),
        }
    }
}

#[async_trait]
impl PrProvider for FakePrProvider {
    async fn create(&self, mission: &Mission, title: &str, _body: &str) -> Result<PrRef> {
        if *self.fail_create.lock() {
            return Err(ArmadaError::PullRequest("gh exited with 1".to_string()));
        }
        self.created.lock().push(title.to_string());
        Ok(PrRef {
            number: Some(7),
            url: Some(format!("https://example.test/{}/pull/7", mission.repo)),
            state: Some(PrState::Open),
        })
    }

    async fn status(&self, _mission: &Mission) -> Result<PrState> {
        Ok(*self.state.lock())
    }

    async fn merge(&self, _mission: &Mission) -> Result<()> {
        *self.state.lock() = PrState::Merged;
        Ok(())
    }

    async fn close(&self, _mission: &Mission) -> Result<()> {
        *self.state.lock() = PrState::Closed;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingReporter {
    posts: Mutex<Vec<String>>,
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn post(&self, text: &str) -> Result<()> {
        self.posts.lock().push(text.to_string());
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    paths: StatePaths,
    store: MissionStore,
    worker: Arc<ScriptedWorker>,
    pr: Arc<FakePrProvider>,
    reporter: Arc<RecordingReporter>,
    scheduler: MissionScheduler,
}

fn harness(config: ProjectConfig, items: Vec<WorkItem>, fail: &[&str]) -> Harness {
    harness_with(config, items, fail, Arc::new(NoopResolver), None)
}

fn harness_with(
    config: ProjectConfig,
    items: Vec<WorkItem>,
    fail: &[&str],
    resolver: Arc<dyn ConflictResolver>,
    conflict_file: Option<&str>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let paths = StatePaths::new(dir.path().join("state"), dir.path().join("projects"));
    init_repo(&paths);

    let store = MissionStore::new(paths.clone());
    let worker = Arc::new(ScriptedWorker {
        fail: fail.iter().map(|s| s.to_string()).collect(),
        conflict_file: conflict_file.map(|s| s.to_string()),
        ..Default::default()
    });
    let pr = Arc::new(FakePrProvider::default());
    let reporter = Arc::new(RecordingReporter::default());

    let scheduler = MissionScheduler::new(
        paths.clone(),
        config,
        REPO,
        Arc::new(StaticPlanner {
            store: store.clone(),
            items,
        }),
        worker.clone(),
        resolver,
        pr.clone(),
        reporter.clone(),
    )
    .unwrap();

    Harness {
        _dir: dir,
        paths,
        store,
        worker,
        pr,
        reporter,
        scheduler,
    }
}

#[tokio::test]
async fn mission_runs_to_pr_and_cleanup_completes_it() {
    let h = harness(
        ProjectConfig::default(),
        vec![
            WorkItem::new("obj-1", "first", "do the first thing"),
            WorkItem::new("obj-2", "second", "do the second thing")
                .with_depends_on(vec!["obj-1".to_string()])
                .with_status(WorkItemStatus::Blocked),
        ],
        &[],
    );

    // The mission rests in review while the pull request is open.
    let mission = h.scheduler.start("ship the feature", true).await.unwrap();
    assert_eq!(mission.status, MissionStatus::Review);

    // obj-2 could only run after obj-1 landed.
    assert_eq!(*h.worker.executed.lock(), vec!["obj-1", "obj-2"]);

    let stored = h.store.read(REPO, &mission.mission_id).await.unwrap();
    assert!(stored.all_items_done());
    assert!(stored.work_items.iter().all(|w| w.merged));
    assert_eq!(stored.pr.number, Some(7));
    assert_eq!(h.pr.created.lock().len(), 1);

    // One session per worker run, plus the planner.
    assert_eq!(stored.safety.session_count, 3);
    assert_eq!(stored.session_log.len(), 2);

    // Post-merge cleanup deletes the mission branches and completes it.
    *h.pr.state.lock() = PrState::Merged;
    let done = h.scheduler.cleanup(&mission.mission_id).await.unwrap();
    assert_eq!(done.status, MissionStatus::Completed);

    let clone = h.paths.clone_dir(REPO);
    assert!(!branch_exists(&clone, &stored.integration_branch));
    assert!(!branch_exists(
        &clone,
        stored.item("obj-1").unwrap().git_branch.as_deref().unwrap()
    ));
}

#[tokio::test]
async fn plan_requires_approval_by_default() {
    let h = harness(
        ProjectConfig::default(),
        vec![WorkItem::new("obj-1", "only", "")],
        &[],
    );

    let mission = h.scheduler.start("careful change", false).await.unwrap();
    assert_eq!(mission.status, MissionStatus::PendingApproval);
    assert!(h.worker.executed.lock().is_empty());

    let mission = h.scheduler.approve(&mission.mission_id).await.unwrap();
    assert_eq!(mission.status, MissionStatus::Review);
    assert_eq!(*h.worker.executed.lock(), vec!["obj-1"]);
}

#[tokio::test]
async fn approve_rejects_wrong_state() {
    let h = harness(
        ProjectConfig::default(),
        vec![WorkItem::new("obj-1", "only", "")],
        &[],
    );

    let mission = h.scheduler.start("change", true).await.unwrap();
    let err = h.scheduler.approve(&mission.mission_id).await.unwrap_err();
    assert!(matches!(err, ArmadaError::InvalidMissionState { .. }));
}

#[tokio::test]
async fn pr_creation_failure_fails_the_mission() {
    let h = harness(
        ProjectConfig::default(),
        vec![WorkItem::new("obj-1", "only", "")],
        &[],
    );
    *h.pr.fail_create.lock() = true;

    let err = h.scheduler.start("doomed pr", true).await.unwrap_err();
    assert!(matches!(err, ArmadaError::PullRequest(_)));

    let mission = h.store.latest(REPO).await.unwrap().unwrap();
    assert_eq!(mission.status, MissionStatus::Failed);
    assert!(mission.all_items_done(), "the work itself succeeded");
}

#[tokio::test]
async fn cleanup_requires_a_merged_pull_request() {
    let h = harness(
        ProjectConfig::default(),
        vec![WorkItem::new("obj-1", "only", "")],
        &[],
    );

    let mission = h.scheduler.start("change", true).await.unwrap();
    assert_eq!(mission.status, MissionStatus::Review);

    // The fake PR is still open.
    let err = h.scheduler.cleanup(&mission.mission_id).await.unwrap_err();
    assert!(matches!(err, ArmadaError::PullRequest(_)));

    let stored = h.store.read(REPO, &mission.mission_id).await.unwrap();
    assert_eq!(stored.status, MissionStatus::Review);
}

#[tokio::test]
async fn checkpoint_pauses_and_resume_rearms_exactly_once() {
    let h = harness(
        ProjectConfig::default(),
        vec![
            WorkItem::new("obj-1", "safe part", ""),
            WorkItem::new("obj-2", "drop the old table", "")
                .with_checkpoint("schema change needs sign-off"),
        ],
        &[],
    );

    let mission = h.scheduler.start("migrate", true).await.unwrap();
    assert_eq!(mission.status, MissionStatus::CheckpointPaused);

    let stored = h.store.read(REPO, &mission.mission_id).await.unwrap();
    let gate = stored.item("obj-2").unwrap();
    assert_eq!(gate.status, WorkItemStatus::CheckpointPaused);
    assert!(h
        .reporter
        .posts
        .lock()
        .iter()
        .any(|p| p.contains("schema change needs sign-off")));

    let resumed = h.scheduler.resume(&mission.mission_id).await.unwrap();
    assert_eq!(resumed.status, MissionStatus::Review);

    // The approval was consumed: the item ran once and its gate is gone.
    let stored = h.store.read(REPO, &mission.mission_id).await.unwrap();
    let gate = stored.item("obj-2").unwrap();
    assert_eq!(gate.status, WorkItemStatus::Done);
    assert!(!gate.checkpoint);
    assert_eq!(
        h.worker
            .executed
            .lock()
            .iter()
            .filter(|id| *id == "obj-2")
            .count(),
        1
    );
}

#[tokio::test]
async fn resume_rejects_terminal_missions() {
    let h = harness(
        ProjectConfig::default(),
        vec![WorkItem::new("obj-1", "only", "")],
        &[],
    );

    let mission = h.scheduler.start("change", true).await.unwrap();
    *h.pr.state.lock() = PrState::Merged;
    let done = h.scheduler.cleanup(&mission.mission_id).await.unwrap();
    assert_eq!(done.status, MissionStatus::Completed);

    let err = h.scheduler.resume(&mission.mission_id).await.unwrap_err();
    assert!(matches!(err, ArmadaError::InvalidMissionState { .. }));
}

#[tokio::test]
async fn crashed_in_progress_mission_recovers() {
    let h = harness(
        ProjectConfig::default(),
        vec![WorkItem::new("obj-1", "only", "")],
        &[],
    );

    let mission = h.scheduler.start("change", false).await.unwrap();

    // Simulate a run that died mid-dispatch: the document says in_progress
    // but no worker is alive behind the item.
    h.store
        .mutate(REPO, &mission.mission_id, |m| {
            m.status = MissionStatus::InProgress;
            m.work_items[0].status = WorkItemStatus::InProgress;
            m.work_items[0].worker_slot = Some(0);
            Ok(())
        })
        .await
        .unwrap();

    let recovered = h.scheduler.recover(&mission.mission_id).await.unwrap();
    assert_eq!(recovered.status, MissionStatus::Review);
    assert_eq!(*h.worker.executed.lock(), vec!["obj-1"]);

    // Only an in_progress document is recoverable.
    let err = h.scheduler.recover(&mission.mission_id).await.unwrap_err();
    assert!(matches!(err, ArmadaError::InvalidMissionState { .. }));
}

#[tokio::test]
async fn failed_item_blocks_dependents_and_fails_mission() {
    let h = harness(
        ProjectConfig::default(),
        vec![
            WorkItem::new("obj-1", "breaks", ""),
            WorkItem::new("obj-2", "needs obj-1", "")
                .with_depends_on(vec!["obj-1".to_string()])
                .with_status(WorkItemStatus::Blocked),
        ],
        &["obj-1"],
    );

    let err = h.scheduler.start("doomed", true).await;
    let mission = h.store.latest(REPO).await.unwrap().unwrap();
    assert!(err.is_ok(), "a failed mission is an outcome, not an error");
    assert_eq!(mission.status, MissionStatus::Failed);

    assert_eq!(mission.item("obj-1").unwrap().status, WorkItemStatus::Failed);
    assert_eq!(mission.item("obj-2").unwrap().status, WorkItemStatus::Blocked);
    assert!(!h.worker.executed.lock().contains(&"obj-2".to_string()));
    assert!(mission.item("obj-1").unwrap().error.is_some());
}

#[tokio::test]
async fn safety_limit_pauses_mission() {
    let config = ProjectConfig {
        max_sessions: 1,
        ..Default::default()
    };
    let h = harness(config, vec![WorkItem::new("obj-1", "only", "")], &[]);

    // The planner session consumes the whole budget.
    let mission = h.scheduler.start("expensive", true).await.unwrap();
    assert_eq!(mission.status, MissionStatus::Paused);
    assert!(h.worker.executed.lock().is_empty());
}

#[tokio::test]
async fn mandatory_reviews_run_once_per_role() {
    let mut item = WorkItem::new("obj-1", "update pipeline", "");
    item.context_sources = vec![".github/workflows/ci.yml".to_string()];

    let h = harness(ProjectConfig::default(), vec![item], &[]);
    let mission = h.scheduler.start("ci work", true).await.unwrap();
    assert_eq!(mission.status, MissionStatus::Review);

    // Classified at planning time, reviewed exactly once despite the
    // review pass running again during finalization.
    assert_eq!(*h.worker.reviews.lock(), vec!["infra-reviewer"]);

    let stored = h.store.read(REPO, &mission.mission_id).await.unwrap();
    let reviewed = &stored.item("obj-1").unwrap().reviewed_by;
    assert_eq!(reviewed.len(), 1);
}

#[tokio::test]
async fn review_session_error_is_retried_not_fatal() {
    let mut item = WorkItem::new("obj-1", "update pipeline", "");
    item.context_sources = vec![".github/workflows/ci.yml".to_string()];

    let h = harness(ProjectConfig::default(), vec![item], &[]);
    *h.worker.fail_first_review.lock() = true;

    let mission = h.scheduler.start("ci work", true).await.unwrap();
    assert_eq!(mission.status, MissionStatus::Review);

    // The first attempt never produced a verdict; the finalization pass
    // retried it and recorded the role once.
    assert_eq!(
        *h.worker.reviews.lock(),
        vec!["infra-reviewer", "infra-reviewer"]
    );
    let stored = h.store.read(REPO, &mission.mission_id).await.unwrap();
    assert_eq!(stored.item("obj-1").unwrap().reviewed_by.len(), 1);
}

#[tokio::test]
async fn merge_conflict_is_escalated_to_the_resolver() {
    let resolver = Arc::new(ScriptedResolver::default());
    let h = harness_with(
        ProjectConfig::default(),
        vec![
            WorkItem::new("obj-1", "edit shared", ""),
            WorkItem::new("obj-2", "edit shared too", ""),
        ],
        &[],
        resolver.clone(),
        Some("shared.txt"),
    );

    let mission = h.scheduler.start("conflicting edits", true).await.unwrap();
    assert_eq!(mission.status, MissionStatus::Review);

    // Both branches added the same file; the second merge conflicted.
    assert_eq!(resolver.calls.lock().len(), 1);
    let stored = h.store.read(REPO, &mission.mission_id).await.unwrap();
    assert!(stored.work_items.iter().all(|w| w.merged));

    assert!(h
        .reporter
        .posts
        .lock()
        .iter()
        .any(|p| p.starts_with("merge.conflict")));
}

#[tokio::test]
async fn empty_plan_fails_mission() {
    let config = ProjectConfig {
        planner_settle_ms: 10,
        planner_settle_attempts: 2,
        ..Default::default()
    };
    let h = harness(config, vec![], &[]);

    let err = h.scheduler.start("nothing to do", true).await.unwrap_err();
    assert!(matches!(err, ArmadaError::Planning(_)));

    let mission = h.store.latest(REPO).await.unwrap().unwrap();
    assert_eq!(mission.status, MissionStatus::Failed);
}

#[tokio::test]
async fn cyclic_plan_fails_mission() {
    let h = harness(
        ProjectConfig::default(),
        vec![
            WorkItem::new("obj-1", "a", "")
                .with_depends_on(vec!["obj-2".to_string()])
                .with_status(WorkItemStatus::Blocked),
            WorkItem::new("obj-2", "b", "")
                .with_depends_on(vec!["obj-1".to_string()])
                .with_status(WorkItemStatus::Blocked),
        ],
        &[],
    );

    let err = h.scheduler.start("tangled", true).await.unwrap_err();
    assert!(matches!(err, ArmadaError::DependencyGraph(_)));
    let mission = h.store.latest(REPO).await.unwrap().unwrap();
    assert_eq!(mission.status, MissionStatus::Failed);
}

#[tokio::test]
async fn abort_from_pending_approval() {
    let h = harness(
        ProjectConfig::default(),
        vec![WorkItem::new("obj-1", "only", "")],
        &[],
    );

    let mission = h.scheduler.start("change", false).await.unwrap();
    let aborted = h.scheduler.abort(&mission.mission_id).await.unwrap();
    assert_eq!(aborted.status, MissionStatus::Aborted);

    let err = h.scheduler.approve(&mission.mission_id).await.unwrap_err();
    assert!(matches!(err, ArmadaError::InvalidMissionState { .. }));
}

#[tokio::test]
async fn worktrees_are_cleaned_up_when_the_pr_opens() {
    let h = harness(
        ProjectConfig::default(),
        vec![
            WorkItem::new("obj-1", "a", ""),
            WorkItem::new("obj-2", "b", ""),
        ],
        &[],
    );

    let mission = h.scheduler.start("parallel work", true).await.unwrap();
    assert_eq!(mission.status, MissionStatus::Review);

    assert!(!h.paths.worktree_dir(REPO, 0).exists());
    assert!(!h.paths.worktree_dir(REPO, 1).exists());
    assert!(h.paths.clone_dir(REPO).exists());
}
