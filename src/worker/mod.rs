//! Agent execution seams.
//!
//! The scheduler drives four collaborators through traits so tests can
//! swap in recording fakes: the planner that decomposes a mission, the
//! worker that executes one objective in a workspace, the conflict
//! resolver invoked when an integration merge fails, and the pull
//! request provider. The production impls shell out to the configured
//! agent CLI and to `gh`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{ProjectConfig, StatePaths};
use crate::error::{ArmadaError, Result};
use crate::git::GhRunner;
use crate::mission::{Mission, PrRef, PrState, WorkItem};

#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Decomposes a mission description into work items. The planner writes
/// items into the mission document itself; the scheduler polls the store
/// until they settle.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn decompose(&self, mission: &Mission) -> Result<()>;
}

#[async_trait]
pub trait Worker: Send + Sync {
    /// Execute one objective inside its provisioned workspace.
    async fn execute(
        &self,
        workspace: &Path,
        item: &WorkItem,
        mission: &Mission,
    ) -> Result<WorkerOutcome>;

    /// Run a specialist session (reviewer, repair) in an existing checkout.
    async fn execute_specialist(
        &self,
        dir: &Path,
        agent: &str,
        prompt: &str,
        mission: &Mission,
    ) -> Result<WorkerOutcome>;
}

#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Attempt to resolve a failed merge of `branch` in `clone_dir` and
    /// commit the result. The merge is left in conflict state on entry.
    async fn resolve(&self, clone_dir: &Path, branch: &str, mission: &Mission) -> Result<()>;
}

#[async_trait]
pub trait PrProvider: Send + Sync {
    async fn create(&self, mission: &Mission, title: &str, body: &str) -> Result<PrRef>;
    async fn status(&self, mission: &Mission) -> Result<PrState>;
    async fn merge(&self, mission: &Mission) -> Result<()>;
    async fn close(&self, mission: &Mission) -> Result<()>;
}

/// Production agent runner: invokes the configured agent CLI headlessly
/// with a composed prompt, under the configured timeout. Non-empty stderr
/// is persisted as a mission artifact for post-mortems.
pub struct AgentCommand {
    paths: StatePaths,
    config: ProjectConfig,
}

impl AgentCommand {
    pub fn new(paths: StatePaths, config: ProjectConfig) -> Self {
        Self { paths, config }
    }

    async fn run_agent(
        &self,
        dir: &Path,
        agent: &str,
        prompt: &str,
        mission: &Mission,
        artifact_item: Option<&str>,
    ) -> Result<WorkerOutcome> {
        let mut cmd = Command::new(&self.config.agent_command);
        cmd.arg("-p")
            .arg(prompt)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the timeout future must not leave an orphan agent.
            .kill_on_drop(true);

        if let Some(model) = self.config.model_for(agent) {
            cmd.arg("--model").arg(model);
        }

        debug!(agent, dir = %dir.display(), "launching agent session");
        let child = cmd.spawn().map_err(|e| {
            ArmadaError::Worker(format!(
                "failed to launch '{}': {}",
                self.config.agent_command, e
            ))
        })?;

        let timeout = Duration::from_secs(self.config.worker_timeout_secs);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(agent, timeout_secs = timeout.as_secs(), "agent session timed out");
                return Err(ArmadaError::Worker(format!(
                    "agent session timed out after {}s",
                    timeout.as_secs()
                )));
            }
        };

        let outcome = WorkerOutcome {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if let Some(item_id) = artifact_item {
            if !outcome.stderr.trim().is_empty() {
                let path =
                    self.paths
                        .worker_stderr_file(&mission.repo, &mission.mission_id, item_id);
                if let Some(parent) = path.parent() {
                    let _ = tokio::fs::create_dir_all(parent).await;
                }
                if let Err(e) = tokio::fs::write(&path, &outcome.stderr).await {
                    warn!(error = %e, "failed to persist worker stderr");
                }
            }
        }

        info!(agent, success = outcome.success, code = ?outcome.exit_code, "agent session finished");
        Ok(outcome)
    }

    fn planning_prompt(&self, mission: &Mission) -> String {
        let mission_file = self
            .paths
            .mission_file(&mission.repo, &mission.mission_id);
        format!(
            "You are the mission planner. Decompose the following mission into \
             independent work items and write them into the work_items array of \
             {mission_file}, keeping every other field intact.\n\n\
             Mission: {description}\n\n\
             Each item needs: id (obj-N), title, description, status (\"ready\" \
             when it has no dependencies, \"blocked\" otherwise), phase, \
             depends_on (item ids), assigned_to (agent name), context_sources \
             (file globs it will touch), and checkpoint:true with a \
             checkpoint_message for anything that needs human sign-off. \
             Produce at most {max} items. Do not start implementing.",
            mission_file = mission_file.display(),
            description = mission.description,
            max = self.config.max_work_items,
        )
    }

    fn work_prompt(&self, item: &WorkItem, mission: &Mission) -> String {
        let evidence = self
            .paths
            .evidence_file(&mission.repo, &mission.mission_id, &item.id);
        format!(
            "You are working on objective {id}: {title}\n\n{description}\n\n\
             You are in a dedicated git worktree on branch {branch}. Implement \
             the objective, run the project's tests, and commit your work in \
             small commits. When done, write an evidence bundle (JSON with \
             objective_id, agent, summary, files_changed, commands_run, tests, \
             risk_flags, notes_for_reviewer) to {evidence}. Do not touch other \
             objectives and do not push.",
            id = item.id,
            title = item.title,
            description = item.description,
            branch = item.git_branch.as_deref().unwrap_or("(unset)"),
            evidence = evidence.display(),
        )
    }

    fn resolve_prompt(&self, branch: &str, mission: &Mission) -> String {
        format!(
            "The merge of {branch} into {integration} has conflicts. Resolve \
             every conflict in this checkout, preserving the intent of both \
             sides, run the tests, then stage the files and commit the merge. \
             If the conflict cannot be resolved safely, run 'git merge --abort' \
             and exit non-zero.",
            branch = branch,
            integration = mission.integration_branch,
        )
    }
}

#[async_trait]
impl Planner for AgentCommand {
    async fn decompose(&self, mission: &Mission) -> Result<()> {
        let prompt = self.planning_prompt(mission);
        let dir = self.paths.clone_dir(&mission.repo);
        let outcome = self
            .run_agent(&dir, "mission-planner", &prompt, mission, None)
            .await?;
        if !outcome.success {
            return Err(ArmadaError::Planning(format!(
                "planner exited with {:?}",
                outcome.exit_code
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Worker for AgentCommand {
    async fn execute(
        &self,
        workspace: &Path,
        item: &WorkItem,
        mission: &Mission,
    ) -> Result<WorkerOutcome> {
        let agent = if item.assigned_to.is_empty() {
            "implementer"
        } else {
            item.assigned_to.as_str()
        };
        let prompt = self.work_prompt(item, mission);
        self.run_agent(workspace, agent, &prompt, mission, Some(&item.id))
            .await
    }

    async fn execute_specialist(
        &self,
        dir: &Path,
        agent: &str,
        prompt: &str,
        mission: &Mission,
    ) -> Result<WorkerOutcome> {
        self.run_agent(dir, agent, prompt, mission, None).await
    }
}

#[async_trait]
impl ConflictResolver for AgentCommand {
    async fn resolve(&self, clone_dir: &Path, branch: &str, mission: &Mission) -> Result<()> {
        let prompt = self.resolve_prompt(branch, mission);
        let outcome = self
            .run_agent(clone_dir, "merge-resolver", &prompt, mission, None)
            .await?;
        if !outcome.success {
            return Err(ArmadaError::MergeConflict {
                branch: branch.to_string(),
                message: format!("resolver exited with {:?}", outcome.exit_code),
            });
        }
        Ok(())
    }
}

/// Pull requests through the GitHub CLI, run from the main clone.
pub struct GhPrProvider {
    paths: StatePaths,
}

impl GhPrProvider {
    pub fn new(paths: StatePaths) -> Self {
        Self { paths }
    }

    fn gh(&self, mission: &Mission) -> GhRunner {
        GhRunner::new(self.paths.clone_dir(&mission.repo))
    }

    fn number_of(mission: &Mission) -> Result<u64> {
        mission
            .pr
            .number
            .ok_or_else(|| ArmadaError::PullRequest("mission has no pull request".to_string()))
    }
}

#[async_trait]
impl PrProvider for GhPrProvider {
    async fn create(&self, mission: &Mission, title: &str, body: &str) -> Result<PrRef> {
        self.gh(mission)
            .create_pr(&mission.default_branch, &mission.integration_branch, title, body)
            .await
    }

    async fn status(&self, mission: &Mission) -> Result<PrState> {
        self.gh(mission).pr_status(Self::number_of(mission)?).await
    }

    async fn merge(&self, mission: &Mission) -> Result<()> {
        self.gh(mission).merge_pr(Self::number_of(mission)?).await
    }

    async fn close(&self, mission: &Mission) -> Result<()> {
        self.gh(mission).close_pr(Self::number_of(mission)?).await
    }
}
