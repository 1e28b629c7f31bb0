use std::path::{Path, PathBuf};
use std::process::Output;

use chrono::{DateTime, TimeZone, Utc};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ArmadaError, Result};
use crate::mission::{PrRef, PrState};

pub struct GitRunner {
    working_dir: PathBuf,
}

impl GitRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn with_dir(&self, dir: &Path) -> Self {
        Self::new(dir)
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(args = ?args, dir = %self.working_dir.display(), "Running git command");

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.working_dir)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(args = ?args, stderr = %stderr, "Git command failed");
        }

        Ok(output)
    }

    pub async fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ArmadaError::Git(stderr.trim().to_string()));
        }

        Ok(output)
    }

    pub async fn fetch(&self, remote: &str) -> Result<()> {
        self.run_checked(&["fetch", remote, "--prune"]).await?;
        Ok(())
    }

    pub async fn checkout(&self, branch: &str) -> Result<()> {
        self.run_checked(&["checkout", branch]).await?;
        Ok(())
    }

    pub async fn create_branch(&self, branch: &str, base: &str) -> Result<()> {
        self.run_checked(&["branch", branch, base]).await?;
        Ok(())
    }

    pub async fn delete_branch(&self, branch: &str) -> Result<()> {
        self.run_checked(&["branch", "-D", branch]).await?;
        Ok(())
    }

    pub async fn branch_exists(&self, branch: &str) -> bool {
        self.run(&["rev-parse", "--verify", "--quiet", branch])
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Merge `branch` into the current branch without opening an editor.
    /// A non-zero exit is reported as a merge conflict; the index is left
    /// untouched so the caller can repair or abort.
    pub async fn merge(&self, branch: &str) -> Result<()> {
        let output = self.run(&["merge", "--no-edit", branch]).await?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ArmadaError::MergeConflict {
                branch: branch.to_string(),
                message: format!("{}{}", stdout.trim(), stderr.trim()),
            });
        }
        Ok(())
    }

    pub async fn merge_abort(&self) -> Result<()> {
        self.run_checked(&["merge", "--abort"]).await?;
        Ok(())
    }

    pub async fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.run_checked(&["push", "-u", remote, branch]).await?;
        Ok(())
    }

    pub async fn push_delete(&self, remote: &str, branch: &str) -> Result<()> {
        self.run_checked(&["push", remote, "--delete", branch])
            .await?;
        Ok(())
    }

    pub async fn worktree_add(&self, path: &Path, branch: &str, base: &str) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run_checked(&["worktree", "add", "-b", branch, path_str.as_ref(), base])
            .await?;
        Ok(())
    }

    pub async fn worktree_remove(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run_checked(&["worktree", "remove", "--force", path_str.as_ref()])
            .await?;
        Ok(())
    }

    pub async fn worktree_prune(&self) -> Result<()> {
        self.run_checked(&["worktree", "prune"]).await?;
        Ok(())
    }

    /// Registered worktree paths, main checkout included.
    pub async fn worktree_list(&self) -> Result<Vec<PathBuf>> {
        let output = self.run_checked(&["worktree", "list", "--porcelain"]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter_map(|line| line.strip_prefix("worktree "))
            .map(PathBuf::from)
            .collect())
    }

    /// Commit time of the branch tip, if the branch exists.
    pub async fn last_commit_time(&self, branch: &str) -> Result<Option<DateTime<Utc>>> {
        let output = self.run(&["log", "-1", "--format=%ct", branch]).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let Ok(epoch) = stdout.trim().parse::<i64>() else {
            return Ok(None);
        };
        Ok(Utc.timestamp_opt(epoch, 0).single())
    }

    /// Files touched by the most recent commits on `branch`, newest first,
    /// one entry per touch. Feeds thrash detection.
    pub async fn recent_files(&self, branch: &str, commits: usize) -> Result<Vec<String>> {
        let limit = format!("-{}", commits);
        let output = self
            .run(&["log", &limit, "--name-only", "--format=", branch])
            .await?;
        if !output.status.success() {
            return Ok(Vec::new());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_string())
            .collect())
    }
}

/// GitHub CLI wrapper for the pull request lifecycle.
pub struct GhRunner {
    working_dir: PathBuf,
}

impl GhRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(args = ?args, "Running gh command");
        let output = Command::new("gh")
            .args(args)
            .current_dir(&self.working_dir)
            .output()
            .await?;
        Ok(output)
    }

    async fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ArmadaError::PullRequest(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub async fn create_pr(&self, base: &str, head: &str, title: &str, body: &str) -> Result<PrRef> {
        let url = self
            .run_checked(&[
                "pr", "create", "--base", base, "--head", head, "--title", title, "--body", body,
            ])
            .await?;

        let number = url
            .rsplit('/')
            .next()
            .and_then(|n| n.parse::<u64>().ok());

        Ok(PrRef {
            number,
            url: Some(url),
            state: Some(PrState::Open),
        })
    }

    pub async fn pr_status(&self, number: u64) -> Result<PrState> {
        let json = self
            .run_checked(&[
                "pr",
                "view",
                &number.to_string(),
                "--json",
                "state,mergedAt,closedAt",
            ])
            .await?;

        let value: serde_json::Value = serde_json::from_str(&json)?;
        let state = match value.get("state").and_then(|s| s.as_str()) {
            Some("MERGED") => PrState::Merged,
            Some("CLOSED") => PrState::Closed,
            Some("OPEN") => PrState::Open,
            _ => PrState::Unknown,
        };
        Ok(state)
    }

    pub async fn merge_pr(&self, number: u64) -> Result<()> {
        self.run_checked(&["pr", "merge", &number.to_string(), "--squash", "--delete-branch"])
            .await?;
        Ok(())
    }

    pub async fn close_pr(&self, number: u64) -> Result<()> {
        self.run_checked(&["pr", "close", &number.to_string()])
            .await?;
        Ok(())
    }
}
