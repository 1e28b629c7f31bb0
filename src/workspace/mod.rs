//! Worker workspace provisioning.
//!
//! Each worker slot gets its own git worktree next to the main clone,
//! named `<repo>-wt-<slot>`. Slots are recycled between batches, so
//! provisioning always clears whatever a previous (possibly crashed)
//! worker left behind before creating the fresh worktree.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::{worktree_slot, StatePaths};
use crate::error::{ArmadaError, Result};
use crate::git::{assert_safe_ref, GitRunner};

pub struct WorkspaceManager {
    paths: StatePaths,
    repo: String,
}

impl WorkspaceManager {
    pub fn new(paths: StatePaths, repo: impl Into<String>) -> Self {
        Self {
            paths,
            repo: repo.into(),
        }
    }

    fn git(&self) -> GitRunner {
        GitRunner::new(self.paths.clone_dir(&self.repo))
    }

    /// Create the worktree for `slot` on a fresh `branch` forked from
    /// `base`. Stale worktrees, directories, and branches from earlier
    /// runs are cleared first; only the final `worktree add` is fatal.
    pub async fn provision(&self, slot: usize, branch: &str, base: &str) -> Result<PathBuf> {
        assert_safe_ref("branch", branch)?;
        assert_safe_ref("base", base)?;

        let git = self.git();
        let dir = self.paths.worktree_dir(&self.repo, slot);

        if let Err(e) = git.worktree_remove(&dir).await {
            debug!(slot, error = %e, "no registered worktree to remove");
        }
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir).await?;
        }

        // Refresh the base ref when a remote is reachable; offline is fine.
        if let Err(e) = git.fetch("origin").await {
            warn!(error = %e, "fetch failed, provisioning from local refs");
        }

        if git.branch_exists(branch).await {
            git.delete_branch(branch).await?;
        }

        git.worktree_add(&dir, branch, base)
            .await
            .map_err(|e| ArmadaError::Worktree {
                message: format!("failed to provision slot {}: {}", slot, e),
                path: dir.clone(),
            })?;

        info!(slot, branch, dir = %dir.display(), "workspace provisioned");
        Ok(dir)
    }

    /// Remove the worktree for `slot`. Best-effort; a missing worktree is
    /// not an error.
    pub async fn release(&self, slot: usize) -> Result<()> {
        let dir = self.paths.worktree_dir(&self.repo, slot);
        let git = self.git();

        if let Err(e) = git.worktree_remove(&dir).await {
            debug!(slot, error = %e, "worktree remove skipped");
        }
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        debug!(slot, "workspace released");
        Ok(())
    }

    /// Sweep every slot worktree for this repository. The main clone is
    /// never touched; only siblings matching the slot naming convention go.
    pub async fn release_all(&self) -> Result<usize> {
        let git = self.git();
        let mut released = 0;

        for path in git.worktree_list().await? {
            if path == self.paths.clone_dir(&self.repo) {
                continue;
            }
            if let Some(slot) = worktree_slot(&self.repo, &path) {
                self.release(slot).await?;
                released += 1;
            }
        }

        git.worktree_prune().await?;
        info!(released, "workspace sweep complete");
        Ok(released)
    }
}
