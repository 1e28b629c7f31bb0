use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::Result;

/// Resolved roots of the armada state tree.
///
/// Layout:
/// ```text
/// <state_dir>/projects/<repo>/missions/<mission-id>/mission.json
///                                                  /activity-log.md
///                                                  /briefings/
///                                                  /artifacts/
/// <projects_root>/<repo>           main clone
/// <projects_root>/<repo>-wt-<n>    per-slot worktrees
/// ```
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub state_dir: PathBuf,
    pub projects_root: PathBuf,
}

impl StatePaths {
    pub fn new(state_dir: PathBuf, projects_root: PathBuf) -> Self {
        Self {
            state_dir,
            projects_root,
        }
    }

    /// Resolve from `ARMADA_STATE_DIR` / `ARMADA_PROJECT_DIR`, falling back
    /// to `~/.armada` and `~/projects`.
    pub fn from_env() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        let state_dir = std::env::var_os("ARMADA_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".armada"));
        let projects_root = std::env::var_os("ARMADA_PROJECT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("projects"));

        Self::new(state_dir, projects_root)
    }

    pub fn repo_state_dir(&self, repo: &str) -> PathBuf {
        self.state_dir.join("projects").join(repo)
    }

    pub fn missions_dir(&self, repo: &str) -> PathBuf {
        self.repo_state_dir(repo).join("missions")
    }

    pub fn mission_dir(&self, repo: &str, mission_id: &str) -> PathBuf {
        self.missions_dir(repo).join(mission_id)
    }

    pub fn mission_file(&self, repo: &str, mission_id: &str) -> PathBuf {
        self.mission_dir(repo, mission_id).join("mission.json")
    }

    pub fn activity_log(&self, repo: &str, mission_id: &str) -> PathBuf {
        self.mission_dir(repo, mission_id).join("activity-log.md")
    }

    pub fn briefings_dir(&self, repo: &str, mission_id: &str) -> PathBuf {
        self.mission_dir(repo, mission_id).join("briefings")
    }

    pub fn artifacts_dir(&self, repo: &str, mission_id: &str) -> PathBuf {
        self.mission_dir(repo, mission_id).join("artifacts")
    }

    pub fn evidence_file(&self, repo: &str, mission_id: &str, item_id: &str) -> PathBuf {
        self.artifacts_dir(repo, mission_id)
            .join(format!("evidence-{}.json", item_id))
    }

    pub fn worker_stderr_file(&self, repo: &str, mission_id: &str, item_id: &str) -> PathBuf {
        self.artifacts_dir(repo, mission_id)
            .join(format!("worker-stderr-{}.log", item_id))
    }

    pub fn health_alerts_file(&self, repo: &str, mission_id: &str) -> PathBuf {
        self.artifacts_dir(repo, mission_id).join("health-alerts.ndjson")
    }

    /// Main clone of the repository.
    pub fn clone_dir(&self, repo: &str) -> PathBuf {
        self.projects_root.join(repo)
    }

    /// Worktree path for a worker slot, a sibling of the main clone.
    pub fn worktree_dir(&self, repo: &str, slot: usize) -> PathBuf {
        self.projects_root.join(format!("{}-wt-{}", repo, slot))
    }

    pub async fn ensure_mission_dirs(&self, repo: &str, mission_id: &str) -> Result<()> {
        for dir in [
            self.briefings_dir(repo, mission_id),
            self.artifacts_dir(repo, mission_id),
        ] {
            fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }
}

/// Extract the worker slot from a worktree directory name, if it follows the
/// `<repo>-wt-<n>` convention.
pub(crate) fn worktree_slot(repo: &str, dir_name: &Path) -> Option<usize> {
    let name = dir_name.file_name()?.to_str()?;
    let suffix = name.strip_prefix(repo)?.strip_prefix("-wt-")?;
    suffix.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worktree_naming_round_trips() {
        let paths = StatePaths::new(PathBuf::from("/state"), PathBuf::from("/work"));
        let wt = paths.worktree_dir("api-server", 2);
        assert_eq!(wt, PathBuf::from("/work/api-server-wt-2"));
        assert_eq!(worktree_slot("api-server", &wt), Some(2));
    }

    #[test]
    fn main_clone_is_not_a_worktree() {
        let paths = StatePaths::new(PathBuf::from("/state"), PathBuf::from("/work"));
        assert_eq!(worktree_slot("api-server", &paths.clone_dir("api-server")), None);
        assert_eq!(
            worktree_slot("api-server", Path::new("/work/api-server-wt-x")),
            None
        );
    }

    #[test]
    fn mission_file_layout() {
        let paths = StatePaths::new(PathBuf::from("/state"), PathBuf::from("/work"));
        assert_eq!(
            paths.mission_file("api", "mission-1"),
            PathBuf::from("/state/projects/api/missions/mission-1/mission.json")
        );
        assert_eq!(
            paths.evidence_file("api", "mission-1", "obj-1"),
            PathBuf::from("/state/projects/api/missions/mission-1/artifacts/evidence-obj-1.json")
        );
    }
}
