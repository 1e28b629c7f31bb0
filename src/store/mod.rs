//! Durable mission persistence.
//!
//! Each mission lives in its own directory as a single `mission.json`
//! plus append-only side artifacts. Every mutation happens under a
//! cross-process file lock and lands via write-temp, fsync, rename, so
//! a crash at any point leaves either the old document or the new one,
//! never a torn write.

mod lock;

use std::io::Write;
use std::path::Path;

use chrono::Utc;
use tokio::fs;
use tracing::debug;

pub use lock::FileLock;

use crate::config::StatePaths;
use crate::error::{ArmadaError, Result};
use crate::git::validate_repo_name;
use crate::mission::{Mission, SessionLogEntry, WorkItem};

#[derive(Debug, Clone)]
pub struct MissionStore {
    paths: StatePaths,
}

impl MissionStore {
    pub fn new(paths: StatePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    /// Persist a freshly planned mission and seed its directory tree.
    pub async fn create(&self, mission: &Mission) -> Result<()> {
        validate_repo_name(&mission.repo)?;
        self.paths
            .ensure_mission_dirs(&mission.repo, &mission.mission_id)
            .await?;

        let log = self.paths.activity_log(&mission.repo, &mission.mission_id);
        if !log.exists() {
            fs::write(
                &log,
                format!(
                    "# Mission {}\n\n{}\n\n## Activity\n\n",
                    mission.mission_id, mission.description
                ),
            )
            .await?;
        }

        let file = self
            .paths
            .mission_file(&mission.repo, &mission.mission_id);
        write_atomic(&file, serde_json::to_string_pretty(mission)?).await
    }

    pub async fn read(&self, repo: &str, mission_id: &str) -> Result<Mission> {
        let file = self.paths.mission_file(repo, mission_id);
        let content = fs::read_to_string(&file).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArmadaError::MissionNotFound {
                    repo: repo.to_string(),
                    mission_id: mission_id.to_string(),
                }
            } else {
                e.into()
            }
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Read-modify-write under the mission's file lock. Bumps `version` and
    /// `updated_at` on every call, so concurrent writers never silently
    /// clobber each other. Returns the persisted document.
    pub async fn mutate<F>(&self, repo: &str, mission_id: &str, apply: F) -> Result<Mission>
    where
        F: FnOnce(&mut Mission) -> Result<()>,
    {
        let file = self.paths.mission_file(repo, mission_id);
        let _lock = FileLock::acquire(&file).await?;

        let mut mission = self.read(repo, mission_id).await?;
        apply(&mut mission)?;
        mission.version += 1;
        mission.updated_at = Some(Utc::now());

        write_atomic(&file, serde_json::to_string_pretty(&mission)?).await?;
        debug!(repo, mission_id, version = mission.version, "mission persisted");
        Ok(mission)
    }

    /// Apply a mutation to one work item, failing if the item is unknown.
    pub async fn update_item<F>(
        &self,
        repo: &str,
        mission_id: &str,
        item_id: &str,
        apply: F,
    ) -> Result<Mission>
    where
        F: FnOnce(&mut WorkItem),
    {
        self.mutate(repo, mission_id, |mission| {
            let item = mission
                .item_mut(item_id)
                .ok_or_else(|| ArmadaError::ItemNotFound {
                    mission_id: mission_id.to_string(),
                    item_id: item_id.to_string(),
                })?;
            apply(item);
            Ok(())
        })
        .await
    }

    pub async fn append_session_log(
        &self,
        repo: &str,
        mission_id: &str,
        entry: SessionLogEntry,
    ) -> Result<Mission> {
        self.mutate(repo, mission_id, |mission| {
            mission.safety.session_count += 1;
            mission.session_log.push(entry);
            Ok(())
        })
        .await
    }

    pub async fn increment_session_count(&self, repo: &str, mission_id: &str) -> Result<Mission> {
        self.mutate(repo, mission_id, |mission| {
            mission.safety.session_count += 1;
            Ok(())
        })
        .await
    }

    /// Append a timestamped line to the mission's human-readable log.
    /// Best-effort ordering only; not part of the durable document.
    pub async fn append_activity_log(
        &self,
        repo: &str,
        mission_id: &str,
        line: &str,
    ) -> Result<()> {
        let path = self.paths.activity_log(repo, mission_id);
        let entry = format!("- {} {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"), line);
        let mut options = fs::OpenOptions::new();
        options.create(true).append(true);
        let mut file = options.open(&path).await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, entry.as_bytes()).await?;
        Ok(())
    }

    /// All missions recorded for a repository, oldest first by id.
    pub async fn list(&self, repo: &str) -> Result<Vec<Mission>> {
        let dir = self.paths.missions_dir(repo);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();

        let mut missions = Vec::with_capacity(ids.len());
        for id in ids {
            match self.read(repo, &id).await {
                Ok(mission) => missions.push(mission),
                // Skip directories without a readable document.
                Err(ArmadaError::MissionNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(missions)
    }

    /// Most recently created mission, if any. Mission ids embed the creation
    /// date, so lexicographic order is creation order.
    pub async fn latest(&self, repo: &str) -> Result<Option<Mission>> {
        Ok(self.list(repo).await?.into_iter().last())
    }
}

/// Write `content` to `path` atomically: temp file in the same directory,
/// fsync, rename. The blocking fsync runs off the async runtime.
async fn write_atomic(path: &Path, content: String) -> Result<()> {
    let path = path.to_path_buf();
    let tmp = path.with_extension("json.tmp");

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp, &path)
    })
    .await
    .map_err(|e| ArmadaError::Other(format!("atomic write task failed: {}", e)))??;

    Ok(())
}
