//! Integration branch management.
//!
//! Completed objective branches are folded into the mission's integration
//! branch one at a time, in work item order, inside the main clone. A
//! conflict hands the checkout to the resolver; if that also fails the
//! merge is aborted and the remaining branches still get their turn.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::StatePaths;
use crate::error::{ArmadaError, Result};
use crate::git::GitRunner;
use crate::mission::{Mission, WorkItemStatus};
use crate::notification::{EventType, MissionEvent, Reporter};
use crate::store::MissionStore;
use crate::worker::ConflictResolver;

pub struct IntegrationMerger {
    paths: StatePaths,
    store: MissionStore,
}

impl IntegrationMerger {
    pub fn new(paths: StatePaths, store: MissionStore) -> Self {
        Self { paths, store }
    }

    fn git(&self, mission: &Mission) -> GitRunner {
        GitRunner::new(self.paths.clone_dir(&mission.repo))
    }

    /// Create the integration branch from the default branch if this is the
    /// first run (or the first run since a crash wiped the clone).
    pub async fn ensure_integration_branch(&self, mission: &Mission) -> Result<()> {
        let git = self.git(mission);
        if !git.branch_exists(&mission.integration_branch).await {
            git.create_branch(&mission.integration_branch, &mission.default_branch)
                .await?;
            info!(branch = %mission.integration_branch, "integration branch created");
        }
        Ok(())
    }

    /// Merge every completed, not-yet-merged objective branch into the
    /// integration branch. Returns how many branches landed. The clone is
    /// left back on the default branch regardless of outcome.
    pub async fn merge_completed(
        &self,
        mission: &Mission,
        resolver: &Arc<dyn ConflictResolver>,
        reporter: &dyn Reporter,
    ) -> Result<usize> {
        let git = self.git(mission);
        let clone_dir = self.paths.clone_dir(&mission.repo);

        let pending: Vec<(String, String)> = mission
            .work_items
            .iter()
            .filter(|w| w.status == WorkItemStatus::Done && !w.merged)
            .filter_map(|w| w.git_branch.clone().map(|b| (w.id.clone(), b)))
            .collect();

        if pending.is_empty() {
            return Ok(0);
        }

        git.checkout(&mission.integration_branch).await?;
        let mut merged = 0;

        for (item_id, branch) in pending {
            match git.merge(&branch).await {
                Ok(()) => {
                    self.mark_merged(mission, &item_id).await?;
                    merged += 1;
                    info!(branch = %branch, "merged into integration");
                }
                Err(ArmadaError::MergeConflict { message, .. }) => {
                    let event = MissionEvent::new(EventType::MergeConflict, mission.mission_id.as_str())
                        .with_objective(item_id.as_str())
                        .with_message(format!("{} conflicts, invoking resolver: {}", branch, message));
                    reporter.notify(&event).await?;

                    match resolver.resolve(&clone_dir, &branch, mission).await {
                        Ok(()) => {
                            self.mark_merged(mission, &item_id).await?;
                            merged += 1;
                            info!(branch = %branch, "conflict resolved and merged");
                        }
                        Err(e) => {
                            warn!(branch = %branch, error = %e, "resolver failed, skipping branch");
                            if let Err(abort_err) = git.merge_abort().await {
                                warn!(error = %abort_err, "merge abort failed");
                            }
                            reporter
                                .post(&format!("could not merge {}: {}", branch, e))
                                .await?;
                        }
                    }
                }
                Err(e) => {
                    // Restore a clean checkout before surfacing the error.
                    let _ = git.checkout(&mission.default_branch).await;
                    return Err(e);
                }
            }
        }

        git.checkout(&mission.default_branch).await?;
        Ok(merged)
    }

    async fn mark_merged(&self, mission: &Mission, item_id: &str) -> Result<()> {
        self.store
            .update_item(&mission.repo, &mission.mission_id, item_id, |item| {
                item.merged = true;
            })
            .await?;
        Ok(())
    }
}
