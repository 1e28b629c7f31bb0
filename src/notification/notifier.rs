use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::MissionEvent;
use crate::config::StatePaths;
use crate::error::Result;

/// Sink for operator-facing progress. The scheduler and patrol only know
/// this trait; tests substitute a recording impl.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn post(&self, text: &str) -> Result<()>;

    async fn notify(&self, event: &MissionEvent) -> Result<()> {
        self.post(&event.summary()).await
    }
}

/// Default reporter: stdout, the tracing log, the mission's activity log,
/// and an optional shell hook per event.
#[derive(Clone)]
pub struct Notifier {
    paths: StatePaths,
    repo: String,
    hook_command: Option<String>,
}

impl Notifier {
    pub fn new(
        paths: StatePaths,
        repo: impl Into<String>,
        hook_command: Option<String>,
    ) -> Self {
        Self {
            paths,
            repo: repo.into(),
            hook_command,
        }
    }

    async fn append_activity_line(&self, mission_id: &str, text: &str) {
        let path = self.paths.activity_log(&self.repo, mission_id);
        let line = format!("- {} {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"), text);

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await;

        match result {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    warn!(error = %e, "Failed to write activity log");
                }
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to open activity log");
            }
        }
    }

    async fn run_hook(&self, hook_cmd: &str, event: &MissionEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => j,
            Err(_) => return,
        };

        let result = Command::new("sh")
            .args(["-c", hook_cmd])
            .env("ARMADA_EVENT", event.event_type.as_str())
            .env("ARMADA_MISSION_ID", &event.mission_id)
            .env("ARMADA_REPO", &self.repo)
            .env("ARMADA_EVENT_JSON", &json)
            .output()
            .await;

        if let Err(e) = result {
            debug!(error = %e, hook = %hook_cmd, "Failed to run hook");
        }
    }
}

#[async_trait]
impl Reporter for Notifier {
    async fn post(&self, text: &str) -> Result<()> {
        info!(repo = %self.repo, "{}", text);
        println!("{}", console::style(text).dim());
        Ok(())
    }

    async fn notify(&self, event: &MissionEvent) -> Result<()> {
        let summary = event.summary();
        if event.event_type.is_error() {
            warn!(mission = %event.mission_id, "{}", summary);
            println!("{}", console::style(&summary).red());
        } else {
            info!(mission = %event.mission_id, "{}", summary);
            println!("{}", console::style(&summary).dim());
        }

        self.append_activity_line(&event.mission_id, &summary).await;

        if let Some(hook) = &self.hook_command {
            self.run_hook(hook, event).await;
        }
        Ok(())
    }
}
