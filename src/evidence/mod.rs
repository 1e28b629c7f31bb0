//! Evidence bundles.
//!
//! Every worker session ends by writing a structured account of what it
//! did: files touched, commands run, test outcome. The bundles feed the
//! mandatory reviews and are stitched into the pull request body, so a
//! human can audit a mission without replaying agent transcripts.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::config::StatePaths;
use crate::error::{ArmadaError, Result};
use crate::mission::Mission;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceBundle {
    pub objective_id: String,
    pub agent: String,
    pub summary: String,
    pub files_changed: FilesChanged,
    pub commands_run: Vec<String>,
    pub tests: TestEvidence,
    pub risk_flags: Vec<String>,
    pub notes_for_reviewer: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesChanged {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl FilesChanged {
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.created
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
    }

    pub fn total(&self) -> usize {
        self.created.len() + self.modified.len() + self.deleted.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    Pass,
    Fail,
    Skip,
    #[default]
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestEvidence {
    pub added: Vec<String>,
    pub result: TestResult,
    pub coverage: Option<String>,
}

impl EvidenceBundle {
    /// Minimal well-formedness: identity fields present and a summary a
    /// reviewer can read. Workers that emit less get their bundle rejected.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.objective_id.is_empty() {
            problems.push("missing objective_id");
        }
        if self.agent.is_empty() {
            problems.push("missing agent");
        }
        if self.summary.trim().is_empty() {
            problems.push("empty summary");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ArmadaError::Evidence(problems.join(", ")))
        }
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let bundle: Self = serde_json::from_str(&content)?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Markdown section for one objective, used in reviews and the PR body.
    pub fn format_objective_markdown(&self) -> String {
        let mut md = format!("### {}\n\n{}\n\n", self.objective_id, self.summary);

        if self.files_changed.total() > 0 {
            md.push_str(&format!(
                "**Files:** {} created, {} modified, {} deleted\n",
                self.files_changed.created.len(),
                self.files_changed.modified.len(),
                self.files_changed.deleted.len()
            ));
        }

        let test_line = match self.tests.result {
            TestResult::Pass => Some(format!(
                "**Tests:** pass ({} added)",
                self.tests.added.len()
            )),
            TestResult::Fail => Some("**Tests:** FAIL".to_string()),
            TestResult::Skip => Some("**Tests:** skipped".to_string()),
            TestResult::None => None,
        };
        if let Some(line) = test_line {
            md.push_str(&line);
            md.push('\n');
        }

        if !self.risk_flags.is_empty() {
            md.push_str(&format!("**Risk:** {}\n", self.risk_flags.join(", ")));
        }
        if let Some(notes) = &self.notes_for_reviewer {
            md.push_str(&format!("\n> {}\n", notes));
        }
        md.push('\n');
        md
    }
}

/// All readable evidence bundles for a mission, in work item order.
/// Unreadable bundles are logged and skipped rather than failing the PR.
pub async fn read_all(paths: &StatePaths, mission: &Mission) -> Vec<EvidenceBundle> {
    let mut bundles = Vec::new();
    for item in &mission.work_items {
        let path = paths.evidence_file(&mission.repo, &mission.mission_id, &item.id);
        if !path.exists() {
            continue;
        }
        match EvidenceBundle::read(&path).await {
            Ok(bundle) => bundles.push(bundle),
            Err(e) => {
                warn!(item = %item.id, error = %e, "skipping unreadable evidence bundle")
            }
        }
    }
    bundles
}

/// Pull request body for a finished mission: description, objective table,
/// and one evidence section per objective.
pub fn build_pr_body(mission: &Mission, bundles: &[EvidenceBundle]) -> String {
    let mut body = format!("## Mission: {}\n\n{}\n\n", mission.mission_id, mission.description);

    body.push_str("| Objective | Status | Risk |\n|---|---|---|\n");
    for item in &mission.work_items {
        let risk = if item.risk_flags.is_empty() {
            "-".to_string()
        } else {
            item.risk_flags
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        body.push_str(&format!(
            "| {} {} | {} | {} |\n",
            item.id, item.title, item.status, risk
        ));
    }
    body.push('\n');

    if bundles.is_empty() {
        body.push_str("_No evidence bundles were produced._\n");
    } else {
        body.push_str("## Evidence\n\n");
        for bundle in bundles {
            body.push_str(&bundle.format_objective_markdown());
        }
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::mission::WorkItem;

    fn bundle() -> EvidenceBundle {
        EvidenceBundle {
            objective_id: "obj-1".to_string(),
            agent: "implementer".to_string(),
            summary: "Added the endpoint".to_string(),
            files_changed: FilesChanged {
                created: vec!["src/api.rs".to_string()],
                modified: vec!["src/lib.rs".to_string()],
                deleted: vec![],
            },
            commands_run: vec!["cargo test".to_string()],
            tests: TestEvidence {
                added: vec!["api::tests::create".to_string()],
                result: TestResult::Pass,
                coverage: None,
            },
            risk_flags: vec![],
            notes_for_reviewer: None,
        }
    }

    #[test]
    fn valid_bundle_passes() {
        assert!(bundle().validate().is_ok());
    }

    #[test]
    fn empty_summary_rejected() {
        let mut b = bundle();
        b.summary = "  ".to_string();
        assert!(matches!(b.validate(), Err(ArmadaError::Evidence(_))));
    }

    #[test]
    fn missing_fields_reported_together() {
        let b = EvidenceBundle::default();
        let err = b.validate().unwrap_err().to_string();
        assert!(err.contains("objective_id"));
        assert!(err.contains("agent"));
    }

    #[test]
    fn markdown_mentions_tests_and_files() {
        let md = bundle().format_objective_markdown();
        assert!(md.starts_with("### obj-1"));
        assert!(md.contains("1 created, 1 modified"));
        assert!(md.contains("pass (1 added)"));
    }

    #[test]
    fn pr_body_lists_every_objective() {
        let mut mission = Mission::new("api", "ship it", &ProjectConfig::default());
        mission.work_items.push(WorkItem::new("obj-1", "endpoint", ""));
        mission.work_items.push(WorkItem::new("obj-2", "docs", ""));

        let body = build_pr_body(&mission, &[bundle()]);
        assert!(body.contains("| obj-1 endpoint |"));
        assert!(body.contains("| obj-2 docs |"));
        assert!(body.contains("### obj-1"));
    }

    #[test]
    fn unknown_json_fields_ignored() {
        let json = r#"{"objective_id":"obj-1","agent":"a","summary":"s","extra":42}"#;
        let parsed: EvidenceBundle = serde_json::from_str(json).unwrap();
        assert!(parsed.validate().is_ok());
    }
}
