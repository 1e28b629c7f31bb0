//! Risk classification for work items.
//!
//! Maps a work item's declared file scope (and, when that is absent, its
//! title/description text) onto a closed set of risk categories, and each
//! category onto exactly one mandatory reviewer role. Classification is pure:
//! the same item and pattern table always yield the same flags.

use std::collections::{BTreeSet, HashMap};

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{ArmadaError, Result};
use crate::mission::WorkItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskCategory {
    Auth,
    Security,
    Migration,
    CiWorkflow,
    Infra,
    Deploy,
    Dependency,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 7] = [
        Self::Auth,
        Self::Security,
        Self::Migration,
        Self::CiWorkflow,
        Self::Infra,
        Self::Deploy,
        Self::Dependency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Security => "security",
            Self::Migration => "migration",
            Self::CiWorkflow => "ci-workflow",
            Self::Infra => "infra",
            Self::Deploy => "deploy",
            Self::Dependency => "dependency",
        }
    }

    /// The single reviewer role each category requires. `Human` is never
    /// auto-invoked; the scheduler surfaces it as a checkpoint instead.
    pub fn mandatory_reviewer(&self) -> ReviewerRole {
        match self {
            Self::Auth | Self::Security => ReviewerRole::SecurityReviewer,
            Self::CiWorkflow | Self::Infra | Self::Deploy => ReviewerRole::InfraReviewer,
            Self::Dependency => ReviewerRole::TestReviewer,
            Self::Migration => ReviewerRole::Human,
        }
    }

    fn default_patterns(&self) -> &'static [&'static str] {
        match self {
            Self::CiWorkflow => &[".github/workflows/**"],
            Self::Infra => &[
                "infra/**",
                "terraform/**",
                "deploy/**",
                "Dockerfile",
                "docker-compose*.yml",
            ],
            Self::Deploy => &[],
            Self::Migration => &["db/migrate/**", "prisma/migrations/**", "migrations/**"],
            Self::Auth => &["**/auth/**", "**/security/**", "**/middleware/auth*"],
            Self::Security => &[],
            Self::Dependency => &[
                "package.json",
                "pnpm-lock.yaml",
                "Cargo.toml",
                "Cargo.lock",
                "Gemfile",
                "Gemfile.lock",
                "requirements.txt",
                "go.mod",
            ],
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Auth => &[
                "auth",
                "login",
                "oauth",
                "jwt",
                "session",
                "password",
                "credential",
            ],
            Self::Security => &["security", "permission", "rbac", "acl", "encrypt", "secret"],
            Self::Migration => &["migration", "migrate", "schema", "alter table", "add column"],
            Self::Infra => &[
                "docker",
                "terraform",
                "deploy",
                "ci/cd",
                "pipeline",
                "kubernetes",
                "k8s",
            ],
            Self::Dependency => &["dependency", "upgrade", "package", "install"],
            Self::CiWorkflow | Self::Deploy => &[],
        }
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RiskCategory {
    type Err = ArmadaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ArmadaError::Config(format!("Unknown risk category: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewerRole {
    SecurityReviewer,
    InfraReviewer,
    TestReviewer,
    Human,
}

impl ReviewerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecurityReviewer => "security-reviewer",
            Self::InfraReviewer => "infra-reviewer",
            Self::TestReviewer => "test-reviewer",
            Self::Human => "human",
        }
    }

    /// Review briefing for this role on a specific item. Static per-role
    /// templates; there is no fall-through for unknown roles.
    pub fn review_prompt(&self, item: &WorkItem, artifacts_hint: &str) -> String {
        let flags = item
            .risk_flags
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        match self {
            Self::SecurityReviewer => format!(
                "Review objective {} ({}) for security issues. Risk flags: {}. \
                 Read the evidence bundle under {} and review the code changes. \
                 Write your security review to the mission briefings directory.",
                item.id, item.title, flags, artifacts_hint
            ),
            Self::InfraReviewer => format!(
                "Review objective {} ({}) for infrastructure and CI safety. Risk flags: {}. \
                 Read the evidence bundle under {} and review configuration changes. \
                 Write your review to the mission briefings directory.",
                item.id, item.title, flags, artifacts_hint
            ),
            Self::TestReviewer => format!(
                "Review objective {} ({}) for test coverage and dependency safety. \
                 Risk flags: {}. Verify no breaking changes against the evidence under {}. \
                 Write your report to the mission briefings directory.",
                item.id, item.title, flags, artifacts_hint
            ),
            Self::Human => format!(
                "Objective {} ({}) requires human review. Risk flags: {}.",
                item.id, item.title, flags
            ),
        }
    }
}

impl std::fmt::Display for ReviewerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub struct RiskClassifier {
    patterns: HashMap<RiskCategory, Vec<Pattern>>,
}

impl RiskClassifier {
    /// Build from the default pattern table plus per-category overrides from
    /// project config. Unknown category keys and malformed globs are
    /// configuration errors.
    pub fn new(overrides: &HashMap<String, Vec<String>>) -> Result<Self> {
        let mut patterns: HashMap<RiskCategory, Vec<Pattern>> = HashMap::new();

        for category in RiskCategory::ALL {
            let compiled = category
                .default_patterns()
                .iter()
                .map(|p| compile(p))
                .collect::<Result<Vec<_>>>()?;
            patterns.insert(category, compiled);
        }

        for (key, globs) in overrides {
            let category: RiskCategory = key.parse()?;
            let compiled = globs
                .iter()
                .map(|p| compile(p))
                .collect::<Result<Vec<_>>>()?;
            patterns.insert(category, compiled);
        }

        Ok(Self { patterns })
    }

    /// Risk categories matched by the item's declared file scope. Falls back
    /// to keyword matching on title/description when no file scope is given.
    pub fn classify(&self, item: &WorkItem) -> BTreeSet<RiskCategory> {
        if item.context_sources.is_empty() {
            return self.classify_text(&item.title, &item.description);
        }

        let mut flags = BTreeSet::new();
        for source in &item.context_sources {
            for (category, patterns) in &self.patterns {
                if patterns.iter().any(|p| p.matches(source)) {
                    flags.insert(*category);
                }
            }
        }
        flags
    }

    pub fn classify_paths(&self, paths: &[String]) -> BTreeSet<RiskCategory> {
        let mut flags = BTreeSet::new();
        for path in paths {
            for (category, patterns) in &self.patterns {
                if patterns.iter().any(|p| p.matches(path)) {
                    flags.insert(*category);
                }
            }
        }
        flags
    }

    fn classify_text(&self, title: &str, description: &str) -> BTreeSet<RiskCategory> {
        let text = format!("{} {}", title, description).to_lowercase();
        RiskCategory::ALL
            .iter()
            .copied()
            .filter(|c| c.keywords().iter().any(|kw| text.contains(kw)))
            .collect()
    }
}

/// Reviewer roles required by a set of risk flags, de-duplicated.
pub fn mandatory_reviewers<'a, I>(categories: I) -> BTreeSet<ReviewerRole>
where
    I: IntoIterator<Item = &'a RiskCategory>,
{
    categories
        .into_iter()
        .map(|c| c.mandatory_reviewer())
        .collect()
}

fn compile(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| ArmadaError::Config(format!("Bad glob '{}': {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::WorkItem;

    fn classifier() -> RiskClassifier {
        RiskClassifier::new(&HashMap::new()).unwrap()
    }

    fn item_with_sources(sources: &[&str]) -> WorkItem {
        let mut item = WorkItem::new("obj-1", "Wire up endpoints", "Plumb the new routes");
        item.context_sources = sources.iter().map(|s| s.to_string()).collect();
        item
    }

    #[test]
    fn classifies_by_file_scope() {
        let flags = classifier().classify(&item_with_sources(&[
            "src/auth/token.rs",
            ".github/workflows/ci.yml",
        ]));
        assert!(flags.contains(&RiskCategory::Auth));
        assert!(flags.contains(&RiskCategory::CiWorkflow));
        assert!(!flags.contains(&RiskCategory::Migration));
    }

    #[test]
    fn keyword_fallback_only_without_file_scope() {
        let mut item = WorkItem::new("obj-2", "Add OAuth login flow", "JWT session handling");
        assert!(classifier().classify(&item).contains(&RiskCategory::Auth));

        // With a benign file scope, keywords are not consulted.
        item.context_sources = vec!["src/ui/button.rs".to_string()];
        assert!(classifier().classify(&item).is_empty());
    }

    #[test]
    fn classification_is_deterministic() {
        let item = item_with_sources(&["migrations/0001_init.sql", "Cargo.toml"]);
        let c = classifier();
        assert_eq!(c.classify(&item), c.classify(&item));
    }

    #[test]
    fn reviewer_table() {
        use RiskCategory::*;
        assert_eq!(Auth.mandatory_reviewer(), ReviewerRole::SecurityReviewer);
        assert_eq!(Migration.mandatory_reviewer(), ReviewerRole::Human);
        assert_eq!(Dependency.mandatory_reviewer(), ReviewerRole::TestReviewer);
        assert_eq!(Infra.mandatory_reviewer(), ReviewerRole::InfraReviewer);

        let reviewers = mandatory_reviewers([Auth, Security].iter());
        assert_eq!(reviewers.len(), 1);
    }

    #[test]
    fn project_overrides_replace_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert("auth".to_string(), vec!["lib/session/**".to_string()]);
        let c = RiskClassifier::new(&overrides).unwrap();

        let flags = c.classify(&item_with_sources(&["lib/session/cookie.rs"]));
        assert!(flags.contains(&RiskCategory::Auth));

        // Default auth pattern no longer applies once overridden.
        let flags = c.classify(&item_with_sources(&["src/auth/token.rs"]));
        assert!(!flags.contains(&RiskCategory::Auth));
    }

    #[test]
    fn unknown_override_category_rejected() {
        let mut overrides = HashMap::new();
        overrides.insert("warp-core".to_string(), vec!["engine/**".to_string()]);
        assert!(RiskClassifier::new(&overrides).is_err());
    }
}
