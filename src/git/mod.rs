//! Git and GitHub CLI subprocess wrappers, plus input validation for
//! everything that ends up on a command line.

mod runner;

pub use runner::{GhRunner, GitRunner};

use crate::error::{ArmadaError, Result};

/// Repository names become filesystem paths and branch prefixes; keep them
/// to a single conservative path segment.
pub fn validate_repo_name(repo: &str) -> Result<()> {
    let valid = !repo.is_empty()
        && repo.len() <= 100
        && repo
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && repo != "."
        && repo != "..";

    if valid {
        Ok(())
    } else {
        Err(ArmadaError::InvalidRepoName(repo.to_string()))
    }
}

/// Branch and ref arguments must never be mistakable for flags or carry
/// shell-meaningful characters.
pub fn assert_safe_ref(field: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && !value.starts_with('-')
        && !value.contains("..")
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-'));

    if valid {
        Ok(())
    } else {
        Err(ArmadaError::UnsafeRef {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}
