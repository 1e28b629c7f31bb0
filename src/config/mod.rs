//! Configuration types and state-tree path resolution.
//!
//! Per-repository settings live in `config.toml` under the repo's state
//! directory; `StatePaths` resolves everything else (mission documents,
//! artifacts, clones, worktrees) from two environment-overridable roots.

mod paths;
mod settings;

pub use paths::StatePaths;
pub(crate) use paths::worktree_slot;
pub use settings::{HealthConfig, ProjectConfig};
