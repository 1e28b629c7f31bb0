//! armada: a crash-recoverable mission orchestrator for autonomous
//! coding agents.
//!
//! A mission decomposes a repository change into a dependency graph of
//! work items, executes them in bounded parallel batches inside git
//! worktrees, folds finished branches into an integration branch, runs
//! mandatory reviews on risky changes, and opens the final pull request.
//! Every decision is re-derived from the persisted mission document, so
//! any process can crash or be restarted at any point.

pub mod cli;
pub mod config;
pub mod error;
pub mod evidence;
pub mod git;
pub mod health;
pub mod merge;
pub mod mission;
pub mod notification;
pub mod risk;
pub mod scheduler;
pub mod store;
pub mod worker;
pub mod workspace;

pub use error::{ArmadaError, Result};
