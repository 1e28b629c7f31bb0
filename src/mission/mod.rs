//! Mission domain model.
//!
//! A mission is the unit of orchestration: one high-level description,
//! decomposed into a dependency graph of work items, driven through an
//! explicit state machine until its integration branch lands in a PR.

mod status;
mod types;

pub use status::{MissionStatus, WorkItemStatus};
pub use types::{
    Mission, PrRef, PrState, Progress, SafetyLimits, SessionLogEntry, WorkItem,
};
