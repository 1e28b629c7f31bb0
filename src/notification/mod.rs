//! Progress reporting: typed mission events fanned out to the console,
//! the activity log, and an optional shell hook.

mod events;
mod notifier;

pub use events::{EventType, MissionEvent};
pub use notifier::{Notifier, Reporter};
