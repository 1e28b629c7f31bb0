//! Command-line surface.

mod commands;
mod display;

pub use commands::{Cli, Commands};
pub use display::Display;
