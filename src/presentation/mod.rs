//! Presentation Layer - Command-line surface
//!
//! Argument parsing, progress display and console rendering of results.

pub mod cli;
pub mod output;
pub mod progress;

pub use cli::*;
pub use output::*;
pub use progress::*;
