//! Application Layer - Use cases and application services
//!
//! This module orchestrates the batch synchronizer and the interactive status
//! service on top of the domain and infrastructure layers.

pub mod errors;
pub mod report;
pub mod services;
pub mod sync_runner;


pub use errors::*;
pub use report::{render_markdown, write_report};
pub use services::*;
pub use sync_runner::*;
