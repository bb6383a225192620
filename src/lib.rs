//! Catalog Pulse - repository activity and metadata synchronization
//!
//! Classifies the maintenance health of cataloged open-source projects from
//! upstream forge signals and keeps catalog entries in sync with GitHub and
//! GitLab metadata under strict rate limits.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;
pub mod presentation;

pub use config::Config;
pub use logging::init_tracing;
