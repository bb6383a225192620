//! Domain Layer - Core concepts of the catalog synchronization subsystem
//!
//! Repository identities and snapshots, catalog entries, and the pure
//! maintenance-status classifier live here. Nothing in this layer performs I/O.

pub mod entities;
pub mod errors;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use services::*;
pub use value_objects::*;
