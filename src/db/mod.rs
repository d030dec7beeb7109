//! Database module: plugin tables and read-only views of the host booking tables.
//!
//! - `model`: row shapes specific to persistence.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules import from `registry_sync::db`; the repository API is
//! re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::FormEntry;
