//! berth-core library exports
//!
//! The engine behind `berth`: resolves a collection out of a versioned
//! catalog, validates developer templates against the current schema, and
//! reconciles a project's persisted environment against both.

pub mod catalog;
pub mod error;
pub mod project;
pub mod reconcile;
pub mod settings;
pub mod template;
pub mod version;

pub use error::{BerthError, ErrorKind, ErrorScope, Result};
pub use version::Version;
