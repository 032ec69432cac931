//! Core storage and transaction engine for the task tracking system: atomic
//! file I/O, per-project locking, transactional moves between statuses, and
//! the integrity checker/repairer. See `SPEC_FULL.md` at the repository
//! root for the full component design.

pub mod atomic_io;
pub mod clock;
pub mod core;
pub mod error;
pub mod identifiers;
pub mod integrity;
pub mod lock;
pub mod locator;
pub mod model;
pub mod mutators;
pub mod paths;
pub mod status;
pub mod transaction;

pub use core::Core;
pub use error::{Error, ErrorKind, Result};
