//! Differ for rostersync.
//!
//! Compares the canonical source and target snapshots one entity kind at a
//! time and produces the minimal set of staged operations that brings the
//! target into agreement with the source.
//!
//! # Key Types
//!
//! - [`ChangeSet`] -- Operations for one kind, ordered by identity key
//! - [`DiffOptions`] -- Per-kind differ settings (deactivation on/off)

pub mod change_set;
pub mod differ;
pub mod error;

pub use change_set::ChangeSet;
pub use differ::{diff, diff_records, DiffOptions};
pub use error::{DiffError, DiffResult};
