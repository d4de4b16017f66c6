//! Foundation types for rostersync.
//!
//! This crate provides the canonical vocabulary shared by every other
//! rostersync crate: what kinds of entities are reconciled, how they are
//! identified, what a canonical record looks like, and what a staged
//! operation against the learning platform carries.
//!
//! # Key Types
//!
//! - [`EntityKind`]: Staff, Student, Section, Enrollment (in precedence order)
//! - [`RecordKey`]: Identity key of a record; enrollments use a composite key
//! - [`CanonicalRecord`]: Tagged canonical record produced by the record model
//! - [`Role`]: Shared role vocabulary across both systems
//! - [`StagedOperation`]: A pending Create/Update/Deactivate

pub mod error;
pub mod key;
pub mod kind;
pub mod operation;
pub mod record;
pub mod role;

pub use error::TypeError;
pub use key::RecordKey;
pub use kind::EntityKind;
pub use operation::{OperationKind, StagedOperation};
pub use record::{CanonicalRecord, Enrollment, Section, Staff, Student};
pub use role::Role;
