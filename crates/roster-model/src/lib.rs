//! Record model for rostersync.
//!
//! Raw records from the SIS and the learning platform are translated here
//! into the shared canonical form before anything is compared:
//! - [`RawRecord`]: a record as delivered, field name to JSON value
//! - [`source`] / [`target`]: per-system mapping functions
//! - [`Snapshot`] / [`SnapshotBuilder`]: keyed canonical records plus the
//!   records that failed to map

pub mod context;
pub mod error;
pub mod normalize;
pub mod raw;
pub mod snapshot;
pub mod source;
pub mod target;

pub use context::MappingContext;
pub use error::{MappingError, MappingResult};
pub use raw::RawRecord;
pub use snapshot::{MappingRejection, Side, Snapshot, SnapshotBuilder};
