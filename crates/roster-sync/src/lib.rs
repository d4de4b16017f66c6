//! Reconciliation engine for rostersync.
//!
//! A pass fetches the SIS and the learning platform concurrently, diffs each
//! scheduled kind, orders the resulting operations so that no record is
//! written before the records it references, and submits them with bounded
//! concurrency. Every pass ends with a [`RunReport`].

pub mod cancel;
pub mod config;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod orchestrator;
pub mod report;
pub mod sequencer;
pub mod state;

pub use cancel::CancellationFlag;
pub use config::{ApplyConfig, PolicyConfig, ScheduleConfig, SchoolConfig, SyncConfig};
pub use error::{GatewayError, GatewayErrorKind, GatewayResult, SyncError, SyncResult};
pub use gateway::{Ack, Gateway, SnapshotFeed};
pub use memory::{InMemoryGateway, StaticFeed};
pub use orchestrator::{AbortedPass, SyncOrchestrator};
pub use report::{
    FailureCause, FailureEntry, KindCounts, ReportCollector, RunReport, SkipReason, SkippedEntry,
};
pub use sequencer::{planned_counts, PlanTier, PresenceIndex, SequenceError, SequencedPlan, Sequencer, Tier};
pub use state::PassState;
