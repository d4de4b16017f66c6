//! Per-pass outcome accounting.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use roster_model::MappingRejection;
use roster_types::{EntityKind, OperationKind, StagedOperation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GatewayError, GatewayErrorKind};
use crate::sequencer::SequencedPlan;
use crate::state::PassState;

/// Why an operation or record was not attempted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The record could not be mapped into canonical form.
    Mapping,
    Cancelled,
    /// The pass stopped after the target refused credentials.
    Aborted,
    /// A record this operation references failed to be created.
    DependencyFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mapping => "mapping",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
            Self::DependencyFailed => "dependency failed",
        };
        f.write_str(s)
    }
}

/// Outcome counts for one entity kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub planned: usize,
    pub created: usize,
    pub updated: usize,
    pub deactivated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// What went wrong with a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureCause {
    Mapping {
        message: String,
    },
    Gateway {
        kind: GatewayErrorKind,
        message: String,
        status: Option<u16>,
    },
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mapping { message } => write!(f, "mapping: {message}"),
            Self::Gateway { kind, message, .. } => write!(f, "{kind}: {message}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub kind: EntityKind,
    /// Identity key, or the best identity that could be read for records
    /// that failed to map.
    pub identity: String,
    pub operation: Option<OperationKind>,
    pub cause: FailureCause,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub kind: EntityKind,
    pub identity: String,
    pub operation: OperationKind,
    pub reason: SkipReason,
}

/// Everything that happened in one pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: PassState,
    pub dry_run: bool,
    pub kinds: BTreeMap<EntityKind, KindCounts>,
    /// Sequenced operations, in submission order.
    pub planned: Vec<StagedOperation>,
    pub failures: Vec<FailureEntry>,
    pub skipped: Vec<SkippedEntry>,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            finished_at: None,
            state: PassState::Fetching,
            dry_run,
            kinds: BTreeMap::new(),
            planned: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Counts for one kind (all zero if nothing touched it).
    pub fn counts(&self, kind: EntityKind) -> KindCounts {
        self.kinds.get(&kind).copied().unwrap_or_default()
    }

    /// Counts summed over every kind.
    pub fn totals(&self) -> KindCounts {
        self.kinds.values().fold(KindCounts::default(), |acc, c| KindCounts {
            planned: acc.planned + c.planned,
            created: acc.created + c.created,
            updated: acc.updated + c.updated,
            deactivated: acc.deactivated + c.deactivated,
            skipped: acc.skipped + c.skipped,
            failed: acc.failed + c.failed,
        })
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Planned operations of one kind.
    pub fn planned_for(&self, kind: EntityKind) -> impl Iterator<Item = &StagedOperation> {
        self.planned.iter().filter(move |op| op.entity() == kind)
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let t = self.totals();
        let mut line = format!(
            "run {} {}: {} planned, {} created, {} updated, {} deactivated, {} skipped, {} failed",
            self.run_id, self.state, t.planned, t.created, t.updated, t.deactivated, t.skipped, t.failed
        );
        if self.dry_run {
            line.push_str(" (dry run)");
        }
        line
    }

    fn counts_mut(&mut self, kind: EntityKind) -> &mut KindCounts {
        self.kinds.entry(kind).or_default()
    }
}

/// Single aggregation point for outcomes recorded from concurrent tasks.
pub struct ReportCollector {
    inner: Mutex<RunReport>,
}

impl ReportCollector {
    pub fn new(dry_run: bool) -> Self {
        Self {
            inner: Mutex::new(RunReport::new(dry_run)),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.inner.lock().expect("lock poisoned").run_id
    }

    pub fn state(&self) -> PassState {
        self.inner.lock().expect("lock poisoned").state
    }

    pub fn set_state(&self, state: PassState) {
        self.inner.lock().expect("lock poisoned").state = state;
    }

    pub fn record_rejection(&self, rejection: &MappingRejection) {
        let mut report = self.inner.lock().expect("lock poisoned");
        report.counts_mut(rejection.kind).skipped += 1;
        report.failures.push(FailureEntry {
            kind: rejection.kind,
            identity: format!(
                "{}:{}",
                rejection.kind,
                rejection.identity.as_deref().unwrap_or("?")
            ),
            operation: None,
            cause: FailureCause::Mapping {
                message: format!("{}: {}", rejection.side, rejection.error),
            },
        });
    }

    pub fn record_planned(&self, plan: &SequencedPlan) {
        let mut report = self.inner.lock().expect("lock poisoned");
        for op in plan.operations() {
            report.counts_mut(op.entity()).planned += 1;
            report.planned.push(op.clone());
        }
    }

    pub fn record_success(&self, op: &StagedOperation) {
        let mut report = self.inner.lock().expect("lock poisoned");
        let counts = report.counts_mut(op.entity());
        match op.kind {
            OperationKind::Create => counts.created += 1,
            OperationKind::Update => counts.updated += 1,
            OperationKind::Deactivate => counts.deactivated += 1,
        }
    }

    pub fn record_failure(&self, op: &StagedOperation, error: &GatewayError) {
        let mut report = self.inner.lock().expect("lock poisoned");
        report.counts_mut(op.entity()).failed += 1;
        report.failures.push(FailureEntry {
            kind: op.entity(),
            identity: op.key().to_string(),
            operation: Some(op.kind),
            cause: FailureCause::Gateway {
                kind: error.kind,
                message: error.message.clone(),
                status: error.status,
            },
        });
    }

    pub fn record_skipped(&self, op: &StagedOperation, reason: SkipReason) {
        let mut report = self.inner.lock().expect("lock poisoned");
        report.counts_mut(op.entity()).skipped += 1;
        report.skipped.push(SkippedEntry {
            kind: op.entity(),
            identity: op.key().to_string(),
            operation: op.kind,
            reason,
        });
    }

    /// Close the report with its terminal state.
    pub fn finish(&self, state: PassState) -> RunReport {
        let mut report = self.inner.lock().expect("lock poisoned");
        report.state = state;
        report.finished_at = Some(Utc::now());
        report.clone()
    }
}
