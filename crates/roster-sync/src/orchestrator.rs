//! One reconciliation pass, end to end.
//!
//! Fetch both systems concurrently, map, diff each scheduled kind, sequence,
//! then submit tier by tier. Individual operation failures are recorded and
//! the pass carries on; only a fetch failure, a configuration error, an
//! Unauthorized response, or cancellation ends a pass early, and even then a
//! report is produced.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use roster_diff::diff;
use roster_model::{MappingContext, RawRecord, Side, Snapshot, SnapshotBuilder};
use roster_types::{EntityKind, OperationKind, RecordKey, StagedOperation};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cancel::CancellationFlag;
use crate::config::SyncConfig;
use crate::error::{GatewayError, GatewayResult, SyncError, SyncResult};
use crate::gateway::{Ack, Gateway, SnapshotFeed};
use crate::report::{ReportCollector, RunReport, SkipReason};
use crate::sequencer::{planned_counts, PresenceIndex, SequencedPlan, Sequencer};
use crate::state::PassState;

/// A pass that ended before completing. The report covers everything that
/// happened up to that point.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct AbortedPass {
    #[source]
    pub error: SyncError,
    pub report: Box<RunReport>,
}

/// Drives reconciliation passes between one source and one target.
pub struct SyncOrchestrator {
    source: Arc<dyn SnapshotFeed>,
    target: Arc<dyn Gateway>,
    config: SyncConfig,
    as_of: Option<NaiveDate>,
    cancel: CancellationFlag,
}

impl SyncOrchestrator {
    pub fn new(source: Arc<dyn SnapshotFeed>, target: Arc<dyn Gateway>, config: SyncConfig) -> Self {
        Self {
            source,
            target,
            config,
            as_of: None,
            cancel: CancellationFlag::new(),
        }
    }

    /// Evaluate end dates against `as_of` instead of today.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle for cancelling a running pass.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one pass.
    pub async fn run(&self) -> Result<RunReport, AbortedPass> {
        let dry_run = self.config.apply.dry_run;
        let collector = ReportCollector::new(dry_run);
        info!(run_id = %collector.run_id(), dry_run, "pass started");

        let as_of = self.as_of.unwrap_or_else(|| Utc::now().date_naive());
        let ctx = self.config.mapping_context(as_of);
        let kinds = self.config.schedule.enabled_kinds();
        let target_kinds = presence_kinds(&kinds);

        let fetched = tokio::try_join!(
            fetch_rows(self.source.as_ref(), Side::Source, &kinds),
            fetch_rows(self.target.as_ref(), Side::Target, &target_kinds),
        );
        let (source_rows, target_rows) = match fetched {
            Ok(rows) => rows,
            Err(e) => return Err(abort(&collector, PassState::Failed, e)),
        };

        transition(&collector, PassState::Diffing);
        let source = self.build_snapshot(Side::Source, &ctx, &source_rows);
        let target = self.build_snapshot(Side::Target, &ctx, &target_rows);
        for rejection in source.rejections().iter().chain(target.rejections()) {
            if kinds.contains(&rejection.kind) {
                collector.record_rejection(rejection);
            }
        }

        let mut change_sets = Vec::with_capacity(kinds.len());
        for &kind in &kinds {
            let changes = match diff(kind, &source, &target, &self.config.diff_options(kind)) {
                Ok(changes) => changes,
                Err(e) => return Err(abort(&collector, PassState::Aborted, e.into())),
            };
            info!(
                kind = %kind,
                creates = changes.creates(),
                updates = changes.updates(),
                deactivates = changes.deactivates(),
                "kind diffed"
            );
            change_sets.push(changes);
        }

        transition(&collector, PassState::Sequencing);
        let presence = PresenceIndex::build(&target, &change_sets);
        let plan = match Sequencer::sequence(change_sets, &presence) {
            Ok(plan) => plan,
            Err(e) => return Err(abort(&collector, PassState::Aborted, e.into())),
        };
        collector.record_planned(&plan);
        for (kind, action, count) in planned_counts(&plan) {
            info!(kind = %kind, action = action.as_str(), count, "operations planned");
        }

        if dry_run {
            info!(operations = plan.len(), "dry run, nothing applied");
            return Ok(finish(&collector, PassState::Complete));
        }

        transition(&collector, PassState::Applying);
        match self.apply_plan(plan, &collector).await {
            None => Ok(finish(&collector, PassState::Complete)),
            Some(Stop::Unauthorized(e)) => {
                Err(abort(&collector, PassState::Aborted, SyncError::Unauthorized(e)))
            }
            Some(Stop::Cancelled) => Err(abort(&collector, PassState::Cancelled, SyncError::Cancelled)),
        }
    }

    fn build_snapshot(
        &self,
        side: Side,
        ctx: &MappingContext,
        rows: &[(EntityKind, Vec<RawRecord>)],
    ) -> Snapshot {
        let mut builder = SnapshotBuilder::new(side, ctx).exclude(self.config.policy.exclude.iter().cloned());
        for (kind, batch) in rows {
            builder.extend(*kind, batch);
        }
        builder.build()
    }

    /// Submit the plan tier by tier. Returns why submission stopped early,
    /// if it did.
    async fn apply_plan(&self, plan: SequencedPlan, collector: &ReportCollector) -> Option<Stop> {
        let semaphore = Arc::new(Semaphore::new(self.config.apply.max_concurrency));
        let deadline = self.config.apply_timeout().map(|t| Instant::now() + t);
        let mut progress = ApplyProgress::new(collector);

        for tier in plan.into_tiers() {
            if progress.stop.is_some() {
                for op in &tier.operations {
                    progress.skip(op);
                }
                continue;
            }
            debug!(tier = %tier.tier, operations = tier.operations.len(), "applying tier");

            let mut join_set = JoinSet::new();
            let mut in_flight: HashMap<Id, StagedOperation> = HashMap::new();

            for op in tier.operations {
                progress.drain_ready(&mut join_set, &mut in_flight);
                if progress.stop.is_none() && self.interrupted(deadline) {
                    progress.stop = Some(Stop::Cancelled);
                }
                if progress.stop.is_some() {
                    progress.skip(&op);
                    continue;
                }
                if progress.blocked(&op) {
                    warn!(op = %op, "parent create failed, skipping");
                    collector.record_skipped(&op, SkipReason::DependencyFailed);
                    continue;
                }

                let permit = match wait_until(deadline, Arc::clone(&semaphore).acquire_owned()).await {
                    Some(Ok(permit)) => permit,
                    // The semaphore is never closed, so only the deadline gets here.
                    _ => {
                        progress.stop = Some(Stop::Cancelled);
                        progress.skip(&op);
                        continue;
                    }
                };
                progress.drain_ready(&mut join_set, &mut in_flight);
                if progress.stop.is_none() && self.interrupted(deadline) {
                    progress.stop = Some(Stop::Cancelled);
                }
                if progress.stop.is_some() {
                    progress.skip(&op);
                    continue;
                }

                let target = Arc::clone(&self.target);
                let task_op = op.clone();
                let handle = join_set.spawn(async move {
                    let _permit = permit;
                    target.apply(&task_op).await
                });
                in_flight.insert(handle.id(), op);
            }

            loop {
                match wait_until(deadline, join_set.join_next_with_id()).await {
                    Some(Some(result)) => progress.settle(result, &mut in_flight),
                    Some(None) => break,
                    None => {
                        warn!(in_flight = in_flight.len(), "apply deadline reached");
                        join_set.abort_all();
                        progress.stop.get_or_insert(Stop::Cancelled);
                        let mut abandoned: Vec<_> = in_flight.drain().map(|(_, op)| op).collect();
                        abandoned.sort_by_key(StagedOperation::key);
                        for op in &abandoned {
                            progress.skip(op);
                        }
                        break;
                    }
                }
            }
        }

        progress.stop
    }

    fn interrupted(&self, deadline: Option<Instant>) -> bool {
        self.cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Why submission stopped before the plan was exhausted.
#[derive(Debug)]
enum Stop {
    Unauthorized(GatewayError),
    Cancelled,
}

impl Stop {
    fn skip_reason(&self) -> SkipReason {
        match self {
            Self::Unauthorized(_) => SkipReason::Aborted,
            Self::Cancelled => SkipReason::Cancelled,
        }
    }
}

struct ApplyProgress<'a> {
    collector: &'a ReportCollector,
    failed_creates: HashSet<RecordKey>,
    stop: Option<Stop>,
}

impl<'a> ApplyProgress<'a> {
    fn new(collector: &'a ReportCollector) -> Self {
        Self {
            collector,
            failed_creates: HashSet::new(),
            stop: None,
        }
    }

    /// Record an unattempted operation under the current stop reason.
    fn skip(&self, op: &StagedOperation) {
        let reason = self
            .stop
            .as_ref()
            .map_or(SkipReason::Cancelled, Stop::skip_reason);
        self.collector.record_skipped(op, reason);
    }

    /// An operation is blocked when a record it references failed to be
    /// created earlier in the pass.
    fn blocked(&self, op: &StagedOperation) -> bool {
        op.record
            .references()
            .iter()
            .any(|r| self.failed_creates.contains(r))
    }

    fn drain_ready(
        &mut self,
        join_set: &mut JoinSet<GatewayResult<Ack>>,
        in_flight: &mut HashMap<Id, StagedOperation>,
    ) {
        while let Some(result) = join_set.try_join_next_with_id() {
            self.settle(result, in_flight);
        }
    }

    fn settle(
        &mut self,
        result: Result<(Id, GatewayResult<Ack>), JoinError>,
        in_flight: &mut HashMap<Id, StagedOperation>,
    ) {
        let (op, outcome) = match result {
            Ok((id, outcome)) => match in_flight.remove(&id) {
                Some(op) => (op, outcome),
                None => return,
            },
            Err(join_error) => {
                error!(error = %join_error, "apply task failed");
                match in_flight.remove(&join_error.id()) {
                    Some(op) => (
                        op,
                        Err(GatewayError::transient(format!("apply task failed: {join_error}"))),
                    ),
                    None => return,
                }
            }
        };

        match outcome {
            Ok(_) => {
                debug!(op = %op, "operation applied");
                self.collector.record_success(&op);
            }
            Err(e) => {
                warn!(op = %op, error = %e, "operation failed");
                if op.kind == OperationKind::Create && op.entity().is_parent() {
                    self.failed_creates.insert(op.key());
                }
                if e.is_fatal() && self.stop.is_none() {
                    self.stop = Some(Stop::Unauthorized(e.clone()));
                }
                self.collector.record_failure(&op, &e);
            }
        }
    }
}

/// Kinds to fetch from the target: the scheduled kinds, plus every kind
/// enrollments reference when enrollments are scheduled.
fn presence_kinds(kinds: &[EntityKind]) -> Vec<EntityKind> {
    EntityKind::ALL
        .into_iter()
        .filter(|k| {
            kinds.contains(k)
                || kinds
                    .iter()
                    .any(|scheduled| scheduled.dependencies().contains(k))
        })
        .collect()
}

async fn fetch_rows<F>(
    feed: &F,
    side: Side,
    kinds: &[EntityKind],
) -> SyncResult<Vec<(EntityKind, Vec<RawRecord>)>>
where
    F: SnapshotFeed + ?Sized,
{
    let mut rows = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let batch = feed
            .fetch_all(kind)
            .await
            .map_err(|source| SyncError::Fetch { side, kind, source })?;
        debug!(side = %side, kind = %kind, count = batch.len(), "records fetched");
        rows.push((kind, batch));
    }
    Ok(rows)
}

async fn wait_until<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

fn transition(collector: &ReportCollector, next: PassState) {
    let from = collector.state();
    debug_assert!(from.can_transition_to(next), "{from} -> {next}");
    debug!(from = %from, to = %next, "pass state");
    collector.set_state(next);
}

fn finish(collector: &ReportCollector, state: PassState) -> RunReport {
    let report = collector.finish(state);
    info!(run_id = %report.run_id, "{}", report.summary());
    report
}

fn abort(collector: &ReportCollector, state: PassState, error: SyncError) -> AbortedPass {
    error!(error = %error, state = %state, "pass ended early");
    let report = collector.finish(state);
    AbortedPass {
        error,
        report: Box::new(report),
    }
}
