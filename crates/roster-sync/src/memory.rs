//! In-memory gateways for tests, local dry runs, and file-backed runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use roster_model::{target, RawRecord};
use roster_types::{EntityKind, OperationKind, RecordKey, StagedOperation};
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{Ack, Gateway, SnapshotFeed};

/// A read-only feed over fixed rows.
#[derive(Clone, Debug, Default)]
pub struct StaticFeed {
    rows: BTreeMap<EntityKind, Vec<RawRecord>>,
    failures: BTreeMap<EntityKind, GatewayError>,
}

impl StaticFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, kind: EntityKind, rows: Vec<RawRecord>) -> Self {
        self.rows.entry(kind).or_default().extend(rows);
        self
    }

    /// Make every fetch of `kind` fail with `error`.
    pub fn fail_fetch(mut self, kind: EntityKind, error: GatewayError) -> Self {
        self.failures.insert(kind, error);
        self
    }
}

#[async_trait]
impl SnapshotFeed for StaticFeed {
    async fn fetch_all(&self, kind: EntityKind) -> GatewayResult<Vec<RawRecord>> {
        if let Some(error) = self.failures.get(&kind) {
            return Err(error.clone());
        }
        Ok(self.rows.get(&kind).cloned().unwrap_or_default())
    }
}

/// A learning-platform stand-in that stores platform-shaped objects.
///
/// Applied operations are rendered with [`target::to_raw`], so a later fetch
/// returns exactly what a real platform would after the same writes.
/// Deactivation archives the stored object and never removes it.
pub struct InMemoryGateway {
    inner: RwLock<GatewayState>,
    latency: Option<Duration>,
}

#[derive(Default)]
struct GatewayState {
    objects: BTreeMap<EntityKind, Vec<RawRecord>>,
    apply_faults: HashMap<RecordKey, GatewayError>,
    fetch_faults: HashMap<EntityKind, GatewayError>,
    applied: Vec<StagedOperation>,
}

impl GatewayState {
    fn position(&self, key: &RecordKey) -> Option<usize> {
        let identity = key.identity();
        self.objects.get(&key.kind())?.iter().position(|raw| {
            target::identity_hint(key.kind(), raw).as_deref() == Some(identity.as_str())
        })
    }

    fn exists(&self, key: &RecordKey) -> bool {
        self.position(key).is_some()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GatewayState::default()),
            latency: None,
        }
    }

    /// Delay every apply by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Load existing platform objects.
    pub fn seed(&self, kind: EntityKind, rows: Vec<RawRecord>) {
        let mut state = self.inner.write().expect("lock poisoned");
        state.objects.entry(kind).or_default().extend(rows);
    }

    /// Make every apply against `key` fail with `error` until cleared.
    pub fn fail_apply(&self, key: RecordKey, error: GatewayError) {
        let mut state = self.inner.write().expect("lock poisoned");
        state.apply_faults.insert(key, error);
    }

    /// Make every fetch of `kind` fail with `error` until cleared.
    pub fn fail_fetch(&self, kind: EntityKind, error: GatewayError) {
        let mut state = self.inner.write().expect("lock poisoned");
        state.fetch_faults.insert(kind, error);
    }

    pub fn clear_faults(&self) {
        let mut state = self.inner.write().expect("lock poisoned");
        state.apply_faults.clear();
        state.fetch_faults.clear();
    }

    /// Operations applied successfully, in completion order.
    pub fn applied(&self) -> Vec<StagedOperation> {
        self.inner.read().expect("lock poisoned").applied.clone()
    }

    /// All stored objects of one kind.
    pub fn objects(&self, kind: EntityKind) -> Vec<RawRecord> {
        let state = self.inner.read().expect("lock poisoned");
        state.objects.get(&kind).cloned().unwrap_or_default()
    }

    fn apply_now(&self, op: &StagedOperation) -> GatewayResult<Ack> {
        let mut state = self.inner.write().expect("lock poisoned");
        let key = op.key();
        if let Some(error) = state.apply_faults.get(&key) {
            return Err(error.clone());
        }

        for reference in op.record.references() {
            if op.kind.is_upsert() && !state.exists(&reference) {
                return Err(GatewayError::from_status(
                    404,
                    format!("{key} references unknown {reference}"),
                ));
            }
        }

        let rendered = target::to_raw(&op.record);
        match (op.kind, state.position(&key)) {
            (OperationKind::Create, Some(_)) => {
                return Err(GatewayError::from_status(409, format!("{key} already exists")));
            }
            (OperationKind::Create, None) => {
                state.objects.entry(key.kind()).or_default().push(rendered);
            }
            (OperationKind::Update, None) => {
                return Err(GatewayError::from_status(404, format!("{key} not found")));
            }
            (OperationKind::Update | OperationKind::Deactivate, Some(index)) => {
                if let Some(objects) = state.objects.get_mut(&key.kind()) {
                    objects[index] = rendered;
                }
            }
            // Nothing to archive.
            (OperationKind::Deactivate, None) => {}
        }

        state.applied.push(op.clone());
        debug!(op = %op, "operation applied");
        Ok(Ack::for_operation(op))
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotFeed for InMemoryGateway {
    async fn fetch_all(&self, kind: EntityKind) -> GatewayResult<Vec<RawRecord>> {
        let state = self.inner.read().expect("lock poisoned");
        if let Some(error) = state.fetch_faults.get(&kind) {
            return Err(error.clone());
        }
        Ok(state.objects.get(&kind).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl Gateway for InMemoryGateway {
    async fn apply(&self, op: &StagedOperation) -> GatewayResult<Ack> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.apply_now(op)
    }
}
