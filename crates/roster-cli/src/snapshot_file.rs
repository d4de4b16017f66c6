//! JSON snapshot files: raw records of every kind, as one system holds them.

use std::path::Path;

use anyhow::Context;
use roster_model::RawRecord;
use roster_sync::{InMemoryGateway, StaticFeed};
use roster_types::EntityKind;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotFile {
    pub staff: Vec<RawRecord>,
    pub students: Vec<RawRecord>,
    pub sections: Vec<RawRecord>,
    pub enrollments: Vec<RawRecord>,
}

impl SnapshotFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing snapshot {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("writing snapshot {}", path.display()))
    }

    pub fn rows(&self, kind: EntityKind) -> &[RawRecord] {
        match kind {
            EntityKind::Staff => &self.staff,
            EntityKind::Student => &self.students,
            EntityKind::Section => &self.sections,
            EntityKind::Enrollment => &self.enrollments,
        }
    }

    fn rows_mut(&mut self, kind: EntityKind) -> &mut Vec<RawRecord> {
        match kind {
            EntityKind::Staff => &mut self.staff,
            EntityKind::Student => &mut self.students,
            EntityKind::Section => &mut self.sections,
            EntityKind::Enrollment => &mut self.enrollments,
        }
    }

    pub fn into_feed(self) -> StaticFeed {
        EntityKind::ALL
            .into_iter()
            .fold(StaticFeed::new(), |feed, kind| feed.with_rows(kind, self.rows(kind).to_vec()))
    }

    pub fn into_gateway(self) -> InMemoryGateway {
        let gateway = InMemoryGateway::new();
        for kind in EntityKind::ALL {
            gateway.seed(kind, self.rows(kind).to_vec());
        }
        gateway
    }

    /// Current contents of an in-memory platform.
    pub fn from_gateway(gateway: &InMemoryGateway) -> Self {
        let mut file = Self::default();
        for kind in EntityKind::ALL {
            *file.rows_mut(kind) = gateway.objects(kind);
        }
        file
    }
}
