use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use roster_diff::DiffOptions;
use roster_model::MappingContext;
use roster_types::EntityKind;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Top-level configuration of a sync pass, loaded from TOML.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub schedule: ScheduleConfig,
    pub apply: ApplyConfig,
    pub policy: PolicyConfig,
    pub schools: Vec<SchoolConfig>,
}

/// Which entity kinds a pass reconciles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub staff: bool,
    pub students: bool,
    pub sections: bool,
    pub enrollments: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            staff: false,
            students: true,
            sections: true,
            enrollments: true,
        }
    }
}

impl ScheduleConfig {
    pub fn is_enabled(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Staff => self.staff,
            EntityKind::Student => self.students,
            EntityKind::Section => self.sections,
            EntityKind::Enrollment => self.enrollments,
        }
    }

    /// Enabled kinds in precedence order.
    pub fn enabled_kinds(&self) -> Vec<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .filter(|k| self.is_enabled(*k))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    /// Operations submitted concurrently within one tier.
    pub max_concurrency: usize,
    /// Wall-clock budget for the apply phase. Unattempted operations are
    /// skipped once it runs out.
    pub apply_timeout_secs: Option<u64>,
    /// Stop after sequencing; apply nothing.
    pub dry_run: bool,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            apply_timeout_secs: None,
            dry_run: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Deactivate staff missing from the SIS. Off by default.
    pub deactivate_staff: bool,
    /// Student or staff ids the engine never touches.
    pub exclude: Vec<String>,
}

/// Default product code for sections of one school.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolConfig {
    pub org_id: String,
    pub product_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SyncConfig {
    pub fn from_toml_str(s: &str) -> SyncResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml(&self) -> SyncResult<String> {
        toml::to_string_pretty(self).map_err(|e| SyncError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.apply.max_concurrency == 0 {
            return Err(SyncError::InvalidConfig(
                "apply.max_concurrency must be at least 1".into(),
            ));
        }
        if self.apply.apply_timeout_secs == Some(0) {
            return Err(SyncError::InvalidConfig(
                "apply.apply_timeout_secs must be positive".into(),
            ));
        }
        for school in &self.schools {
            if school.org_id.trim().is_empty() || school.product_code.trim().is_empty() {
                return Err(SyncError::InvalidConfig(
                    "every [[schools]] entry needs org_id and product_code".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn apply_timeout(&self) -> Option<Duration> {
        self.apply.apply_timeout_secs.map(Duration::from_secs)
    }

    pub fn diff_options(&self, kind: EntityKind) -> DiffOptions {
        DiffOptions {
            allow_deactivate: kind != EntityKind::Staff || self.policy.deactivate_staff,
        }
    }

    pub fn mapping_context(&self, as_of: NaiveDate) -> MappingContext {
        self.schools.iter().fold(MappingContext::new(as_of), |ctx, school| {
            ctx.with_school(school.org_id.trim(), school.product_code.trim())
        })
    }
}
