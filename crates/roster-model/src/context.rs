use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};

/// Inputs to mapping that do not come from the record itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingContext {
    /// Records whose end/exit date lies strictly before this day are inactive.
    pub as_of: NaiveDate,
    /// Default learning-platform product code per org (school) id.
    pub schools: BTreeMap<String, String>,
}

impl MappingContext {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            schools: BTreeMap::new(),
        }
    }

    /// Register the default product code for a school.
    pub fn with_school(mut self, org_id: impl Into<String>, product_code: impl Into<String>) -> Self {
        self.schools.insert(org_id.into(), product_code.into());
        self
    }

    pub fn default_product_code(&self, org_id: &str) -> Option<&str> {
        self.schools.get(org_id).map(String::as_str)
    }
}

impl Default for MappingContext {
    fn default() -> Self {
        Self::new(Utc::now().date_naive())
    }
}
