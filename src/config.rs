use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::charts::ChartSpec;
use crate::data::filter::{Field, Predicate};

// ---------------------------------------------------------------------------
// Session configuration file
// ---------------------------------------------------------------------------

/// Analyst-supplied session settings. Every key is optional; unset
/// selections fall back to defaults derived from the loaded table.
///
/// ```json
/// {
///   "audience_order": ["hcp", "nurse"],
///   "timestep_type": "weekly",
///   "theme": "all",
///   "audience_name": "Segment",
///   "charts": []
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub audience_order: Option<Vec<String>>,
    pub timestep_type: Option<String>,
    pub theme: Option<String>,
    pub audience_name: Option<String>,
    /// Extra named charts appended to the default catalog.
    pub charts: Vec<ChartSpec>,
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Overlay `other` on top of `self`; set values in `other` win and its
    /// charts are appended.
    pub fn merge(mut self, other: SessionConfig) -> Self {
        if other.audience_order.is_some() {
            self.audience_order = other.audience_order;
        }
        if other.timestep_type.is_some() {
            self.timestep_type = other.timestep_type;
        }
        if other.theme.is_some() {
            self.theme = other.theme;
        }
        if other.audience_name.is_some() {
            self.audience_name = other.audience_name;
        }
        self.charts.extend(other.charts);
        self
    }
}

// ---------------------------------------------------------------------------
// Selection context
// ---------------------------------------------------------------------------

/// Immutable selection passed into every pipeline call.
///
/// `timestep_type` and `theme` gate aggregation; `audience_name` only feeds
/// the audience-name view filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionContext {
    pub timestep_type: String,
    pub theme: String,
    /// Display form (title case); matched lower-cased.
    pub audience_name: String,
}

impl SelectionContext {
    pub fn audience_name_filter(&self) -> Predicate {
        Predicate::equals(Field::AudienceName, self.audience_name.to_lowercase())
    }
}
