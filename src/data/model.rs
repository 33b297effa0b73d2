use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Sentinel category meaning "aggregated across the dimension".
pub const ALL: &str = "all";

// ---------------------------------------------------------------------------
// Timestep – a single cell of the `timestep` column
// ---------------------------------------------------------------------------

/// Timestep values are either numeric (week index, day offset) or textual
/// (ISO dates, period labels), depending on the export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestep {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Timestep {
    /// Type a raw cell: integer first, then finite float, else text.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if let Ok(i) = s.parse::<i64>() {
            return i.into();
        }
        match s.parse::<f64>() {
            Ok(f) if f.is_finite() => Timestep::from_f64(f),
            _ => Timestep::Text(s.to_string()),
        }
    }

    /// A numeric cell. Integral values become `Integer` so `1` and `1.0`
    /// share one grouping key and one rendering.
    pub fn from_f64(f: f64) -> Self {
        match integral(f) {
            Some(i) => i.into(),
            None => Timestep::Float(f),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Timestep::Integer(i) => Some(*i as f64),
            Timestep::Float(f) => Some(*f),
            Timestep::Text(_) => None,
        }
    }

    /// Exact integer value of a numeric timestep, if it has one.
    fn as_integer(&self) -> Option<i64> {
        match self {
            Timestep::Integer(i) => Some(*i),
            Timestep::Float(f) => integral(*f),
            Timestep::Text(_) => None,
        }
    }
}

fn integral(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, hence the strict bound.
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then(|| f as i64)
}

// -- Manual Eq/Ord/Hash so Timestep can live in a hashed grouping key --

impl PartialEq for Timestep {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestep {}

impl PartialOrd for Timestep {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestep {
    /// Numbers before text. Numbers compare by value whatever their variant,
    /// so `Integer(1) == Float(1.0)`.
    fn cmp(&self, other: &Self) -> Ordering {
        use Timestep::*;
        match (self, other) {
            (Text(a), Text(b)) => a.cmp(b),
            (Text(_), _) => Ordering::Greater,
            (_, Text(_)) => Ordering::Less,
            (a, b) => match (a.as_integer(), b.as_integer()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                    x.total_cmp(&y)
                }
            },
        }
    }
}

impl std::hash::Hash for Timestep {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match (self, self.as_integer()) {
            (Timestep::Text(s), _) => (2u8, s).hash(state),
            (_, Some(i)) => (0u8, i).hash(state),
            (_, None) => (1u8, self.as_f64().unwrap_or(0.0).to_bits()).hash(state),
        }
    }
}

impl fmt::Display for Timestep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestep::Integer(i) => write!(f, "{i}"),
            Timestep::Float(v) => write!(f, "{v}"),
            Timestep::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Timestep {
    fn from(i: i64) -> Self {
        Timestep::Integer(i)
    }
}

// ---------------------------------------------------------------------------
// MeasurementRow – one observation
// ---------------------------------------------------------------------------

/// One observation: nine categorical dimensions and four measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRow {
    pub suggestion_type: String,
    pub action_type: String,
    pub outcome_type: String,
    pub theme: String,
    pub audience_name: String,
    pub audience: String,
    pub timestep_type: String,
    pub timestep: Timestep,
    pub variable: String,
    pub value: f64,
    pub lower_ci: f64,
    pub upper_ci: f64,
    pub se: f64,
}

/// The nine categorical fields identifying "the same logical measurement".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupingKey {
    pub suggestion_type: String,
    pub action_type: String,
    pub outcome_type: String,
    pub theme: String,
    pub audience_name: String,
    pub audience: String,
    pub timestep_type: String,
    pub timestep: Timestep,
    pub variable: String,
}

impl MeasurementRow {
    pub fn grouping_key(&self) -> GroupingKey {
        GroupingKey {
            suggestion_type: self.suggestion_type.clone(),
            action_type: self.action_type.clone(),
            outcome_type: self.outcome_type.clone(),
            theme: self.theme.clone(),
            audience_name: self.audience_name.clone(),
            audience: self.audience.clone(),
            timestep_type: self.timestep_type.clone(),
            timestep: self.timestep.clone(),
            variable: self.variable.clone(),
        }
    }

    /// Reject non-finite measures and negative standard errors.
    ///
    /// `lower_ci <= value <= upper_ci` is passed through unchecked.
    pub fn validate(&self, row: usize) -> Result<(), PipelineError> {
        for (column, v) in [
            ("value", self.value),
            ("lower_ci", self.lower_ci),
            ("upper_ci", self.upper_ci),
            ("se", self.se),
        ] {
            if !v.is_finite() {
                return Err(PipelineError::schema(
                    Some(row),
                    column,
                    format!("measure must be finite, got {v}"),
                ));
            }
        }
        if self.se < 0.0 {
            return Err(PipelineError::schema(
                Some(row),
                "se",
                format!("standard error must be non-negative, got {}", self.se),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MeasurementTable – the validated input table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MeasurementTable {
    rows: Vec<MeasurementRow>,
}

impl MeasurementTable {
    /// Validate every row and wrap them into a table.
    pub fn new(rows: Vec<MeasurementRow>) -> Result<Self, PipelineError> {
        for (i, row) in rows.iter().enumerate() {
            row.validate(i)?;
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[MeasurementRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct values of a column in order of first appearance.
    pub fn distinct<'a, F>(&'a self, column: F) -> Vec<&'a str>
    where
        F: Fn(&'a MeasurementRow) -> &'a str,
    {
        let mut seen = std::collections::HashSet::new();
        self.rows
            .iter()
            .map(column)
            .filter(|v| seen.insert(*v))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Audience rank – the derived sort key column
// ---------------------------------------------------------------------------

/// Position of an audience in the analyst's order. The sentinel is always
/// ranked after every position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceRank {
    Position(usize),
    All,
}

/// A measurement row carrying its audience rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRow {
    #[serde(flatten)]
    pub row: MeasurementRow,
    pub audience_rank: AudienceRank,
}

impl Deref for RankedRow {
    type Target = MeasurementRow;

    fn deref(&self) -> &MeasurementRow {
        &self.row
    }
}
