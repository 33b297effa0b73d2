use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::aggregate::AggregatedTable;
use super::model::{MeasurementRow, RankedRow};

// ---------------------------------------------------------------------------
// Field – the categorical columns a predicate can look at
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    SuggestionType,
    ActionType,
    OutcomeType,
    Theme,
    AudienceName,
    Audience,
    TimestepType,
    /// Matched against the timestep's text rendering.
    Timestep,
    Variable,
}

impl Field {
    pub fn value_of<'a>(&self, row: &'a MeasurementRow) -> Cow<'a, str> {
        let s: &str = match self {
            Field::SuggestionType => &row.suggestion_type,
            Field::ActionType => &row.action_type,
            Field::OutcomeType => &row.outcome_type,
            Field::Theme => &row.theme,
            Field::AudienceName => &row.audience_name,
            Field::Audience => &row.audience,
            Field::TimestepType => &row.timestep_type,
            Field::Timestep => return Cow::Owned(row.timestep.to_string()),
            Field::Variable => &row.variable,
        };
        Cow::Borrowed(s)
    }
}

// ---------------------------------------------------------------------------
// Predicate – one typed filter
// ---------------------------------------------------------------------------

/// A single pure row predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Equals { field: Field, value: String },
    OneOf { field: Field, values: BTreeSet<String> },
    StartsWith { field: Field, prefix: String },
    Contains { field: Field, needle: String },
}

impl Predicate {
    pub fn equals(field: Field, value: impl Into<String>) -> Self {
        Predicate::Equals {
            field,
            value: value.into(),
        }
    }

    pub fn one_of<I, S>(field: Field, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Predicate::OneOf {
            field,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn starts_with(field: Field, prefix: impl Into<String>) -> Self {
        Predicate::StartsWith {
            field,
            prefix: prefix.into(),
        }
    }

    pub fn contains(field: Field, needle: impl Into<String>) -> Self {
        Predicate::Contains {
            field,
            needle: needle.into(),
        }
    }

    pub fn matches(&self, row: &MeasurementRow) -> bool {
        match self {
            Predicate::Equals { field, value } => field.value_of(row) == value.as_str(),
            Predicate::OneOf { field, values } => values.contains(&*field.value_of(row)),
            Predicate::StartsWith { field, prefix } => field.value_of(row).starts_with(prefix.as_str()),
            Predicate::Contains { field, needle } => field.value_of(row).contains(needle.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// FilterChain – conjunction of predicates
// ---------------------------------------------------------------------------

/// Predicates joined by AND. Order never affects the result; an empty chain
/// keeps every row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterChain {
    predicates: Vec<Predicate>,
}

impl FilterChain {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    /// Builder-style append.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, row: &MeasurementRow) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }
}

/// Return indices of rows that pass every predicate in `chain`.
pub fn filtered_indices(table: &AggregatedTable, chain: &FilterChain) -> Vec<usize> {
    table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| chain.matches(row))
        .map(|(i, _)| i)
        .collect()
}

/// Borrowed sub-table of the rows passing `chain`, in table order.
pub fn select<'a>(table: &'a AggregatedTable, chain: &FilterChain) -> Vec<&'a RankedRow> {
    let rows: Vec<&RankedRow> = filtered_indices(table, chain)
        .into_iter()
        .map(|i| &table.rows[i])
        .collect();
    log::debug!(
        "filter chain of {} predicates kept {} of {} rows",
        chain.len(),
        rows.len(),
        table.len()
    );
    rows
}
