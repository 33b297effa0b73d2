use std::collections::HashMap;

use serde::Serialize;

use super::model::{GroupingKey, RankedRow};
use super::order::OrderedTable;

// ---------------------------------------------------------------------------
// AggregatedTable – one row per grouping key
// ---------------------------------------------------------------------------

/// Result of one aggregation pass. Row order is first appearance of each
/// grouping key in the input; callers that need display order sort by
/// `audience_rank` themselves.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedTable {
    pub timestep_type: String,
    pub theme: String,
    pub rows: Vec<RankedRow>,
}

impl AggregatedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Running sums for one group. Standard errors combine through their
/// variances.
struct Accumulator {
    first: RankedRow,
    value: f64,
    lower_ci: f64,
    upper_ci: f64,
    variance: f64,
    count: usize,
}

impl Accumulator {
    fn new(row: &RankedRow) -> Self {
        Self {
            first: row.clone(),
            value: 0.0,
            lower_ci: 0.0,
            upper_ci: 0.0,
            variance: 0.0,
            count: 0,
        }
    }

    fn add(&mut self, row: &RankedRow) {
        self.value += row.value;
        self.lower_ci += row.lower_ci;
        self.upper_ci += row.upper_ci;
        self.variance += row.se * row.se;
        self.count += 1;
    }

    fn finish(self) -> RankedRow {
        let mut out = self.first;
        out.row.value = self.value;
        out.row.lower_ci = self.lower_ci;
        out.row.upper_ci = self.upper_ci;
        // A single contributor keeps its se bit-for-bit.
        if self.count > 1 {
            out.row.se = self.variance.sqrt();
        }
        out
    }
}

/// Select rows matching both `timestep_type` and `theme` exactly, then
/// collapse them by grouping key:
///
/// * `value`, `lower_ci`, `upper_ci` are summed
/// * `se = sqrt(Σ se_i²)`
///
/// A selector absent from the data yields an empty table, not an error.
pub fn aggregate(table: &OrderedTable, timestep_type: &str, theme: &str) -> AggregatedTable {
    let mut index: HashMap<GroupingKey, usize> = HashMap::new();
    let mut groups: Vec<Accumulator> = Vec::new();
    let mut selected = 0usize;

    for row in table
        .rows()
        .iter()
        .filter(|r| r.timestep_type == timestep_type && r.theme == theme)
    {
        selected += 1;
        let slot = *index.entry(row.grouping_key()).or_insert_with(|| {
            groups.push(Accumulator::new(row));
            groups.len() - 1
        });
        groups[slot].add(row);
    }

    let rows: Vec<RankedRow> = groups.into_iter().map(Accumulator::finish).collect();

    if rows.is_empty() {
        log::warn!(
            "aggregation selected no rows for timestep_type={timestep_type:?}, theme={theme:?}"
        );
    } else {
        log::info!(
            "aggregated {selected} of {} rows into {} groups (timestep_type={timestep_type:?}, theme={theme:?})",
            table.len(),
            rows.len()
        );
    }

    AggregatedTable {
        timestep_type: timestep_type.to_string(),
        theme: theme.to_string(),
        rows,
    }
}
