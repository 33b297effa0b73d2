use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::color::{AudienceColors, LegendEntry};
use crate::config::SelectionContext;
use crate::data::aggregate::AggregatedTable;
use crate::data::filter::{select, Field, FilterChain, Predicate};
use crate::data::model::{RankedRow, Timestep};
use crate::error::PipelineError;

/// Model components, in display order.
pub const COMPONENT_VARIABLES: [&str; 6] = [
    "counterfactual_action",
    "predicted_action",
    "incremental_action",
    "counterfactual_outcome",
    "predicted_outcome",
    "incremental_outcome",
];

/// Performance indicators, in display order.
pub const PERFORMANCE_VARIABLES: [&str; 3] = [
    "quality",
    "action_performance_index",
    "outcome_performance_index",
];

pub const OUTCOME_TYPES: [&str; 2] = ["nbrx", "trx"];

// ---------------------------------------------------------------------------
// Chart specification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarMode {
    Relative,
    #[default]
    Group,
}

/// A named chart: its filter chain plus how the charting collaborator
/// should encode the surviving rows. x is always `timestep`, y `value`,
/// colour `audience`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub name: String,
    pub title: String,
    pub y_label: String,
    #[serde(default)]
    pub bar_mode: BarMode,
    #[serde(default)]
    pub facet_row: Option<Field>,
    #[serde(default)]
    pub facet_col: Option<Field>,
    /// Emit `se` as the error bar.
    #[serde(default)]
    pub error_y: bool,
    /// Category order for `variable`; unlisted variables sort after.
    #[serde(default)]
    pub variable_order: Vec<String>,
    #[serde(default)]
    pub filters: FilterChain,
    /// Append the session's audience-name selection to the chain.
    #[serde(default)]
    pub scoped_to_audience_name: bool,
}

impl ChartSpec {
    fn new(name: &str, title: &str, y_label: &str) -> Self {
        ChartSpec {
            name: name.to_string(),
            title: title.to_string(),
            y_label: y_label.to_string(),
            bar_mode: BarMode::Group,
            facet_row: None,
            facet_col: None,
            error_y: false,
            variable_order: Vec::new(),
            filters: FilterChain::default(),
            scoped_to_audience_name: false,
        }
    }

    fn filter(mut self, predicate: Predicate) -> Self {
        self.filters = self.filters.and(predicate);
        self
    }

    fn facets(mut self, row: Option<Field>, col: Option<Field>) -> Self {
        self.facet_row = row;
        self.facet_col = col;
        self
    }

    fn relative(mut self) -> Self {
        self.bar_mode = BarMode::Relative;
        self
    }

    fn with_error(mut self) -> Self {
        self.error_y = true;
        self
    }

    fn scoped(mut self) -> Self {
        self.scoped_to_audience_name = true;
        self
    }

    fn ordered_variables(mut self, order: &[&str]) -> Self {
        self.variable_order = order.iter().map(|v| v.to_string()).collect();
        self
    }

    /// The full chain for this chart under `ctx`.
    pub fn chain(&self, ctx: &SelectionContext) -> FilterChain {
        let chain = self.filters.clone();
        if self.scoped_to_audience_name {
            chain.and(ctx.audience_name_filter())
        } else {
            chain
        }
    }

    fn variable_rank(&self, variable: &str) -> usize {
        self.variable_order
            .iter()
            .position(|v| v == variable)
            .unwrap_or(self.variable_order.len())
    }

    /// Filter `table` for this chart and project the rows to points, sorted
    /// by audience rank, then variable order, then timestep.
    pub fn view(&self, table: &AggregatedTable, ctx: &SelectionContext, colors: &AudienceColors) -> ChartView {
        let mut rows: Vec<&RankedRow> = select(table, &self.chain(ctx));
        rows.sort_by(|a, b| {
            a.audience_rank
                .cmp(&b.audience_rank)
                .then_with(|| self.variable_rank(&a.variable).cmp(&self.variable_rank(&b.variable)))
                .then_with(|| a.variable.cmp(&b.variable))
                .then_with(|| a.timestep.cmp(&b.timestep))
        });

        let mut seen = HashSet::new();
        let legend = colors.legend(
            rows.iter()
                .map(|r| r.audience.as_str())
                .filter(|a| seen.insert(*a)),
        );

        let points = rows
            .iter()
            .map(|r| ChartPoint {
                x: r.timestep.clone(),
                y: r.value,
                error_y: self.error_y.then_some(r.se),
                color: r.audience.clone(),
                facet_row: self.facet_row.map(|f| f.value_of(r).into_owned()),
                facet_col: self.facet_col.map(|f| f.value_of(r).into_owned()),
            })
            .collect();

        ChartView {
            name: self.name.clone(),
            title: self.title.clone(),
            y_label: self.y_label.clone(),
            bar_mode: self.bar_mode,
            points,
            legend,
        }
    }
}

// ---------------------------------------------------------------------------
// Chart output
// ---------------------------------------------------------------------------

/// One bar: (x, y, color, facet) plus an optional error bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub x: Timestep,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_y: Option<f64>,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facet_row: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facet_col: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartView {
    pub name: String,
    pub title: String,
    pub y_label: String,
    pub bar_mode: BarMode,
    pub points: Vec<ChartPoint>,
    pub legend: Vec<LegendEntry>,
}

impl ChartView {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The dashboard's standard charts.
pub fn default_catalog() -> Vec<ChartSpec> {
    let observed = || Predicate::contains(Field::Variable, "observed");
    let incremental = || Predicate::starts_with(Field::Variable, "pct_incremental");
    let components = || Predicate::one_of(Field::Variable, COMPONENT_VARIABLES);
    let performance = || Predicate::one_of(Field::Variable, PERFORMANCE_VARIABLES);
    let variable = |v: &str| Predicate::equals(Field::Variable, v);
    let outcome = |o: &str| Predicate::equals(Field::OutcomeType, o);

    let mut charts = vec![
        ChartSpec::new("observed_suggestion", "Observed Suggestions Over Time", "Observed Suggestions")
            .filter(observed())
            .filter(outcome("nbrx"))
            .filter(variable("observed_suggestion"))
            .facets(None, Some(Field::AudienceName))
            .relative(),
        ChartSpec::new("observed_action", "Observed Action Over Time", "Observed Actions")
            .filter(observed())
            .filter(variable("observed_action"))
            .facets(None, Some(Field::AudienceName))
            .relative(),
    ];

    for o in OUTCOME_TYPES {
        charts.push(
            ChartSpec::new(
                &format!("observed_outcome_{o}"),
                &format!("Observed Outcomes Over Time ({o})"),
                "Observed Outcomes",
            )
            .filter(observed())
            .filter(outcome(o))
            .filter(variable("observed_outcome"))
            .facets(None, Some(Field::AudienceName))
            .relative(),
        );
    }

    for (name, title, label) in [
        (
            "pct_incremental_predicted_action",
            "Percent Incremental Predicted Action Over Time",
            "Percent Incremental Predicted Actions",
        ),
        (
            "pct_incremental_predicted_outcome",
            "Percent Incremental Predicted Outcome Over Time",
            "Percent Incremental Predicted Outcomes",
        ),
    ] {
        charts.push(
            ChartSpec::new(name, title, label)
                .filter(incremental())
                .filter(variable(name))
                .facets(Some(Field::OutcomeType), None)
                .with_error()
                .scoped(),
        );
    }

    charts.push(
        ChartSpec::new("action_components", "Action Components Over Time", "Value")
            .filter(components())
            .filter(Predicate::contains(Field::Variable, "action"))
            .filter(outcome("nbrx"))
            .facets(Some(Field::Variable), None)
            .with_error()
            .scoped()
            .ordered_variables(&COMPONENT_VARIABLES),
    );
    charts.push(
        ChartSpec::new("outcome_components", "Outcome Components Over Time", "Value")
            .filter(components())
            .filter(Predicate::contains(Field::Variable, "outcome"))
            .facets(Some(Field::Variable), Some(Field::OutcomeType))
            .with_error()
            .scoped()
            .ordered_variables(&COMPONENT_VARIABLES),
    );

    for (name, title, label) in [
        ("quality", "Quality Over Time", "Quality"),
        (
            "action_performance_index",
            "Action Performance Index Over Time",
            "Action Performance Index",
        ),
        (
            "outcome_performance_index",
            "Outcome Performance Index Over Time",
            "Outcome Performance Index",
        ),
    ] {
        let mut chart = ChartSpec::new(name, title, label)
            .filter(performance())
            .filter(variable(name))
            .facets(Some(Field::Audience), Some(Field::OutcomeType))
            .scoped()
            .ordered_variables(&PERFORMANCE_VARIABLES);
        if name == "action_performance_index" {
            chart = chart.filter(outcome("nbrx"));
        }
        charts.push(chart);
    }

    charts
}

/// Default catalog followed by `extra`; chart names must be unique.
pub fn build_catalog(extra: Vec<ChartSpec>) -> Result<Vec<ChartSpec>, PipelineError> {
    let mut charts = default_catalog();
    charts.extend(extra);
    let mut names = HashSet::new();
    for chart in &charts {
        if !names.insert(chart.name.as_str()) {
            return Err(PipelineError::configuration(
                "charts",
                chart.name.clone(),
                "chart name is already defined",
            ));
        }
    }
    Ok(charts)
}

/// Evaluate every chart against one snapshot, in parallel. Results keep
/// catalog order.
pub fn render_all(
    charts: &[ChartSpec],
    table: &AggregatedTable,
    ctx: &SelectionContext,
    colors: &AudienceColors,
) -> Vec<ChartView> {
    charts
        .par_iter()
        .map(|chart| chart.view(table, ctx, colors))
        .collect()
}
