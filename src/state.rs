use std::sync::Arc;

use serde::Serialize;

use crate::charts::{build_catalog, render_all, ChartSpec, ChartView};
use crate::color::AudienceColors;
use crate::config::{SelectionContext, SessionConfig};
use crate::data::aggregate::{aggregate, AggregatedTable};
use crate::data::model::{MeasurementTable, ALL};
use crate::data::order::{AudienceOrder, OrderedTable};
use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Selection options
// ---------------------------------------------------------------------------

/// Values offered to the surrounding application's selection widgets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionOptions {
    /// `"all"` first, then the explicit themes.
    pub themes: Vec<String>,
    pub timestep_types: Vec<String>,
    /// Non-sentinel audiences in order of first appearance.
    pub audiences: Vec<String>,
    /// Title-cased for display.
    pub audience_names: Vec<String>,
}

impl SelectionOptions {
    pub fn from_table(table: &MeasurementTable) -> Self {
        let themes = std::iter::once(ALL.to_string())
            .chain(
                table
                    .distinct(|r| r.theme.as_str())
                    .into_iter()
                    .filter(|t| *t != ALL)
                    .map(String::from),
            )
            .collect();
        let timestep_types = table
            .distinct(|r| r.timestep_type.as_str())
            .into_iter()
            .map(String::from)
            .collect();
        let audiences = table
            .distinct(|r| r.audience.as_str())
            .into_iter()
            .filter(|a| *a != ALL)
            .map(String::from)
            .collect();
        let mut audience_names: Vec<String> = Vec::new();
        for name in table.distinct(|r| r.audience_name.as_str()) {
            let titled = title_case(name);
            if !audience_names.contains(&titled) {
                audience_names.push(titled);
            }
        }
        SelectionOptions {
            themes,
            timestep_types,
            audiences,
            audience_names,
        }
    }

    /// Fill unset selections with the first offered value.
    pub fn default_selection(&self, config: &SessionConfig) -> SelectionContext {
        let pick = |set: &Option<String>, offered: &[String]| {
            set.clone()
                .or_else(|| offered.first().cloned())
                .unwrap_or_default()
        };
        SelectionContext {
            timestep_type: pick(&config.timestep_type, &self.timestep_types),
            theme: pick(&config.theme, &self.themes),
            audience_name: pick(&config.audience_name, &self.audience_names),
        }
    }
}

/// Upper-case the first letter of every alphabetic run, lower-case the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Everything derived from one loaded table. Snapshots are replaced
/// wholesale on every change; handed-out `Arc`s stay valid.
pub struct Session {
    table: Arc<MeasurementTable>,
    options: SelectionOptions,
    order: Arc<AudienceOrder>,
    colors: Arc<AudienceColors>,
    ordered: Arc<OrderedTable>,
    selection: SelectionContext,
    aggregated: Arc<AggregatedTable>,
    charts: Arc<Vec<ChartSpec>>,
}

impl Session {
    /// Ingest a table under `config`. Without an explicit audience order the
    /// audiences keep their order of first appearance.
    pub fn new(table: MeasurementTable, config: SessionConfig) -> Result<Self, PipelineError> {
        let options = SelectionOptions::from_table(&table);
        let order = match &config.audience_order {
            Some(explicit) => AudienceOrder::new(explicit.iter().cloned())?,
            None => AudienceOrder::new(options.audiences.iter().cloned())?,
        };
        let ordered = order.apply(&table)?;
        let selection = options.default_selection(&config);
        let aggregated = aggregate(&ordered, &selection.timestep_type, &selection.theme);
        let charts = build_catalog(config.charts)?;

        Ok(Session {
            table: Arc::new(table),
            options,
            colors: Arc::new(AudienceColors::new(&order)),
            order: Arc::new(order),
            ordered: Arc::new(ordered),
            selection,
            aggregated: Arc::new(aggregated),
            charts: Arc::new(charts),
        })
    }

    /// Replace the loaded table; order and selection are re-derived from
    /// `config`.
    pub fn set_dataset(&mut self, table: MeasurementTable, config: SessionConfig) -> Result<(), PipelineError> {
        *self = Session::new(table, config)?;
        Ok(())
    }

    /// Install a new audience order. The ordered and aggregated tables are
    /// rebuilt; on error the session is unchanged.
    pub fn set_audience_order(&mut self, audiences: Vec<String>) -> Result<(), PipelineError> {
        let order = AudienceOrder::new(audiences)?;
        let ordered = order.apply(&self.table)?;
        self.aggregated = Arc::new(aggregate(
            &ordered,
            &self.selection.timestep_type,
            &self.selection.theme,
        ));
        self.ordered = Arc::new(ordered);
        self.colors = Arc::new(AudienceColors::new(&order));
        self.order = Arc::new(order);
        Ok(())
    }

    pub fn select_timestep_type(&mut self, timestep_type: impl Into<String>) {
        self.selection.timestep_type = timestep_type.into();
        self.reaggregate();
    }

    pub fn select_theme(&mut self, theme: impl Into<String>) {
        self.selection.theme = theme.into();
        self.reaggregate();
    }

    /// View-only: no re-aggregation.
    pub fn select_audience_name(&mut self, audience_name: impl Into<String>) {
        self.selection.audience_name = audience_name.into();
    }

    fn reaggregate(&mut self) {
        self.aggregated = Arc::new(aggregate(
            &self.ordered,
            &self.selection.timestep_type,
            &self.selection.theme,
        ));
    }

    pub fn table(&self) -> &MeasurementTable {
        &self.table
    }

    pub fn options(&self) -> &SelectionOptions {
        &self.options
    }

    pub fn selection(&self) -> &SelectionContext {
        &self.selection
    }

    pub fn audience_order(&self) -> Arc<AudienceOrder> {
        Arc::clone(&self.order)
    }

    pub fn ordered(&self) -> Arc<OrderedTable> {
        Arc::clone(&self.ordered)
    }

    /// The current aggregated snapshot.
    pub fn aggregated(&self) -> Arc<AggregatedTable> {
        Arc::clone(&self.aggregated)
    }

    pub fn charts(&self) -> &[ChartSpec] {
        &self.charts
    }

    pub fn colors(&self) -> &AudienceColors {
        &self.colors
    }

    /// Evaluate every chart against the current snapshot.
    pub fn chart_views(&self) -> Vec<ChartView> {
        render_all(&self.charts, &self.aggregated, &self.selection, &self.colors)
    }

    /// Evaluate one chart by name.
    pub fn chart_view(&self, name: &str) -> Option<ChartView> {
        self.charts
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.view(&self.aggregated, &self.selection, &self.colors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::fixtures::row;
    use crate::data::model::MeasurementRow;

    fn rows() -> Vec<MeasurementRow> {
        let mut monthly = row("b", "observed_action", 4.0, 1.0);
        monthly.timestep_type = "monthly".into();
        let mut all_theme = row("all", "observed_action", 9.0, 1.0);
        all_theme.theme = "all".into();
        all_theme.audience_name = "primary care".into();
        vec![
            row("b", "observed_action", 1.0, 1.0),
            row("a", "observed_action", 2.0, 1.0),
            monthly,
            all_theme,
        ]
    }

    fn session(config: SessionConfig) -> Session {
        Session::new(MeasurementTable::new(rows()).unwrap(), config).unwrap()
    }

    #[test]
    fn title_case_matches_display_form() {
        assert_eq!(title_case("primary care"), "Primary Care");
        assert_eq!(title_case("HCP_segment-2x"), "Hcp_Segment-2X");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn options_derive_from_table() {
        let options = SelectionOptions::from_table(&MeasurementTable::new(rows()).unwrap());
        assert_eq!(options.themes, vec!["all", "t1"]);
        assert_eq!(options.timestep_types, vec!["weekly", "monthly"]);
        assert_eq!(options.audiences, vec!["b", "a"]);
        assert_eq!(options.audience_names, vec!["Segment", "Primary Care"]);
    }

    #[test]
    fn defaults_fill_unset_selection() {
        let s = session(SessionConfig {
            theme: Some("t1".into()),
            ..Default::default()
        });
        assert_eq!(
            s.selection(),
            &SelectionContext {
                timestep_type: "weekly".into(),
                theme: "t1".into(),
                audience_name: "Segment".into(),
            }
        );
        assert_eq!(s.aggregated().len(), 2);
    }

    #[test]
    fn selection_change_replaces_snapshot() {
        let mut s = session(SessionConfig {
            theme: Some("t1".into()),
            ..Default::default()
        });
        let before = s.aggregated();
        s.select_timestep_type("monthly");
        let after = s.aggregated();
        assert_eq!(before.len(), 2);
        assert_eq!(after.len(), 1);
        assert_eq!(after.rows[0].value, 4.0);
        assert!(!Arc::ptr_eq(&before, &after));

        s.select_theme("nonexistent");
        assert!(s.aggregated().is_empty());
    }

    #[test]
    fn audience_name_selection_does_not_reaggregate() {
        let mut s = session(SessionConfig::default());
        let before = s.aggregated();
        s.select_audience_name("Primary Care");
        assert!(Arc::ptr_eq(&before, &s.aggregated()));
    }

    #[test]
    fn bad_audience_order_leaves_session_intact() {
        let mut s = session(SessionConfig::default());
        let order = s.audience_order();
        let err = s.set_audience_order(vec!["a".into()]).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { ref value, .. } if value == "b"));
        assert_eq!(s.audience_order(), order);

        s.set_audience_order(vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(s.audience_order().audiences(), ["a".to_string(), "b".to_string()]);
        assert_eq!(s.colors().color_for("a"), crate::color::generate_palette(2)[0]);
    }

    #[test]
    fn new_dataset_rebuilds_everything() {
        let mut s = session(SessionConfig {
            theme: Some("t1".into()),
            ..Default::default()
        });
        let before = s.aggregated();

        let replacement = vec![row("c", "quality", 6.0, 0.5)];
        let config = SessionConfig {
            theme: Some("t1".into()),
            ..Default::default()
        };
        s.set_dataset(MeasurementTable::new(replacement).unwrap(), config).unwrap();
        assert_eq!(s.options().audiences, vec!["c"]);
        assert_eq!(s.audience_order().audiences(), ["c".to_string()]);
        assert_eq!(s.aggregated().rows[0].value, 6.0);
        assert_eq!(before.len(), 2);

        let bad = SessionConfig {
            audience_order: Some(vec!["a".into()]),
            theme: Some("t1".into()),
            ..Default::default()
        };
        let again = vec![row("c", "quality", 1.0, 0.5)];
        assert!(s.set_dataset(MeasurementTable::new(again).unwrap(), bad).is_err());
        assert_eq!(s.aggregated().rows[0].value, 6.0);
    }

    #[test]
    fn explicit_order_must_cover_data() {
        let result = Session::new(
            MeasurementTable::new(rows()).unwrap(),
            SessionConfig {
                audience_order: Some(vec!["b".into()]),
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }
}
