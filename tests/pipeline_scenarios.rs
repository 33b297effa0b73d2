use std::collections::HashSet;
use std::io::Write;

use mabi_measure::config::SessionConfig;
use mabi_measure::data::aggregate::aggregate;
use mabi_measure::data::filter::{select, Field, FilterChain, Predicate};
use mabi_measure::data::loader::load_file;
use mabi_measure::data::model::{AudienceRank, MeasurementRow, MeasurementTable, Timestep};
use mabi_measure::data::order::AudienceOrder;
use mabi_measure::state::Session;
use tempfile::Builder;

const HEADER: &str = "suggestion_type,action_type,outcome_type,theme_raw,audience_name,audience,timestep_type,timestep,variable,value,lower_ci,upper_ci,se";

fn write_csv(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(".csv").tempfile().expect("temp csv");
    writeln!(file, "{HEADER}").expect("header");
    for line in lines {
        writeln!(file, "{line}").expect("row");
    }
    file.flush().expect("flush");
    file
}

fn measurement(audience: &str, theme: &str, variable: &str, step: i64, value: f64, se: f64) -> MeasurementRow {
    MeasurementRow {
        suggestion_type: "call_plan".into(),
        action_type: "visit".into(),
        outcome_type: "nbrx".into(),
        theme: theme.into(),
        audience_name: "segment".into(),
        audience: audience.into(),
        timestep_type: "weekly".into(),
        timestep: Timestep::Integer(step),
        variable: variable.into(),
        value,
        lower_ci: value,
        upper_ci: value,
        se,
    }
}

#[test]
fn two_partitions_collapse_into_one_row() {
    let file = write_csv(&[
        "call_plan,visit,nbrx,theme_t1,segment,x,weekly,1,observed_action,10,8,12,3",
        "call_plan,visit,nbrx,theme_t1,segment,x,weekly,1,observed_action,5,4,6,4",
    ]);
    let table = load_file(file.path()).expect("load");
    let session = Session::new(
        table,
        SessionConfig {
            timestep_type: Some("weekly".into()),
            theme: Some("t1".into()),
            ..Default::default()
        },
    )
    .expect("session");

    let agg = session.aggregated();
    assert_eq!(agg.len(), 1);
    let row = &agg.rows[0];
    assert_eq!(row.value, 15.0);
    assert_eq!(row.se, 5.0);
    assert_eq!(row.lower_ci, 12.0);
    assert_eq!(row.upper_ci, 18.0);
    assert_eq!(row.theme, "t1");
    assert_eq!(row.audience_rank, AudienceRank::Position(0));
}

#[test]
fn nonexistent_theme_yields_empty_views() {
    let file = write_csv(&["call_plan,visit,nbrx,theme_t1,segment,x,weekly,1,observed_action,10,8,12,3"]);
    let mut session = Session::new(load_file(file.path()).expect("load"), SessionConfig::default())
        .expect("session");

    session.select_theme("nonexistent");
    assert!(session.aggregated().is_empty());
    for view in session.chart_views() {
        assert!(view.points.is_empty(), "{} should be empty", view.name);
    }
}

#[test]
fn grouping_is_complete_and_sums_are_preserved() {
    let rows = vec![
        measurement("a", "t1", "observed_action", 1, 1.0, 1.0),
        measurement("a", "t1", "observed_action", 1, 2.0, 2.0),
        measurement("a", "t1", "observed_action", 2, 4.0, 2.0),
        measurement("b", "t1", "observed_action", 1, 8.0, 0.0),
        measurement("a", "t1", "observed_outcome", 1, 16.0, 1.0),
        measurement("all", "t1", "observed_action", 1, 32.0, 1.0),
        measurement("a", "t2", "observed_action", 1, 64.0, 1.0),
    ];
    let selected: Vec<&MeasurementRow> = rows.iter().filter(|r| r.theme == "t1").collect();
    let keys: HashSet<_> = selected.iter().map(|r| r.grouping_key()).collect();
    let expected_total: f64 = selected.iter().map(|r| r.value).sum();

    let table = MeasurementTable::new(rows.clone()).expect("table");
    let ordered = AudienceOrder::new(["b", "a"]).expect("order").apply(&table).expect("ordered");
    let agg = aggregate(&ordered, "weekly", "t1");

    assert_eq!(agg.len(), keys.len());
    let produced: HashSet<_> = agg.rows.iter().map(|r| r.grouping_key()).collect();
    assert_eq!(produced, keys);
    let total: f64 = agg.rows.iter().map(|r| r.value).sum();
    assert_eq!(total, expected_total);

    let merged = agg
        .rows
        .iter()
        .find(|r| r.audience == "a" && r.timestep == Timestep::Integer(1) && r.variable == "observed_action")
        .expect("merged row");
    assert_eq!(merged.value, 3.0);
    assert_eq!(merged.se, 5f64.sqrt());
}

#[test]
fn audience_order_drives_chart_order_and_must_be_complete() {
    let file = write_csv(&[
        "call_plan,visit,nbrx,theme_t1,segment,low,weekly,1,observed_action,1,1,1,1",
        "call_plan,visit,nbrx,theme_t1,segment,all,weekly,1,observed_action,3,3,3,1",
        "call_plan,visit,nbrx,theme_t1,segment,high,weekly,1,observed_action,2,2,2,1",
    ]);
    let config = SessionConfig {
        theme: Some("t1".into()),
        audience_order: Some(vec!["high".into(), "low".into()]),
        ..Default::default()
    };
    let mut session = Session::new(load_file(file.path()).expect("load"), config).expect("session");

    let view = session.chart_view("observed_action").expect("chart");
    let colors: Vec<&str> = view.points.iter().map(|p| p.color.as_str()).collect();
    assert_eq!(colors, vec!["high", "low", "all"]);

    session
        .set_audience_order(vec!["low".into(), "high".into()])
        .expect("reorder");
    let view = session.chart_view("observed_action").expect("chart");
    let colors: Vec<&str> = view.points.iter().map(|p| p.color.as_str()).collect();
    assert_eq!(colors, vec!["low", "high", "all"]);

    assert!(session.set_audience_order(vec!["low".into()]).is_err());
}

#[test]
fn audience_name_selection_scopes_incrementality_charts() {
    let file = write_csv(&[
        "call_plan,visit,nbrx,all,segment,a,weekly,1,pct_incremental_predicted_action,0.1,0,0.2,0.5",
        "call_plan,visit,nbrx,all,primary care,a,weekly,1,pct_incremental_predicted_action,0.3,0,0.6,0.5",
    ]);
    let mut session = Session::new(load_file(file.path()).expect("load"), SessionConfig::default())
        .expect("session");
    assert_eq!(session.options().audience_names, vec!["Segment", "Primary Care"]);

    let view = session
        .chart_view("pct_incremental_predicted_action")
        .expect("chart");
    assert_eq!(view.points.len(), 1);
    assert_eq!(view.points[0].y, 0.1);
    assert_eq!(view.points[0].error_y, Some(0.5));
    assert_eq!(view.points[0].facet_row.as_deref(), Some("nbrx"));

    session.select_audience_name("Primary Care");
    let view = session
        .chart_view("pct_incremental_predicted_action")
        .expect("chart");
    assert_eq!(view.points.len(), 1);
    assert_eq!(view.points[0].y, 0.3);
}

#[test]
fn snapshots_survive_later_changes() {
    let rows = vec![
        measurement("a", "t1", "observed_action", 1, 1.0, 1.0),
        measurement("a", "t2", "observed_action", 1, 2.0, 1.0),
    ];
    let mut session = Session::new(
        MeasurementTable::new(rows).expect("table"),
        SessionConfig {
            theme: Some("t1".into()),
            ..Default::default()
        },
    )
    .expect("session");

    let snapshot = session.aggregated();
    session.select_theme("t2");

    let chain = FilterChain::new(vec![Predicate::equals(Field::Audience, "a")]);
    assert_eq!(select(&snapshot, &chain)[0].value, 1.0);
    assert_eq!(select(&session.aggregated(), &chain)[0].value, 2.0);
}

#[test]
fn integral_float_timesteps_collapse_with_integers() {
    let file = write_csv(&[
        "call_plan,visit,nbrx,theme_t1,segment,x,weekly,1,observed_action,10,8,12,3",
        "call_plan,visit,nbrx,theme_t1,segment,x,weekly,1.0,observed_action,5,4,6,4",
    ]);
    let table = load_file(file.path()).expect("load");
    let ordered = AudienceOrder::new(["x"]).expect("order").apply(&table).expect("ordered");
    let agg = aggregate(&ordered, "weekly", "t1");

    assert_eq!(agg.len(), 1);
    assert_eq!(agg.rows[0].value, 15.0);
    assert_eq!(agg.rows[0].se, 5.0);
    assert_eq!(agg.rows[0].timestep.to_string(), "1");

    let chain = FilterChain::new(vec![Predicate::equals(Field::Timestep, "1")]);
    assert_eq!(select(&agg, &chain).len(), 1);
}
