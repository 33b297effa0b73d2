use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use clap::{Parser, ValueEnum};
use serde::Serialize;

use mabi_measure::config::SessionConfig;
use mabi_measure::data::aggregate::AggregatedTable;
use mabi_measure::data::loader::load_file;
use mabi_measure::data::model::{AudienceRank, RankedRow};
use mabi_measure::state::Session;

#[derive(Parser, Debug)]
#[command(
    name = "mabi-measure",
    about = "Aggregate suggestion measurements and extract chart views"
)]
struct Cli {
    /// Measurement table (.csv, .json, .parquet).
    input: PathBuf,
    /// JSON session file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    timestep_type: Option<String>,
    #[arg(long)]
    theme: Option<String>,
    /// Audience name in display form, e.g. "Primary Care".
    #[arg(long)]
    audience_name: Option<String>,
    /// Comma-separated audience permutation (sentinel excluded).
    #[arg(long, value_delimiter = ',')]
    audience_order: Option<Vec<String>>,
    #[arg(long, value_enum, default_value_t = View::Charts)]
    view: View,
    /// Only emit this chart (with `--view charts`).
    #[arg(long)]
    chart: Option<String>,
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum View {
    Aggregated,
    Charts,
    Options,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Csv,
    /// Boxed text table, aggregated view only.
    Table,
}

impl Cli {
    fn session_config(&self) -> Result<SessionConfig> {
        let file = match &self.config {
            Some(path) => SessionConfig::load(path)?,
            None => SessionConfig::default(),
        };
        Ok(file.merge(SessionConfig {
            audience_order: self.audience_order.clone(),
            timestep_type: self.timestep_type.clone(),
            theme: self.theme.clone(),
            audience_name: self.audience_name.clone(),
            charts: Vec::new(),
        }))
    }
}

/// Flat row for CSV output.
#[derive(Serialize)]
struct AggregatedRecord<'a> {
    suggestion_type: &'a str,
    action_type: &'a str,
    outcome_type: &'a str,
    theme: &'a str,
    audience_name: &'a str,
    audience: &'a str,
    audience_rank: String,
    timestep_type: &'a str,
    timestep: String,
    variable: &'a str,
    value: f64,
    lower_ci: f64,
    upper_ci: f64,
    se: f64,
}

fn rank_label(rank: AudienceRank) -> String {
    match rank {
        AudienceRank::Position(p) => p.to_string(),
        AudienceRank::All => "all".to_string(),
    }
}

fn aggregated_batch(table: &AggregatedTable) -> Result<RecordBatch> {
    let rows = &table.rows;
    let text = |f: fn(&RankedRow) -> String| -> ArrayRef {
        Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
    };
    let number = |f: fn(&RankedRow) -> f64| -> ArrayRef {
        Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
    };

    let batch = RecordBatch::try_from_iter(vec![
        ("outcome_type", text(|r| r.outcome_type.clone())),
        ("audience_name", text(|r| r.audience_name.clone())),
        ("audience", text(|r| r.audience.clone())),
        ("rank", text(|r| rank_label(r.audience_rank))),
        ("timestep", text(|r| r.timestep.to_string())),
        ("variable", text(|r| r.variable.clone())),
        ("value", number(|r| r.value)),
        ("lower_ci", number(|r| r.lower_ci)),
        ("upper_ci", number(|r| r.upper_ci)),
        ("se", number(|r| r.se)),
    ])
    .context("building aggregated batch")?;
    Ok(batch)
}

fn write_aggregated_csv(table: &AggregatedTable, out: impl Write) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for r in &table.rows {
        writer.serialize(AggregatedRecord {
            suggestion_type: &r.suggestion_type,
            action_type: &r.action_type,
            outcome_type: &r.outcome_type,
            theme: &r.theme,
            audience_name: &r.audience_name,
            audience: &r.audience,
            audience_rank: rank_label(r.audience_rank),
            timestep_type: &r.timestep_type,
            timestep: r.timestep.to_string(),
            variable: &r.variable,
            value: r.value,
            lower_ci: r.lower_ci,
            upper_ci: r.upper_ci,
            se: r.se,
        })?;
    }
    writer.flush().context("writing CSV")?;
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.session_config()?;
    let table = load_file(&cli.input)
        .with_context(|| format!("loading {}", cli.input.display()))?;
    let session = Session::new(table, config)?;
    log::info!("selection: {:?}", session.selection());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match (cli.view, cli.format) {
        (View::Aggregated, Format::Csv) => write_aggregated_csv(&session.aggregated(), &mut out)?,
        (View::Aggregated, Format::Table) => {
            let batch = aggregated_batch(&session.aggregated())?;
            write!(out, "{}", pretty_format_batches(&[batch])?)?
        }
        (View::Aggregated, Format::Json) => {
            serde_json::to_writer_pretty(&mut out, &*session.aggregated())?
        }
        (View::Options, Format::Json) => serde_json::to_writer_pretty(&mut out, session.options())?,
        (View::Charts, Format::Json) => match &cli.chart {
            Some(name) => {
                let view = session
                    .chart_view(name)
                    .with_context(|| format!("no chart named '{name}'"))?;
                serde_json::to_writer_pretty(&mut out, &view)?
            }
            None => serde_json::to_writer_pretty(&mut out, &session.chart_views())?,
        },
        (view, format) => bail!("{view:?} view is only available as JSON, not {format:?}"),
    }
    writeln!(out)?;
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        log::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
