use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "generate-sample", about = "Write a synthetic measurement table")]
struct Args {
    /// Output path; `.parquet` writes Parquet, anything else CSV.
    #[arg(long, default_value = "sample_measurements.csv")]
    out: PathBuf,
}

/// One raw export row, before theme extraction.
#[derive(Debug, Clone, Serialize)]
struct RawRow {
    suggestion_type: String,
    action_type: String,
    outcome_type: String,
    theme_raw: String,
    audience_name: String,
    audience: String,
    timestep_type: String,
    timestep: i64,
    variable: String,
    value: f64,
    lower_ci: f64,
    upper_ci: f64,
    se: f64,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

const VARIABLES: [&str; 14] = [
    "observed_suggestion",
    "observed_action",
    "observed_outcome",
    "pct_incremental_predicted_action",
    "pct_incremental_predicted_outcome",
    "counterfactual_action",
    "predicted_action",
    "incremental_action",
    "counterfactual_outcome",
    "predicted_outcome",
    "incremental_outcome",
    "quality",
    "action_performance_index",
    "outcome_performance_index",
];

fn generate(rng: &mut SimpleRng) -> Vec<RawRow> {
    let themes = ["all", "theme_access", "theme_efficacy"];
    let audiences = [
        ("segment", "high_value"),
        ("segment", "mid_value"),
        ("segment", "low_value"),
        ("segment", "all"),
        ("primary care", "new_writer"),
        ("primary care", "all"),
    ];
    let timesteps = [("weekly", 8), ("monthly", 3)];

    let mut rows = Vec::new();
    for theme in themes {
        for (audience_name, audience) in audiences {
            for (timestep_type, steps) in timesteps {
                for timestep in 1..=steps {
                    for outcome_type in ["nbrx", "trx"] {
                        for variable in VARIABLES {
                            // Two independent partitions per logical measurement.
                            for _ in 0..2 {
                                let value = rng.uniform(5.0, 50.0);
                                let se = rng.uniform(0.5, 4.0);
                                rows.push(RawRow {
                                    suggestion_type: "call_plan".into(),
                                    action_type: "visit".into(),
                                    outcome_type: outcome_type.into(),
                                    theme_raw: theme.into(),
                                    audience_name: audience_name.into(),
                                    audience: audience.into(),
                                    timestep_type: timestep_type.into(),
                                    timestep,
                                    variable: variable.into(),
                                    value,
                                    lower_ci: value - 1.96 * se,
                                    upper_ci: value + 1.96 * se,
                                    se,
                                });
                            }
                        }
                    }
                }
            }
        }
    }
    rows
}

fn write_csv(rows: &[RawRow], args: &Args) -> Result<()> {
    let mut writer = csv::Writer::from_path(&args.out).context("creating CSV output")?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parquet(rows: &[RawRow], args: &Args) -> Result<()> {
    let text = |f: fn(&RawRow) -> &str| -> ArrayRef {
        Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
    };
    let number = |f: fn(&RawRow) -> f64| -> ArrayRef {
        Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
    };

    let timestep: ArrayRef = Arc::new(Int64Array::from(
        rows.iter().map(|r| r.timestep).collect::<Vec<_>>(),
    ));

    let columns: Vec<(&str, ArrayRef)> = vec![
        ("suggestion_type", text(|r| r.suggestion_type.as_str())),
        ("action_type", text(|r| r.action_type.as_str())),
        ("outcome_type", text(|r| r.outcome_type.as_str())),
        ("theme_raw", text(|r| r.theme_raw.as_str())),
        ("audience_name", text(|r| r.audience_name.as_str())),
        ("audience", text(|r| r.audience.as_str())),
        ("timestep_type", text(|r| r.timestep_type.as_str())),
        ("timestep", timestep),
        ("variable", text(|r| r.variable.as_str())),
        ("value", number(|r| r.value)),
        ("lower_ci", number(|r| r.lower_ci)),
        ("upper_ci", number(|r| r.upper_ci)),
        ("se", number(|r| r.se)),
    ];

    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|(name, col)| Field::new(*name, col.data_type().clone(), false))
            .collect::<Vec<_>>(),
    ));
    let batch = RecordBatch::try_new(
        schema.clone(),
        columns.into_iter().map(|(_, col)| col).collect(),
    )
    .context("building record batch")?;

    let file = std::fs::File::create(&args.out).context("creating parquet output")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut rng = SimpleRng::new(42);
    let rows = generate(&mut rng);

    let is_parquet = args
        .out
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("parquet"));
    if is_parquet {
        write_parquet(&rows, &args)?;
    } else {
        write_csv(&rows, &args)?;
    }

    log::info!("wrote {} measurement rows to {}", rows.len(), args.out.display());
    println!("Wrote {} measurement rows to {}", rows.len(), args.out.display());
    Ok(())
}
