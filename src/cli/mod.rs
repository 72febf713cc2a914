//! tabframe CLI
//!
//! Commands run the encoding pipeline on the generated house-price table.

use clap::{Parser, Subcommand};
use colored::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::config::FeatureEncoderConfig;
use crate::data::{materialize, DataLoader, Dataset, MaterializeConfig, TaskType};
use crate::datasets::house_prices;
use crate::nn::{FeatureEncoder, Module};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "tabframe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stype-wise feature encoding for tabular data")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print column statistics of the generated table as JSON
    Stats {
        /// Number of rows to generate
        #[arg(short, long, default_value = "1000")]
        rows: usize,

        /// Random seed
        #[arg(short, long, default_value = "0")]
        seed: u64,

        /// Task type (regression, binary, multiclass)
        #[arg(long, default_value = "regression")]
        task: String,
    },

    /// Encode the generated table batch by batch
    Encode {
        /// Number of rows to generate
        #[arg(short, long, default_value = "1000")]
        rows: usize,

        /// Random seed for data, parameters and shuffling
        #[arg(short, long, default_value = "0")]
        seed: u64,

        /// Output channels per column
        #[arg(short, long, default_value = "256")]
        channels: usize,

        /// Rows per batch
        #[arg(short, long, default_value = "512")]
        batch_size: usize,

        /// Task type (regression, binary, multiclass)
        #[arg(long, default_value = "regression")]
        task: String,

        /// Encoder configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Shuffle rows before batching
        #[arg(long)]
        shuffle: bool,
    },

    /// Print the default encoder configuration as JSON
    Config,
}

pub fn parse_task(task: &str) -> anyhow::Result<TaskType> {
    Ok(match task {
        "regression" => TaskType::Regression,
        "binary" | "classification" => TaskType::BinaryClassification,
        "multiclass" => TaskType::MulticlassClassification,
        _ => anyhow::bail!("Invalid task type: {}", task),
    })
}

fn load_dataset(rows: usize, seed: u64, task: TaskType) -> anyhow::Result<Dataset> {
    let (df, col_to_stype) = house_prices(rows, seed, task)?;
    let target = match task {
        TaskType::Regression => "price",
        _ => "price_band",
    };
    Ok(materialize(&df, &col_to_stype, Some(target), &MaterializeConfig::default())?)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_stats(rows: usize, seed: u64, task: &str) -> anyhow::Result<()> {
    let task = parse_task(task)?;
    let dataset = load_dataset(rows, seed, task)?;
    info!(rows = dataset.num_rows(), ?task, "Computed column statistics");

    let ordered: BTreeMap<_, _> = dataset.col_stats.iter().collect();
    println!("{}", serde_json::to_string_pretty(&ordered)?);
    Ok(())
}

pub fn cmd_encode(
    rows: usize,
    seed: u64,
    channels: usize,
    batch_size: usize,
    task: &str,
    config_path: Option<&Path>,
    shuffle: bool,
) -> anyhow::Result<()> {
    section("Encode");
    let task = parse_task(task)?;

    step_run("Materializing");
    let start = Instant::now();
    let dataset = load_dataset(rows, seed, task)?;
    let (train, val, test) = dataset.split(0.8, 0.1)?;
    step_done(&format!(
        "{} train / {} val / {} test rows in {:?}",
        train.num_rows(),
        val.num_rows(),
        test.num_rows(),
        start.elapsed()
    ));

    let config = match config_path {
        Some(path) => FeatureEncoderConfig::from_json_file(path)?,
        None => FeatureEncoderConfig::default()
            .with_out_channels(channels)
            .with_seed(seed),
    };

    step_run("Building encoder");
    let mut encoder = config.build(&dataset.col_stats, train.tensor_frame.col_names_dict.clone())?;
    step_done(&format!("{} parameters", encoder.num_parameters()));

    println!();
    println!("  {:<14} {}", muted("Task"), format!("{:?}", task).white());
    println!("  {:<14} {}", muted("Out channels"), encoder.out_channels().to_string().white());
    println!("  {:<14} {}", muted("Head width"), dataset.output_channels().to_string().white());
    for (stype, names) in encoder.col_names_dict() {
        println!("  {:<14} {}", muted(stype.as_str()), names.join(", ").white());
    }

    section("Batches");
    println!(
        "  {:<6} {:<18} {:>10} {:>10}",
        muted("Batch"),
        muted("Shape"),
        muted("Mean"),
        muted("Std")
    );
    println!("  {}", dim(&"─".repeat(48)));

    let mut loader = DataLoader::new(&train.tensor_frame, batch_size)?
        .with_shuffle(shuffle)
        .with_seed(seed);
    let start = Instant::now();
    for (i, batch) in loader.iter().enumerate() {
        let batch = batch?;
        let (x, _) = encoder.forward(&batch)?;
        let mean = x.mean().unwrap_or(0.0);
        let std = x.std(0.0);
        println!(
            "  {:<6} {:<18} {:>10.4} {:>10.4}",
            i,
            format!("{:?}", x.shape()),
            mean,
            std
        );
    }
    info!(batches = loader.len(), elapsed = ?start.elapsed(), "Encoded training split");

    println!();
    Ok(())
}

pub fn cmd_config() -> anyhow::Result<()> {
    println!("{}", FeatureEncoderConfig::default().to_json()?);
    Ok(())
}
