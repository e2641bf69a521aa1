use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use env_logger::Env;
use log::info;

use load_driver::config::db_path;
use load_driver::constants::*;
use load_driver::partition::{PartitionConfig, PartitionCycle};
use load_driver::report::format_day;
use load_driver::{Ident, Store};

const NAME: &str = "PARTITION";

/// Creates, fills and expires one day partition per simulated day.
#[derive(Parser, Debug)]
struct Args {
  /// Database file. Falls back to $LOAD_DRIVER_DB, then a scratch directory.
  #[arg(long)]
  db: Option<PathBuf>,

  #[arg(long, default_value = PARTITION_PARENT)]
  parent: String,

  /// First simulated day (YYYY-MM-DD). Defaults to today.
  #[arg(long)]
  start: Option<NaiveDate>,

  #[arg(long, default_value_t = PARTITION_TOTAL_DAYS)]
  days: u32,

  #[arg(long, default_value_t = PARTITION_RETENTION_DAYS)]
  retention_days: i64,

  #[arg(long, default_value_t = PARTITION_BATCH_NUM)]
  batch_num: usize,

  /// Entities per batch; each one yields a row per serving feature.
  #[arg(long, default_value_t = PARTITION_BATCH_SIZE)]
  batch_size: usize,

  #[arg(long, default_value_t = 0)]
  seed: u64,
}

fn first_day(start: Option<NaiveDate>) -> anyhow::Result<DateTime<Utc>> {
  let Some(day) = start else {
    return Ok(Utc::now());
  };
  let noon = day
    .and_hms_opt(12, 0, 0)
    .with_context(|| format!("invalid start day {day}"))?;
  return Ok(noon.and_utc());
}

fn main() -> anyhow::Result<()> {
  env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
  let args = Args::parse();

  let tmp_dir = tempfile::TempDir::new()?;
  let fname = db_path(args.db).unwrap_or_else(|| tmp_dir.path().join("partition.sqlite"));
  println!("DB file: {fname:?}");

  let mut store = Store::open(&fname).with_context(|| format!("opening {fname:?}"))?;
  println!("Sqlite v{:?}", store.sqlite_version()?);

  let config = PartitionConfig {
    total_days: args.days,
    retention_days: args.retention_days,
    batch_num: args.batch_num,
    batch_size: args.batch_size,
    seed: args.seed,
    ..PartitionConfig::new(Ident::new(args.parent)?, first_day(args.start)?)
  };
  info!(
    "Running {} days from {} keeping {} days",
    config.total_days,
    config.first_day.date_naive(),
    config.retention_days
  );

  let mut cycle = PartitionCycle::new(config)?;
  let reports = cycle.run(&mut store, |report| {
    println!("{}", format_day(NAME, report));
  })?;

  let rows: usize = reports.iter().map(|r| r.insert.committed).sum();
  let failed: usize = reports.iter().map(|r| r.insert.failures.len()).sum();
  let elapsed: std::time::Duration = reports.iter().map(|r| r.elapsed).sum();
  println!(
    "[{NAME}]\n\tInserted {rows} rows over {days} days ({failed} failed batches) in {elapsed:?}",
    days = reports.len(),
  );

  return Ok(());
}
