use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use env_logger::Env;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use load_driver::config::db_path;
use load_driver::constants::*;
use load_driver::generator::{Generator, KeyTemplate};
use load_driver::query::{run_queries, QueryConfig};
use load_driver::report::format_queries;
use load_driver::submit::Submitter;
use load_driver::{Ident, Store};

const NAME: &str = "QUERIES";

/// Timed point lookups of the latest active value for sampled key pairs.
#[derive(Parser, Debug)]
struct Args {
  /// Database file. Falls back to $LOAD_DRIVER_DB, then a scratch directory.
  #[arg(long)]
  db: Option<PathBuf>,

  #[arg(long, default_value = FACT_TABLE)]
  table: String,

  /// Fill the table with this many generated rows before querying.
  #[arg(long)]
  populate: Option<usize>,

  #[arg(long, default_value_t = QUERY_NUM)]
  queries: usize,

  #[arg(long, default_value_t = QUERY_START_MAX_ROW)]
  start_max_row: u64,

  /// Largest row id ever sampled.
  #[arg(long, default_value_t = (BATCH_NUM * BATCH_SIZE) as u64)]
  row_ceiling: u64,

  #[arg(long, default_value_t = 0)]
  seed: u64,
}

fn main() -> anyhow::Result<()> {
  env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
  let args = Args::parse();

  let tmp_dir = tempfile::TempDir::new()?;
  let explicit = db_path(args.db);
  if explicit.is_none() && args.populate.is_none() {
    bail!("a scratch database is empty; pass --db or --populate");
  }
  let fname = explicit.unwrap_or_else(|| tmp_dir.path().join("queries.sqlite"));
  println!("DB file: {fname:?}");

  let mut store = Store::open(&fname).with_context(|| format!("opening {fname:?}"))?;
  println!("Sqlite v{:?}", store.sqlite_version()?);

  let table = Ident::new(args.table)?;
  let now = Utc::now();
  let template = KeyTemplate::default();

  if let Some(rows) = args.populate {
    store.create_fact_table(&table)?;
    let mut generator = Generator::new(args.seed, now).with_template(template.clone());
    let report = Submitter::new(table.clone(), BATCH_SIZE).submit(&mut store, generator.records(0, rows))?;
    println!(
      "[{NAME}]\n\tInserted {count} rows in {elapsed:?}",
      count = report.committed,
      elapsed = report.elapsed,
    );
    store.create_indexes(&table)?;
  }

  if !store.table_exists(&table)? {
    bail!("table {table} does not exist");
  }
  info!("{table} holds {} rows", store.count(&table)?);

  let config = QueryConfig {
    queries: args.queries,
    start_max_row: args.start_max_row,
    row_ceiling: args.row_ceiling,
  };
  let mut rng = StdRng::seed_from_u64(args.seed);
  let report = run_queries(&store, &table, &template, &config, &mut rng, now)?;

  println!("{}", format_queries(NAME, &report));

  return Ok(());
}
