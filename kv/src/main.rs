use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use rand::rngs::StdRng;
use rand::SeedableRng;

use load_driver::config::db_path;
use load_driver::constants::*;
use load_driver::kv::{run_kv, KvConfig};
use load_driver::report::format_kv;
use load_driver::Store;

const NAME: &str = "KV";

/// One-by-one key/value insert and select latency over growing table sizes.
#[derive(Parser, Debug)]
struct Args {
  /// Database file. Falls back to $LOAD_DRIVER_DB, then a scratch directory.
  #[arg(long)]
  db: Option<PathBuf>,

  /// Label the results are stored under; earlier results with it are cleared.
  #[arg(long, default_value = KV_TEST_NAME)]
  test_name: String,

  /// Comma separated row counts.
  #[arg(long, value_delimiter = ',', default_values_t = KV_ROWS)]
  rows: Vec<usize>,

  #[arg(long, default_value_t = KV_LOOPS)]
  loops: usize,

  #[arg(long, default_value_t = 0)]
  seed: u64,
}

fn main() -> anyhow::Result<()> {
  env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
  let args = Args::parse();

  let tmp_dir = tempfile::TempDir::new()?;
  let fname = db_path(args.db).unwrap_or_else(|| tmp_dir.path().join("kv.sqlite"));
  println!("DB file: {fname:?}");

  let store = Store::open(&fname).with_context(|| format!("opening {fname:?}"))?;
  println!("Sqlite v{:?}", store.sqlite_version()?);

  let config = KvConfig {
    test_name: args.test_name,
    rows: args.rows,
    loops: args.loops,
  };
  let mut rng = StdRng::seed_from_u64(args.seed);
  let results = run_kv(&store, &config, &mut rng)?;

  println!("{}", format_kv(NAME, &results));

  return Ok(());
}
