use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use env_logger::Env;

use load_driver::config::db_path;
use load_driver::constants::*;
use load_driver::job::{default_phases, Job, JobConfig, Pacing, Phase};
use load_driver::report::format_phases;
use load_driver::submit::FailurePolicy;
use load_driver::{Ident, Store};

const NAME: &str = "DB_JOB";

/// Insert, update and retention maintenance against the fact table.
#[derive(Parser, Debug)]
struct Args {
  /// Database file. Falls back to $LOAD_DRIVER_DB, then a scratch directory.
  #[arg(long)]
  db: Option<PathBuf>,

  #[arg(long, default_value = FACT_TABLE)]
  table: String,

  #[arg(long, default_value_t = BATCH_NUM)]
  batch_num: usize,

  #[arg(long, default_value_t = BATCH_SIZE)]
  batch_size: usize,

  #[arg(long, default_value_t = UPDATE_ROWS)]
  update_rows: usize,

  /// Comma separated phases, e.g. `insert,update,swap:3,purge:3`.
  #[arg(long, value_delimiter = ',')]
  phases: Vec<Phase>,

  /// Stop at the first failed batch instead of skipping it.
  #[arg(long)]
  abort_on_failure: bool,

  /// Pause between phases, in milliseconds.
  #[arg(long)]
  settle_ms: Option<u64>,

  #[arg(long, default_value_t = 0)]
  seed: u64,
}

fn main() -> anyhow::Result<()> {
  env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
  let args = Args::parse();

  let tmp_dir = tempfile::TempDir::new()?;
  let fname = db_path(args.db).unwrap_or_else(|| tmp_dir.path().join("db_job.sqlite"));
  println!("DB file: {fname:?}");

  let mut store = Store::open(&fname).with_context(|| format!("opening {fname:?}"))?;
  println!("Sqlite v{:?}", store.sqlite_version()?);

  let config = JobConfig {
    batch_num: args.batch_num,
    batch_size: args.batch_size,
    update_rows: args.update_rows,
    policy: if args.abort_on_failure {
      FailurePolicy::Abort
    } else {
      FailurePolicy::Skip
    },
    pacing: match args.settle_ms {
      Some(ms) => Pacing::Settle(Duration::from_millis(ms)),
      None => Pacing::None,
    },
    seed: args.seed,
    ..JobConfig::new(Ident::new(args.table)?)
  };

  let phases = if args.phases.is_empty() {
    default_phases()
  } else {
    args.phases
  };

  let now = Utc::now();
  let mut job = Job::new(config, now)?;
  let reports = job.run(&mut store, &phases, now, |report| {
    println!("[{NAME}] {} done in {:?}", report.phase, report.elapsed);
  })?;

  println!("{}", format_phases(NAME, &reports));

  return Ok(());
}
