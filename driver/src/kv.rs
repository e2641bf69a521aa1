//! One-by-one key/value insert and select latency, swept over table sizes.

use std::time::{Duration, Instant};

use log::info;
use rand::Rng;

use crate::constants::{KV_LOOPS, KV_ROWS, KV_TEST_NAME};
use crate::error::{Error, Result};
use crate::store::Store;

pub const KV_SETUP_QUERY: &str = r#"
    DROP TABLE IF EXISTS kv_test;
    CREATE TABLE kv_test (key TEXT NOT NULL, value TEXT NOT NULL);
    CREATE INDEX kv_test_key_idx ON kv_test (key);
    CREATE TABLE IF NOT EXISTS kv_results (
      test_name  TEXT NOT NULL,
      test_rows  INTEGER NOT NULL,
      ins_secs   REAL NOT NULL,
      sel_secs   REAL NOT NULL
    );
"#;

pub const KV_INSERT_QUERY: &str = "INSERT INTO kv_test VALUES ($1, $2)";
pub const KV_SELECT_QUERY: &str = "SELECT key, value FROM kv_test WHERE key = $1";

#[derive(Debug, Clone)]
pub struct KvConfig {
  pub test_name: String,
  pub rows: Vec<usize>,
  pub loops: usize,
}

impl Default for KvConfig {
  fn default() -> Self {
    Self {
      test_name: KV_TEST_NAME.to_string(),
      rows: KV_ROWS.to_vec(),
      loops: KV_LOOPS,
    }
  }
}

/// App-side totals for one row count, averaged over the loops.
#[derive(Debug, Clone, PartialEq)]
pub struct KvResult {
  pub rows: usize,
  pub insert: Duration,
  pub select: Duration,
}

impl KvResult {
  pub fn insert_mean(&self) -> Duration {
    per_row(self.insert, self.rows)
  }

  pub fn select_mean(&self) -> Duration {
    per_row(self.select, self.rows)
  }
}

fn per_row(total: Duration, rows: usize) -> Duration {
  match u32::try_from(rows) {
    Ok(0) => Duration::ZERO,
    Ok(n) => total / n,
    Err(_) => total.div_f64(rows as f64),
  }
}

pub fn run_kv<R: Rng>(store: &Store, config: &KvConfig, rng: &mut R) -> Result<Vec<KvResult>> {
  let loops = match u32::try_from(config.loops) {
    Ok(0) => return Err(Error::InvalidConfig("kv loops must be at least 1".to_string())),
    Ok(loops) => loops,
    Err(_) => {
      return Err(Error::InvalidConfig(format!(
        "kv loops must fit in 32 bits, got {}",
        config.loops
      )))
    }
  };

  store.connection().execute_batch(KV_SETUP_QUERY)?;
  store.connection().execute(
    "DELETE FROM kv_results WHERE test_name = $1",
    [&config.test_name],
  )?;
  info!("Cleared results for previous runs of {}", config.test_name);

  let mut results = Vec::with_capacity(config.rows.len());
  for &rows in &config.rows {
    info!("*** testing with ROWS = {rows} ***");
    let keys: Vec<String> = (0..rows).map(|_| rng.gen::<f64>().to_string()).collect();

    let mut insert = Duration::ZERO;
    let mut select = Duration::ZERO;
    for lp in 0..config.loops {
      info!("* loop {lp} *");
      let conn = store.connection();
      conn.execute("DELETE FROM kv_test", ())?;

      {
        let mut stmt = conn.prepare_cached(KV_INSERT_QUERY)?;
        let start = Instant::now();
        for key in &keys {
          stmt.execute((key, key))?;
        }
        insert += start.elapsed();
      }

      conn.execute_batch("ANALYZE kv_test")?;

      {
        let mut stmt = conn.prepare_cached(KV_SELECT_QUERY)?;
        let start = Instant::now();
        for key in &keys {
          let mut found = stmt.query([key])?;
          found.next()?;
        }
        select += start.elapsed();
      }
    }

    let result = KvResult {
      rows,
      insert: insert / loops,
      select: select / loops,
    };
    store.connection().execute(
      "INSERT INTO kv_results VALUES ($1, $2, $3, $4)",
      (
        &config.test_name,
        rows as i64,
        result.insert.as_secs_f64(),
        result.select.as_secs_f64(),
      ),
    )?;
    info!(
      "Totals for {rows} rows: ins total {:?}, sel total {:?}",
      result.insert, result.select
    );
    results.push(result);
  }

  Ok(results)
}
