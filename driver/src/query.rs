use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::Rng;
use rusqlite::OptionalExtension;

use crate::constants::{BATCH_NUM, BATCH_SIZE, QUERY_NUM, QUERY_START_MAX_ROW};
use crate::error::Result;
use crate::generator::KeyTemplate;
use crate::ident::Ident;
use crate::record::Payload;
use crate::store::Store;

/// Value of the most recent active, unexpired row for a key pair.
pub fn lookup(
  store: &Store,
  table: &Ident,
  key_a: &str,
  key_b: &str,
  now: DateTime<Utc>,
) -> Result<Option<Payload>> {
  let mut stmt = store.connection().prepare_cached(&format!(
    "SELECT value FROM {table}
     WHERE feature_def_ref = ?1 AND entity_id = ?2
       AND active = 1
       AND expire > ?3
     ORDER BY timestamp DESC
     LIMIT 1"
  ))?;
  let value = stmt
    .query_row((key_a, key_b, now.timestamp()), |row| row.get(0))
    .optional()?;
  Ok(value)
}

#[derive(Debug, Clone)]
pub struct QuerySample {
  pub row: u64,
  pub value: Option<Payload>,
  pub elapsed: Duration,
}

/// Looks up the keys of `row` and times it.
pub fn timed_lookup(
  store: &Store,
  table: &Ident,
  template: &KeyTemplate,
  row: u64,
  now: DateTime<Utc>,
) -> Result<QuerySample> {
  let (key_a, key_b) = template.keys_for(row);
  let start = Instant::now();
  let value = lookup(store, table, &key_a, &key_b, now)?;
  let elapsed = start.elapsed();
  debug!("{elapsed:?} taken for query of row {row}");
  Ok(QuerySample {
    row,
    value,
    elapsed,
  })
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
  pub queries: usize,
  /// Upper bound (exclusive) of the first sampled row id.
  pub start_max_row: u64,
  /// The sampled range never grows past this.
  pub row_ceiling: u64,
}

impl Default for QueryConfig {
  fn default() -> Self {
    Self {
      queries: QUERY_NUM,
      start_max_row: QUERY_START_MAX_ROW,
      row_ceiling: (BATCH_NUM * BATCH_SIZE) as u64,
    }
  }
}

/// Sampling range for query `idx`: the previous range scaled by
/// `1 + idx / 10`, saturating and clamped to `ceiling`.
pub fn next_max_row(current: u64, idx: usize, ceiling: u64) -> u64 {
  current
    .saturating_mul(1 + (idx / 10) as u64)
    .min(ceiling)
}

#[derive(Debug, Default)]
pub struct QueryReport {
  pub samples: Vec<QuerySample>,
}

impl QueryReport {
  pub fn hits(&self) -> usize {
    self.samples.iter().filter(|s| s.value.is_some()).count()
  }

  pub fn total(&self) -> Duration {
    self.samples.iter().map(|s| s.elapsed).sum()
  }

  pub fn mean(&self) -> Duration {
    if self.samples.is_empty() {
      return Duration::ZERO;
    }
    self.total() / self.samples.len() as u32
  }

  pub fn max(&self) -> Duration {
    self
      .samples
      .iter()
      .map(|s| s.elapsed)
      .max()
      .unwrap_or_default()
  }
}

/// Issues `config.queries` lookups against row ids sampled from a growing
/// range starting at `[1, start_max_row)`.
pub fn run_queries<R: Rng>(
  store: &Store,
  table: &Ident,
  template: &KeyTemplate,
  config: &QueryConfig,
  rng: &mut R,
  now: DateTime<Utc>,
) -> Result<QueryReport> {
  let mut report = QueryReport::default();
  let mut max_row = config.start_max_row.min(config.row_ceiling);

  for idx in 0..config.queries {
    max_row = next_max_row(max_row, idx, config.row_ceiling);
    let row = if max_row > 1 {
      rng.gen_range(1..max_row)
    } else {
      1
    };
    report
      .samples
      .push(timed_lookup(store, table, template, row, now)?);
  }

  info!(
    "{} queries on {table}: {} hits, mean {:?}, max {:?}",
    report.samples.len(),
    report.hits(),
    report.mean(),
    report.max()
  );
  Ok(report)
}
