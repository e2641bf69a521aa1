//! Batched, transactional bulk insertion.
//!
//! Each batch is one transaction around one bulk insert. What happens when a
//! batch fails is up to the [`FailurePolicy`]: the default skips the batch
//! (at-most-once, no retry), `Abort` hands the error back to the caller.

use std::time::{Duration, Instant};

use log::{info, warn};
use rusqlite::{params_from_iter, Transaction};

use crate::constants::{BIND_LIMIT, LOG_EVERY};
use crate::error::{Error, Result};
use crate::generator::Batches;
use crate::ident::Ident;
use crate::record::{bulk_insert_sql, Record, RECORD_COLUMNS};
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
  #[default]
  Skip,
  Abort,
}

#[derive(Debug)]
pub struct BatchFailure {
  pub index: usize,
  pub rows: usize,
  pub error: rusqlite::Error,
}

#[derive(Debug, Default)]
pub struct SubmitReport {
  pub batches: usize,
  pub attempted: usize,
  pub committed: usize,
  pub failures: Vec<BatchFailure>,
  pub elapsed: Duration,
}

impl SubmitReport {
  pub fn rows_per_sec(&self) -> f64 {
    let secs = self.elapsed.as_secs_f64();
    if secs <= 0.0 {
      return 0.0;
    }
    self.attempted as f64 / secs
  }
}

pub struct Submitter {
  table: Ident,
  batch_size: usize,
  policy: FailurePolicy,
}

impl Submitter {
  pub fn new(table: Ident, batch_size: usize) -> Self {
    Self {
      table,
      batch_size: batch_size.max(1),
      policy: FailurePolicy::default(),
    }
  }

  pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn table(&self) -> &Ident {
    &self.table
  }

  /// Chunks `records` into batches and submits each one in its own
  /// transaction.
  pub fn submit<I>(&self, store: &mut Store, records: I) -> Result<SubmitReport>
  where
    I: IntoIterator<Item = Record>,
  {
    let start = Instant::now();
    let mut report = SubmitReport::default();

    for (index, batch) in Batches::new(records.into_iter(), self.batch_size).enumerate() {
      let rows = batch.len();
      report.batches += 1;
      report.attempted += rows;

      match store.transaction(|tx| Ok(insert_batch(tx, &self.table, &batch)?)) {
        Ok(inserted) => {
          report.committed += inserted;
          if index % LOG_EVERY == 0 {
            info!("Batch {} has been inserted with {rows} tuples.", index + 1);
          }
        }
        Err(Error::Sqlite(error)) => match self.policy {
          FailurePolicy::Skip => {
            warn!("Batch {} rolled back, {rows} tuples skipped: {error}", index + 1);
            report.failures.push(BatchFailure { index, rows, error });
          }
          FailurePolicy::Abort => {
            return Err(Error::Batch {
              index,
              source: error,
            });
          }
        },
        Err(err) => return Err(err),
      }
    }

    report.elapsed = start.elapsed();
    info!(
      "{:?} taken to insert {} batches ({} tuples) into {}",
      report.elapsed, report.batches, report.attempted, self.table
    );
    Ok(report)
  }
}

/// Inserts `records` with multi-row statements inside `tx`. Returns the number
/// of rows written.
///
/// A single statement is used unless the batch exceeds SQLite's bind limit, in
/// which case it is split; the caller's transaction keeps the batch atomic.
pub fn insert_batch(
  tx: &Transaction<'_>,
  table: &Ident,
  records: &[Record],
) -> rusqlite::Result<usize> {
  let max_rows = BIND_LIMIT / RECORD_COLUMNS;
  let mut inserted = 0;
  for chunk in records.chunks(max_rows) {
    let mut stmt = tx.prepare_cached(&bulk_insert_sql(table.as_str(), chunk.len()))?;
    let values = chunk.iter().flat_map(Record::to_values);
    inserted += stmt.execute(params_from_iter(values))?;
  }
  Ok(inserted)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::generator::Generator;
  use chrono::{DateTime, Utc};

  fn anchor() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
  }

  fn setup() -> (Store, Ident) {
    let store = Store::open_in_memory().unwrap();
    let table = Ident::new("facts").unwrap();
    store.create_fact_table(&table).unwrap();
    (store, table)
  }

  #[test]
  fn submits_all_batches() {
    let (mut store, table) = setup();
    let mut generator = Generator::new(1, anchor());

    let report = Submitter::new(table.clone(), 10)
      .submit(&mut store, generator.records(0, 35))
      .unwrap();

    assert_eq!(report.batches, 4);
    assert_eq!(report.attempted, 35);
    assert_eq!(report.committed, 35);
    assert!(report.failures.is_empty());
    assert_eq!(store.count(&table).unwrap(), 35);
  }

  #[test]
  fn empty_input_is_a_no_op() {
    let (mut store, table) = setup();
    let report = Submitter::new(table.clone(), 10)
      .submit(&mut store, Vec::new())
      .unwrap();
    assert_eq!(report.batches, 0);
    assert_eq!(store.count(&table).unwrap(), 0);
  }

  #[test]
  fn oversized_batch_is_split_across_statements() {
    let (mut store, table) = setup();
    let mut generator = Generator::new(2, anchor());
    let rows = BIND_LIMIT / RECORD_COLUMNS + 10;

    let report = Submitter::new(table.clone(), rows)
      .submit(&mut store, generator.records(0, rows))
      .unwrap();

    assert_eq!(report.batches, 1);
    assert_eq!(report.committed, rows);
    assert_eq!(store.count(&table).unwrap(), rows as i64);
  }
}
