use std::time::{Duration, Instant};

use log::info;
use rand::Rng;

use crate::constants::LOG_EVERY;
use crate::error::{Error, Result};
use crate::generator::Generator;
use crate::ident::Ident;
use crate::record::Record;
use crate::store::Store;
use crate::submit::insert_batch;

#[derive(Debug, Default)]
pub struct UpdateReport {
  pub updates: usize,
  pub deactivated: usize,
  pub elapsed: Duration,
}

/// Inserts a fresh active version of `row` and deactivates every other version
/// of the same key pair, in one transaction. Returns the new record and the
/// number of rows deactivated.
///
/// The new row goes in before the old ones are switched off, so a commit never
/// exposes a key pair with zero active rows.
pub fn update_row(
  store: &mut Store,
  table: &Ident,
  generator: &mut Generator,
  row: u64,
) -> Result<(Record, usize)> {
  let record = generator.update_record(row);
  let deactivate = format!(
    "UPDATE {table} SET active = 0
     WHERE uuid != ?1 AND feature_def_ref = ?2 AND entity_id = ?3"
  );

  let deactivated = store.transaction(|tx| {
    insert_batch(tx, table, std::slice::from_ref(&record))?;

    let mut stmt = tx.prepare_cached(&deactivate)?;
    let deactivated = stmt.execute((
      record.correlation_id.hyphenated().to_string(),
      &record.key_a,
      &record.key_b,
    ))?;
    Ok(deactivated)
  })?;

  Ok((record, deactivated))
}

/// Runs `updates` updates against rows drawn uniformly from `[0, total_rows)`.
/// Any failure aborts the run.
pub fn run_updates(
  store: &mut Store,
  table: &Ident,
  generator: &mut Generator,
  total_rows: u64,
  updates: usize,
) -> Result<UpdateReport> {
  if total_rows == 0 {
    return Err(Error::InvalidConfig(
      "update needs at least one existing row".to_string(),
    ));
  }

  let start = Instant::now();
  let mut report = UpdateReport::default();
  for i in 0..updates {
    let row = generator.rng().gen_range(0..total_rows);
    let (_, deactivated) = update_row(store, table, generator, row)?;
    report.updates += 1;
    report.deactivated += deactivated;

    if i % LOG_EVERY == 0 {
      info!("Tuple {} has been inserted or updated.", i + 1);
    }
  }
  report.elapsed = start.elapsed();

  info!("{:?} taken to update {table}", report.elapsed);
  Ok(report)
}
