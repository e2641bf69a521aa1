//! Age-based retention on the unpartitioned fact table.
//!
//! Age is whole days between `now` and a row's `timestamp`, truncated toward
//! zero, so rows stamped in the future have a non-positive age.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::info;

use crate::constants::SECONDS_PER_DAY;
use crate::error::Result;
use crate::ident::Ident;
use crate::store::Store;

#[derive(Debug, Default)]
pub struct SwapReport {
  pub retained: usize,
  pub discarded: usize,
  pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct PurgeReport {
  pub removed: usize,
  pub elapsed: Duration,
}

fn age_days_sql() -> String {
  format!("((?1 - timestamp) / {SECONDS_PER_DAY})")
}

/// Keeps only active rows younger than `days`: copies them to a side table,
/// empties the primary table and reloads it, all in one transaction.
///
/// Only safe while nothing else writes to `table`.
pub fn swap_active(
  store: &mut Store,
  table: &Ident,
  days: i64,
  now: DateTime<Utc>,
) -> Result<SwapReport> {
  let side = table.with_suffix("retained")?;
  let age = age_days_sql();

  let start = Instant::now();
  let (retained, discarded) = store.transaction(|tx| {
    tx.execute(
      &format!("CREATE TEMP TABLE {side} AS SELECT * FROM {table} WHERE 0"),
      (),
    )?;
    tx.execute(
      &format!("INSERT INTO {side} SELECT * FROM {table} WHERE active = 1 AND {age} < ?2"),
      (now.timestamp(), days),
    )?;
    let total = tx.execute(&format!("DELETE FROM {table}"), ())?;
    let retained = tx.execute(&format!("INSERT INTO {table} SELECT * FROM {side}"), ())?;
    tx.execute(&format!("DROP TABLE temp.{side}"), ())?;
    Ok((retained, total - retained))
  })?;

  let report = SwapReport {
    retained,
    discarded,
    elapsed: start.elapsed(),
  };
  info!(
    "{:?} taken to truncate {table}: {retained} rows kept, {discarded} discarded",
    report.elapsed
  );
  Ok(report)
}

/// Deletes inactive rows aged `days` or more, matched by `feature_id`. Touches
/// nothing else, so concurrent writers to other rows are unaffected.
pub fn purge_inactive(
  store: &mut Store,
  table: &Ident,
  days: i64,
  now: DateTime<Utc>,
) -> Result<PurgeReport> {
  let side = table.with_suffix("purged")?;
  let age = age_days_sql();

  let start = Instant::now();
  let removed = store.transaction(|tx| {
    tx.execute(
      &format!("CREATE TEMP TABLE {side} AS SELECT feature_id FROM {table} WHERE 0"),
      (),
    )?;
    tx.execute(
      &format!("INSERT INTO {side} SELECT feature_id FROM {table} WHERE active = 0 AND {age} >= ?2"),
      (now.timestamp(), days),
    )?;
    let removed = tx.execute(
      &format!("DELETE FROM {table} WHERE feature_id IN (SELECT feature_id FROM {side})"),
      (),
    )?;
    tx.execute(&format!("DROP TABLE temp.{side}"), ())?;
    Ok(removed)
  })?;

  let report = PurgeReport {
    removed,
    elapsed: start.elapsed(),
  };
  info!(
    "{:?} taken to delete {removed} rows from {table}",
    report.elapsed
  );
  Ok(report)
}
