//! Day partitions of the serving-feature table.
//!
//! SQLite has no declarative partitioning, so a partition is a child table per
//! calendar day (UTC) whose `timestamp` is constrained to `[day, day + 1)`.
//! Only this module creates or drops partitions.

use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Duration as Days, NaiveDate, TimeZone, Utc};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::constants::{
  PARTITION_BATCH_NUM, PARTITION_BATCH_SIZE, PARTITION_RETENTION_DAYS, PARTITION_TOTAL_DAYS,
};
use crate::error::{Error, Result};
use crate::generator::random_uuid;
use crate::ident::Ident;
use crate::record::{Payload, Record};
use crate::store::{fact_table_ddl, table_exists, Store};
use crate::submit::{SubmitReport, Submitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
  Created,
  Existing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
  Dropped,
  Absent,
}

/// `{parent}_y{year}m{month}d{day}`, without zero padding.
pub fn partition_name(parent: &Ident, day: NaiveDate) -> Result<Ident> {
  parent.with_suffix(&format!("y{}m{}d{}", day.year(), day.month(), day.day()))
}

/// `[lower, upper)` bounds of `day` in epoch seconds.
pub fn day_bounds(day: NaiveDate) -> Result<(i64, i64)> {
  let start = day_start(day)?;
  Ok((start.timestamp(), (start + Days::days(1)).timestamp()))
}

fn day_start(day: NaiveDate) -> Result<DateTime<Utc>> {
  let midnight = day
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| Error::InvalidConfig(format!("no midnight on {day}")))?;
  Ok(Utc.from_utc_datetime(&midnight))
}

pub fn create_partition(store: &mut Store, parent: &Ident, day: NaiveDate) -> Result<CreateOutcome> {
  let name = partition_name(parent, day)?;
  let ddl = fact_table_ddl(&name, Some(day_bounds(day)?));

  let outcome = store.transaction(|tx| {
    if table_exists(tx, &name)? {
      return Ok(CreateOutcome::Existing);
    }
    tx.execute_batch(&ddl)?;
    Ok(CreateOutcome::Created)
  })?;

  if outcome == CreateOutcome::Created {
    info!("Create the table: {name}");
  }
  Ok(outcome)
}

/// Drops the partition of `day` if there is one. A missing partition is not an
/// error.
pub fn drop_partition(store: &mut Store, parent: &Ident, day: NaiveDate) -> Result<DropOutcome> {
  let name = partition_name(parent, day)?;

  let outcome = store.transaction(|tx| {
    if !table_exists(tx, &name)? {
      return Ok(DropOutcome::Absent);
    }
    tx.execute(&format!("DROP TABLE IF EXISTS {name}"), ())?;
    Ok(DropOutcome::Dropped)
  })?;

  if outcome == DropOutcome::Dropped {
    info!("Drop the table: {name}");
  }
  Ok(outcome)
}

/// Day that falls out of a `retention_days` window on `today`.
pub fn expired_day(today: NaiveDate, retention_days: i64) -> Result<NaiveDate> {
  Days::try_days(retention_days)
    .and_then(|window| today.checked_sub_signed(window))
    .ok_or_else(|| {
      Error::InvalidConfig(format!(
        "retention of {retention_days} days before {today} is out of range"
      ))
    })
}

/// Drops the partition that falls out of the window on `today`.
pub fn drop_expired(
  store: &mut Store,
  parent: &Ident,
  today: NaiveDate,
  retention_days: i64,
) -> Result<(NaiveDate, DropOutcome)> {
  let expired_day = expired_day(today, retention_days)?;
  Ok((expired_day, drop_partition(store, parent, expired_day)?))
}

/// Feature definitions written for every entity of a day.
pub const SERVING_FEATURES: [(&str, FeatureKind); 4] = [
  (
    "fs_company_merchant_dummy__company_merchant_total_received_payments_3D",
    FeatureKind::Count,
  ),
  (
    "fs_company_merchant_dummy__company_merchant_total_received_payments_7D",
    FeatureKind::Count,
  ),
  (
    "fs_company_merchant_dummy__company_merchant_avg_eur_amount_3D",
    FeatureKind::Amount,
  ),
  (
    "fs_company_merchant_dummy__company_merchant_avg_eur_amount_7D",
    FeatureKind::Amount,
  ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
  Count,
  Amount,
}

/// Rows for one day's partition: every entity gets one row per
/// [`SERVING_FEATURES`] entry. Every batch of a day carries the same
/// correlation id, drawn once with [`DayGenerator::correlation_id`].
pub struct DayGenerator {
  rng: StdRng,
}

impl DayGenerator {
  pub fn new(seed: u64) -> Self {
    Self {
      rng: StdRng::seed_from_u64(seed),
    }
  }

  pub fn correlation_id(&mut self) -> Uuid {
    random_uuid(&mut self.rng)
  }

  /// `entities * SERVING_FEATURES.len()` records stamped at `at`, which must
  /// fall on the partition's day.
  pub fn day_records(
    &mut self,
    at: DateTime<Utc>,
    entities: usize,
    correlation_id: Uuid,
  ) -> Vec<Record> {
    let mut records = Vec::with_capacity(entities * SERVING_FEATURES.len());

    for _ in 0..entities {
      let entity = random_uuid(&mut self.rng);
      let key_b = format!("company_&&_{entity}_!!_merchant_&&_{entity}");
      for (feature, kind) in SERVING_FEATURES {
        let amount = self.rng.gen_range(0..=1_000_000i64);
        let value = match kind {
          FeatureKind::Count => Payload::Integer(amount),
          FeatureKind::Amount => Payload::Real(amount as f64 / 100.0),
        };
        records.push(Record {
          key_a: feature.to_string(),
          key_b: key_b.clone(),
          value,
          active: true,
          correlation_id,
          created_at: at,
          expires_at: at + Days::days(self.rng.gen_range(1..8)),
        });
      }
    }
    records
  }
}

#[derive(Debug, Clone)]
pub struct PartitionConfig {
  pub parent: Ident,
  pub first_day: DateTime<Utc>,
  pub total_days: u32,
  pub retention_days: i64,
  pub batch_num: usize,
  /// Entities per batch; each entity yields one row per serving feature.
  pub batch_size: usize,
  pub seed: u64,
}

impl PartitionConfig {
  pub fn new(parent: Ident, first_day: DateTime<Utc>) -> Self {
    Self {
      parent,
      first_day,
      total_days: PARTITION_TOTAL_DAYS,
      retention_days: PARTITION_RETENTION_DAYS,
      batch_num: PARTITION_BATCH_NUM,
      batch_size: PARTITION_BATCH_SIZE,
      seed: 0,
    }
  }
}

#[derive(Debug)]
pub struct DayReport {
  pub day: NaiveDate,
  pub created: CreateOutcome,
  pub insert: SubmitReport,
  pub expired_day: NaiveDate,
  pub dropped: DropOutcome,
  pub elapsed: Duration,
}

/// Day-by-day cycle: create day N, fill it, drop day N - retention, advance.
pub struct PartitionCycle {
  config: PartitionConfig,
  generator: DayGenerator,
  day_index: u32,
}

impl PartitionCycle {
  pub fn new(config: PartitionConfig) -> Result<Self> {
    if config.retention_days < 0 {
      return Err(Error::InvalidConfig(format!(
        "retention_days must not be negative, got {}",
        config.retention_days
      )));
    }
    if config.batch_size.checked_mul(SERVING_FEATURES.len()).is_none() {
      return Err(Error::InvalidConfig(format!(
        "{} entities per batch overflow",
        config.batch_size
      )));
    }
    let generator = DayGenerator::new(config.seed);
    Ok(Self {
      config,
      generator,
      day_index: 0,
    })
  }

  pub fn is_done(&self) -> bool {
    self.day_index >= self.config.total_days
  }

  /// Runs the next day. Returns `None` once the day range is exhausted.
  pub fn step(&mut self, store: &mut Store) -> Result<Option<DayReport>> {
    if self.is_done() {
      return Ok(None);
    }

    let start = Instant::now();
    let at = self
      .config
      .first_day
      .checked_add_signed(Days::days(self.day_index.into()))
      .ok_or_else(|| {
        Error::InvalidConfig(format!(
          "day {} after {} is out of range",
          self.day_index, self.config.first_day
        ))
      })?;
    let day = at.date_naive();
    let parent = &self.config.parent;
    // Fail before touching the store.
    expired_day(day, self.config.retention_days)?;

    let created = create_partition(store, parent, day)?;

    let table = partition_name(parent, day)?;
    let per_batch = self.config.batch_size * SERVING_FEATURES.len();
    let submitter = Submitter::new(table, per_batch);
    let mut insert = SubmitReport::default();
    let correlation_id = self.generator.correlation_id();
    for _ in 0..self.config.batch_num {
      let records = self
        .generator
        .day_records(at, self.config.batch_size, correlation_id);
      let batch = submitter.submit(store, records)?;
      insert.batches += batch.batches;
      insert.attempted += batch.attempted;
      insert.committed += batch.committed;
      insert.failures.extend(batch.failures);
      insert.elapsed += batch.elapsed;
    }

    let (expired_day, dropped) = drop_expired(store, parent, day, self.config.retention_days)?;

    self.day_index += 1;
    Ok(Some(DayReport {
      day,
      created,
      insert,
      expired_day,
      dropped,
      elapsed: start.elapsed(),
    }))
  }

  /// Runs every remaining day, calling `on_day` after each one.
  pub fn run<F>(&mut self, store: &mut Store, mut on_day: F) -> Result<Vec<DayReport>>
  where
    F: FnMut(&DayReport),
  {
    let mut reports = Vec::new();
    while let Some(report) = self.step(store)? {
      on_day(&report);
      reports.push(report);
    }
    Ok(reports)
  }
}
