//! The maintenance job: a fixed sequence of phases against the fact table.
//!
//! Phases run strictly one after another. Completion of a phase is signalled
//! through the `on_phase` callback of [`Job::run`]; an optional settle pause can
//! be put between phases.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::info;

use crate::constants::{BATCH_NUM, BATCH_SIZE, RETENTION_DAYS, UPDATE_ROWS};
use crate::error::{Error, Result};
use crate::generator::Generator;
use crate::ident::Ident;
use crate::retention::{purge_inactive, swap_active};
use crate::store::Store;
use crate::submit::{FailurePolicy, Submitter};
use crate::update::run_updates;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Insert,
  Update,
  Swap { days: i64 },
  Purge { days: i64 },
  CreateIndexes,
  DropIndexes,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Phase::Insert => f.write_str("insert"),
      Phase::Update => f.write_str("update"),
      Phase::Swap { days } => write!(f, "swap({days}d)"),
      Phase::Purge { days } => write!(f, "purge({days}d)"),
      Phase::CreateIndexes => f.write_str("create-indexes"),
      Phase::DropIndexes => f.write_str("drop-indexes"),
    }
  }
}

/// Parses `insert`, `update`, `create-indexes`, `drop-indexes`, and
/// `swap`/`purge` with an optional `:days` suffix.
impl FromStr for Phase {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let (name, days) = match s.split_once(':') {
      Some((name, days)) => {
        let days = days
          .parse::<i64>()
          .map_err(|_| Error::InvalidConfig(format!("bad day count in phase {s:?}")))?;
        (name, Some(days))
      }
      None => (s, None),
    };

    let phase = match (name, days) {
      ("insert", None) => Phase::Insert,
      ("update", None) => Phase::Update,
      ("create-indexes", None) => Phase::CreateIndexes,
      ("drop-indexes", None) => Phase::DropIndexes,
      ("swap", days) => Phase::Swap {
        days: days.unwrap_or(RETENTION_DAYS),
      },
      ("purge", days) => Phase::Purge {
        days: days.unwrap_or(RETENTION_DAYS),
      },
      _ => return Err(Error::InvalidConfig(format!("unknown phase {s:?}"))),
    };
    Ok(phase)
  }
}

/// insert, update, swap, insert, update, swap.
pub fn default_phases() -> Vec<Phase> {
  let swap = Phase::Swap {
    days: RETENTION_DAYS,
  };
  vec![
    Phase::Insert,
    Phase::Update,
    swap,
    Phase::Insert,
    Phase::Update,
    swap,
  ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Pacing {
  #[default]
  None,
  /// Sleep this long after every phase but the last.
  Settle(Duration),
}

impl Pacing {
  /// Pause to take once phase `index` of `phases` has finished.
  pub fn pause_after(&self, index: usize, phases: usize) -> Option<Duration> {
    match *self {
      Pacing::Settle(pause) if index + 1 < phases => Some(pause),
      _ => None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct JobConfig {
  pub table: Ident,
  pub batch_num: usize,
  pub batch_size: usize,
  pub update_rows: usize,
  pub policy: FailurePolicy,
  pub pacing: Pacing,
  pub seed: u64,
}

impl JobConfig {
  pub fn new(table: Ident) -> Self {
    Self {
      table,
      batch_num: BATCH_NUM,
      batch_size: BATCH_SIZE,
      update_rows: UPDATE_ROWS,
      policy: FailurePolicy::Skip,
      pacing: Pacing::None,
      seed: 0,
    }
  }

  /// Rows written by one insert phase; also the row range updates draw from.
  pub fn total_rows(&self) -> Result<usize> {
    self
      .batch_num
      .checked_mul(self.batch_size)
      .ok_or_else(|| {
        Error::InvalidConfig(format!(
          "{} batches of {} rows overflow",
          self.batch_num, self.batch_size
        ))
      })
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
  pub phase: Phase,
  /// Rows written, updated or removed, depending on the phase.
  pub rows: usize,
  pub elapsed: Duration,
  pub detail: String,
}

pub struct Job {
  config: JobConfig,
  generator: Generator,
}

impl Job {
  pub fn new(config: JobConfig, anchor: DateTime<Utc>) -> Result<Self> {
    if config.batch_size == 0 {
      return Err(Error::InvalidConfig("batch_size must be at least 1".to_string()));
    }
    config.total_rows()?;
    let generator = Generator::new(config.seed, anchor);
    Ok(Self { config, generator })
  }

  pub fn config(&self) -> &JobConfig {
    &self.config
  }

  /// Runs `phases` in order. `now` is the reference time for retention ages.
  pub fn run<F>(
    &mut self,
    store: &mut Store,
    phases: &[Phase],
    now: DateTime<Utc>,
    mut on_phase: F,
  ) -> Result<Vec<PhaseReport>>
  where
    F: FnMut(&PhaseReport),
  {
    store.create_fact_table(&self.config.table)?;

    let mut reports = Vec::with_capacity(phases.len());
    for (i, &phase) in phases.iter().enumerate() {
      let report = self.run_phase(store, phase, now)?;
      info!(
        "Phase {phase} finished: {} rows in {:?} ({})",
        report.rows, report.elapsed, report.detail
      );
      on_phase(&report);
      reports.push(report);

      if let Some(pause) = self.config.pacing.pause_after(i, phases.len()) {
        std::thread::sleep(pause);
      }
    }
    Ok(reports)
  }

  fn run_phase(&mut self, store: &mut Store, phase: Phase, now: DateTime<Utc>) -> Result<PhaseReport> {
    let table = &self.config.table;
    let report = match phase {
      Phase::Insert => {
        let submitter =
          Submitter::new(table.clone(), self.config.batch_size).with_policy(self.config.policy);
        let rows = self.config.total_rows()?;
        let submit = submitter.submit(store, self.generator.records(0, rows))?;
        PhaseReport {
          phase,
          rows: submit.committed,
          elapsed: submit.elapsed,
          detail: format!(
            "{} batches of {}, {} failed, {:.1} rows/s",
            submit.batches,
            self.config.batch_size,
            submit.failures.len(),
            submit.rows_per_sec()
          ),
        }
      }
      Phase::Update => {
        let update = run_updates(
          store,
          table,
          &mut self.generator,
          self.config.total_rows()? as u64,
          self.config.update_rows,
        )?;
        PhaseReport {
          phase,
          rows: update.updates,
          elapsed: update.elapsed,
          detail: format!("{} older versions deactivated", update.deactivated),
        }
      }
      Phase::Swap { days } => {
        let swap = swap_active(store, table, days, now)?;
        PhaseReport {
          phase,
          rows: swap.discarded,
          elapsed: swap.elapsed,
          detail: format!("{} rows retained", swap.retained),
        }
      }
      Phase::Purge { days } => {
        let purge = purge_inactive(store, table, days, now)?;
        PhaseReport {
          phase,
          rows: purge.removed,
          elapsed: purge.elapsed,
          detail: "inactive rows removed".to_string(),
        }
      }
      Phase::CreateIndexes => PhaseReport {
        phase,
        rows: 0,
        elapsed: store.create_indexes(table)?,
        detail: "uuid, (feature_def_ref, entity_id)".to_string(),
      },
      Phase::DropIndexes => PhaseReport {
        phase,
        rows: 0,
        elapsed: store.drop_indexes(table)?,
        detail: "uuid, (feature_def_ref, entity_id)".to_string(),
      },
    };
    Ok(report)
  }
}
