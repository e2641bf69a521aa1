//! Human-readable summaries printed by the binaries.

use std::fmt::Write;
use std::time::Duration;

use crate::job::PhaseReport;
use crate::kv::KvResult;
use crate::partition::{DayReport, DropOutcome};
use crate::query::QueryReport;

fn rate(rows: usize, elapsed: Duration) -> f64 {
  let secs = elapsed.as_secs_f64();
  if secs <= 0.0 {
    return 0.0;
  }
  rows as f64 / secs
}

pub fn format_phases(name: &str, reports: &[PhaseReport]) -> String {
  let mut out = format!("[{name}]\n");
  for r in reports {
    let _ = writeln!(
      out,
      "\t{:<16} {:>10} rows in {:>12.3?} ({:.1} rows/s) {}",
      r.phase.to_string(),
      r.rows,
      r.elapsed,
      rate(r.rows, r.elapsed),
      r.detail
    );
  }
  let total: Duration = reports.iter().map(|r| r.elapsed).sum();
  let _ = write!(out, "\tTotal {total:?}");
  out
}

pub fn format_day(name: &str, report: &DayReport) -> String {
  let dropped = match report.dropped {
    DropOutcome::Dropped => "dropped",
    DropOutcome::Absent => "absent",
  };
  format!(
    "[{name}] {day}\n\tInserted {rows} rows in {batches} batches ({failed} failed) in {insert:?}\n\tExpired partition {expired}: {dropped}\n\tDay took {elapsed:?}",
    day = report.day,
    rows = report.insert.committed,
    batches = report.insert.batches,
    failed = report.insert.failures.len(),
    insert = report.insert.elapsed,
    expired = report.expired_day,
    elapsed = report.elapsed,
  )
}

pub fn format_queries(name: &str, report: &QueryReport) -> String {
  format!(
    "[{name}]\n\tRan {count} queries ({hits} hits) in {total:?}\n\tMean {mean:?}, max {max:?}",
    count = report.samples.len(),
    hits = report.hits(),
    total = report.total(),
    mean = report.mean(),
    max = report.max(),
  )
}

pub fn format_kv(name: &str, results: &[KvResult]) -> String {
  let mut out = format!("[{name}]");
  for r in results {
    let _ = write!(
      out,
      "\n\t= Totals for {rows} rows =\n\tins total: {ins:?} ({ins_mean:?}/row)\n\tsel total: {sel:?} ({sel_mean:?}/row)",
      rows = r.rows,
      ins = r.insert,
      ins_mean = r.insert_mean(),
      sel = r.select,
      sel_mean = r.select_mean(),
    );
  }
  out
}
