//! Integration tests: transactional batches, update and retention invariants,
//! partition lifecycle and lookups against an in-memory store.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use load_driver::generator::{Generator, KeyTemplate};
use load_driver::partition::{
  create_partition, drop_expired, drop_partition, partition_name, CreateOutcome, DropOutcome,
  PartitionConfig, PartitionCycle,
};
use load_driver::query::lookup;
use load_driver::retention::purge_inactive;
use load_driver::submit::{FailurePolicy, Submitter};
use load_driver::update::update_row;
use load_driver::{Error, Ident, Payload, Record, Store};
use uuid::Uuid;

fn now() -> DateTime<Utc> {
  DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn facts() -> Ident {
  Ident::new("test_table").unwrap()
}

fn fact_store() -> Store {
  let store = Store::open_in_memory().expect("open");
  store.create_fact_table(&facts()).expect("create table");
  store
}

fn record(row: u64, age_days: i64, active: bool) -> Record {
  let (key_a, key_b) = KeyTemplate::default().keys_for(row);
  let created_at = now() - Duration::days(age_days) - Duration::minutes(30);
  Record {
    key_a,
    key_b,
    value: Payload::Text(format!("v{row}")),
    active,
    correlation_id: Uuid::new_v4(),
    created_at,
    expires_at: created_at + Duration::days(30),
  }
}

fn table_names(store: &Store) -> Vec<String> {
  let mut stmt = store
    .connection()
    .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
    .unwrap();
  stmt
    .query_map((), |row| row.get(0))
    .unwrap()
    .collect::<Result<_, _>>()
    .unwrap()
}

// ── Batches ─────────────────────────────────────────────────────────

#[test]
fn failed_batch_leaves_no_rows_and_later_batches_commit() {
  let mut store = fact_store();
  let mut generator = Generator::new(1, now());

  let mut records: Vec<Record> = generator.records(0, 30).collect();
  // Breaks the expire > timestamp check halfway through the second batch.
  records[15].expires_at = records[15].created_at;

  let report = Submitter::new(facts(), 10)
    .submit(&mut store, records)
    .unwrap();

  assert_eq!(report.batches, 3);
  assert_eq!(report.attempted, 30);
  assert_eq!(report.committed, 20);
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].index, 1);
  assert_eq!(report.failures[0].rows, 10);
  assert_eq!(store.count(&facts()).unwrap(), 20);

  for row in 10..20 {
    let (key_a, key_b) = KeyTemplate::default().keys_for(row);
    let visible: i64 = store
      .connection()
      .query_row(
        "SELECT COUNT(*) FROM test_table WHERE feature_def_ref = ?1 AND entity_id = ?2",
        (&key_a, &key_b),
        |r| r.get(0),
      )
      .unwrap();
    assert_eq!(visible, 0, "row {row} of the failed batch is visible");
  }
}

#[test]
fn failure_in_a_split_batch_rolls_back_every_statement() {
  let mut store = fact_store();
  let mut generator = Generator::new(2, now());

  let rows = 5000;
  let mut records: Vec<Record> = generator.records(0, rows).collect();
  records[rows - 1].expires_at = records[rows - 1].created_at - Duration::days(1);

  let report = Submitter::new(facts(), rows)
    .submit(&mut store, records)
    .unwrap();

  assert_eq!(report.committed, 0);
  assert_eq!(report.failures.len(), 1);
  assert_eq!(store.count(&facts()).unwrap(), 0);
}

#[test]
fn abort_policy_surfaces_the_failed_batch() {
  let mut store = fact_store();
  let mut generator = Generator::new(3, now());

  let mut records: Vec<Record> = generator.records(0, 30).collect();
  records[25].expires_at = records[25].created_at;

  let err = Submitter::new(facts(), 10)
    .with_policy(FailurePolicy::Abort)
    .submit(&mut store, records)
    .unwrap_err();

  assert!(matches!(err, Error::Batch { index: 2, .. }));
  assert_eq!(store.count(&facts()).unwrap(), 20);
}

// ── Updates ─────────────────────────────────────────────────────────

#[test]
fn repeated_updates_keep_a_single_active_row() {
  let mut store = fact_store();
  let mut generator = Generator::new(4, now());

  // Start from a pair that already has several active versions.
  let seed = vec![record(7, 1, true), record(7, 2, true), record(7, 3, false)];
  Submitter::new(facts(), 10)
    .submit(&mut store, seed)
    .unwrap();

  let (key_a, key_b) = KeyTemplate::default().keys_for(7);
  assert_eq!(store.count_active(&facts(), &key_a, &key_b).unwrap(), 2);

  for _ in 0..10 {
    let (record, _) = update_row(&mut store, &facts(), &mut generator, 7).unwrap();
    assert_eq!(record.key_a, key_a);
    assert_eq!(store.count_active(&facts(), &key_a, &key_b).unwrap(), 1);
  }
  assert_eq!(store.count(&facts()).unwrap(), 13);
}

#[test]
fn update_leaves_other_pairs_alone() {
  let mut store = fact_store();
  let mut generator = Generator::new(5, now());
  Submitter::new(facts(), 10)
    .submit(&mut store, vec![record(1, 0, true), record(2, 0, true)])
    .unwrap();

  update_row(&mut store, &facts(), &mut generator, 1).unwrap();

  let (key_a, key_b) = KeyTemplate::default().keys_for(2);
  assert_eq!(store.count_active(&facts(), &key_a, &key_b).unwrap(), 1);
}

// ── Retention ───────────────────────────────────────────────────────

#[test]
fn purge_removes_only_old_inactive_rows() {
  let mut store = fact_store();

  let mut records = Vec::new();
  for row in 0..10 {
    records.push(record(row, 5, false));
  }
  for row in 10..15 {
    records.push(record(row, 1, false));
  }
  Submitter::new(facts(), 100)
    .submit(&mut store, records)
    .unwrap();

  let report = purge_inactive(&mut store, &facts(), 3, now()).unwrap();
  assert_eq!(report.removed, 10);
  assert_eq!(store.count(&facts()).unwrap(), 5);
}

// ── Partitions ──────────────────────────────────────────────────────

fn parent() -> Ident {
  Ident::new("servingfeature").unwrap()
}

#[test]
fn dropping_a_missing_partition_is_a_no_op() {
  let mut store = fact_store();
  let before = table_names(&store);

  let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
  assert_eq!(
    drop_partition(&mut store, &parent(), day).unwrap(),
    DropOutcome::Absent
  );
  assert_eq!(table_names(&store), before);
}

#[test]
fn expired_partition_is_dropped_once() {
  let mut store = fact_store();
  let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
  let expired = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();

  assert_eq!(
    create_partition(&mut store, &parent(), expired).unwrap(),
    CreateOutcome::Created
  );

  let (day, outcome) = drop_expired(&mut store, &parent(), today, 7).unwrap();
  assert_eq!(day, expired);
  assert_eq!(outcome, DropOutcome::Dropped);

  let (_, outcome) = drop_expired(&mut store, &parent(), today, 7).unwrap();
  assert_eq!(outcome, DropOutcome::Absent);
}

#[test]
fn cycle_keeps_a_sliding_window_of_partitions() {
  let mut store = Store::open_in_memory().unwrap();
  let first_day = DateTime::from_timestamp(1_709_251_200, 0).unwrap(); // 2024-03-01
  let config = PartitionConfig {
    total_days: 6,
    retention_days: 2,
    batch_num: 2,
    batch_size: 3,
    seed: 42,
    ..PartitionConfig::new(parent(), first_day)
  };

  let mut cycle = PartitionCycle::new(config).unwrap();
  let mut days = Vec::new();
  let reports = cycle.run(&mut store, |r| days.push(r.day)).unwrap();

  assert_eq!(reports.len(), 6);
  assert!(cycle.is_done());
  assert!(cycle.step(&mut store).unwrap().is_none());

  for report in &reports {
    assert_eq!(report.created, CreateOutcome::Created);
    assert_eq!(report.insert.committed, 2 * 3 * 4);
    assert!(report.insert.failures.is_empty());
  }
  // The first two days have nothing to expire yet.
  assert_eq!(reports[0].dropped, DropOutcome::Absent);
  assert_eq!(reports[1].dropped, DropOutcome::Absent);
  assert_eq!(reports[2].dropped, DropOutcome::Dropped);
  assert_eq!(reports[5].dropped, DropOutcome::Dropped);

  let remaining: Vec<String> = table_names(&store)
    .into_iter()
    .filter(|n| n.starts_with("servingfeature_"))
    .collect();
  let expected: Vec<String> = days[4..]
    .iter()
    .map(|d| partition_name(&parent(), *d).unwrap().to_string())
    .collect();
  assert_eq!(remaining, expected);
}

#[test]
fn every_batch_of_a_day_shares_one_correlation_id() {
  let mut store = Store::open_in_memory().unwrap();
  let first_day = DateTime::from_timestamp(1_709_251_200, 0).unwrap(); // 2024-03-01
  let config = PartitionConfig {
    total_days: 2,
    batch_num: 3,
    batch_size: 2,
    seed: 7,
    ..PartitionConfig::new(parent(), first_day)
  };

  let reports = PartitionCycle::new(config)
    .unwrap()
    .run(&mut store, |_| {})
    .unwrap();
  assert_eq!(reports[0].insert.batches, 3);

  let mut day_ids = Vec::new();
  for report in &reports {
    let table = partition_name(&parent(), report.day).unwrap();
    let (distinct, id): (i64, String) = store
      .connection()
      .query_row(
        &format!("SELECT COUNT(DISTINCT uuid), MIN(uuid) FROM {table}"),
        (),
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .unwrap();
    assert_eq!(distinct, 1, "{table} carries more than one correlation id");
    day_ids.push(id);
  }
  assert_ne!(day_ids[0], day_ids[1]);
}

// ── Lookups ─────────────────────────────────────────────────────────

#[test]
fn expired_rows_are_never_returned() {
  let mut store = fact_store();
  let mut stale = record(1, 3, true);
  stale.expires_at = now() - Duration::days(1);
  Submitter::new(facts(), 10)
    .submit(&mut store, vec![stale.clone()])
    .unwrap();

  let value = lookup(&store, &facts(), &stale.key_a, &stale.key_b, now()).unwrap();
  assert_eq!(value, None);
}

#[test]
fn lookup_returns_the_latest_active_row() {
  let mut store = fact_store();
  let mut older = record(1, 2, true);
  older.value = Payload::Text("older".to_string());
  let mut newer = record(1, 1, true);
  newer.value = Payload::Text("newer".to_string());
  let mut inactive = record(1, 0, false);
  inactive.value = Payload::Text("inactive".to_string());

  Submitter::new(facts(), 10)
    .submit(&mut store, vec![newer.clone(), older, inactive])
    .unwrap();

  let value = lookup(&store, &facts(), &newer.key_a, &newer.key_b, now()).unwrap();
  assert_eq!(value, Some(Payload::Text("newer".to_string())));
}

#[test]
fn lookup_for_unknown_pair_is_none() {
  let store = fact_store();
  let value = lookup(&store, &facts(), "feature_def_ref_1", "entity_id_1", now()).unwrap();
  assert_eq!(value, None);
}

#[test]
fn on_disk_store_persists_between_connections() {
  let dir = tempfile::TempDir::new().unwrap();
  let path = dir.path().join("load_driver.sqlite");

  {
    let mut store = Store::open(&path).unwrap();
    store.create_fact_table(&facts()).unwrap();
    Submitter::new(facts(), 10)
      .submit(&mut store, vec![record(1, 0, true), record(2, 0, true)])
      .unwrap();
  }

  let store = Store::open(&path).unwrap();
  assert_eq!(store.count(&facts()).unwrap(), 2);
}
