//! The single store connection held by the driver for a whole run.

use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rusqlite::{Connection, OptionalExtension, Transaction};

use crate::constants::{BUSY_TIMEOUT, PRAGMAS, VERSION_QUERY};
use crate::error::Result;
use crate::ident::Ident;

pub struct Store {
  conn: Connection,
}

impl Store {
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    debug!("Opening store at {path:?}");
    return Self::configure(Connection::open(path)?);
  }

  pub fn open_in_memory() -> Result<Self> {
    return Self::configure(Connection::open_in_memory()?);
  }

  fn configure(conn: Connection) -> Result<Self> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(PRAGMAS)?;
    Ok(Self { conn })
  }

  pub fn connection(&self) -> &Connection {
    &self.conn
  }

  pub fn sqlite_version(&self) -> Result<String> {
    Ok(self.conn.query_row(VERSION_QUERY, (), |row| row.get(0))?)
  }

  /// Runs `f` inside one transaction: committed if `f` returns `Ok`, rolled back
  /// otherwise. The transaction never outlives this call.
  pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
  where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
  {
    let tx = self.conn.transaction()?;
    match f(&tx) {
      Ok(value) => {
        tx.commit()?;
        Ok(value)
      }
      Err(err) => {
        if let Err(rollback_err) = tx.rollback() {
          warn!("Rollback failed: {rollback_err}");
        }
        Err(err)
      }
    }
  }

  pub fn create_fact_table(&self, table: &Ident) -> Result<()> {
    self.conn.execute_batch(&fact_table_ddl(table, None))?;
    Ok(())
  }

  pub fn table_exists(&self, table: &Ident) -> Result<bool> {
    table_exists(&self.conn, table)
  }

  pub fn count(&self, table: &Ident) -> Result<i64> {
    Ok(
      self
        .conn
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), (), |row| {
          row.get(0)
        })?,
    )
  }

  /// Number of active rows for one key pair.
  pub fn count_active(&self, table: &Ident, key_a: &str, key_b: &str) -> Result<i64> {
    Ok(self.conn.query_row(
      &format!(
        "SELECT COUNT(*) FROM {table}
         WHERE feature_def_ref = ?1 AND entity_id = ?2 AND active = 1"
      ),
      (key_a, key_b),
      |row| row.get(0),
    )?)
  }

  pub fn create_indexes(&mut self, table: &Ident) -> Result<Duration> {
    let uuid_idx = table.with_suffix("uuid")?;
    let pair_idx = table.with_suffix("feature_entity")?;

    let start = Instant::now();
    self.transaction(|tx| {
      tx.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS {uuid_idx} ON {table} (uuid);
         CREATE INDEX IF NOT EXISTS {pair_idx} ON {table} (feature_def_ref, entity_id);"
      ))?;
      Ok(())
    })?;
    let elapsed = start.elapsed();

    info!("{elapsed:?} taken to create the indexes on {table}");
    Ok(elapsed)
  }

  pub fn drop_indexes(&mut self, table: &Ident) -> Result<Duration> {
    let uuid_idx = table.with_suffix("uuid")?;
    let pair_idx = table.with_suffix("feature_entity")?;

    let start = Instant::now();
    self.transaction(|tx| {
      tx.execute_batch(&format!(
        "DROP INDEX IF EXISTS {uuid_idx};
         DROP INDEX IF EXISTS {pair_idx};"
      ))?;
      Ok(())
    })?;
    let elapsed = start.elapsed();

    info!("{elapsed:?} taken to drop the indexes on {table}");
    Ok(elapsed)
  }
}

pub(crate) fn table_exists(conn: &Connection, table: &Ident) -> Result<bool> {
  let found = conn
    .query_row(
      "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
      [table.as_str()],
      |_| Ok(()),
    )
    .optional()?;
  Ok(found.is_some())
}

/// DDL for a fact table. `bounds` adds a `[lower, upper)` check on `timestamp`
/// (epoch seconds), which is how a day partition is expressed.
pub(crate) fn fact_table_ddl(table: &Ident, bounds: Option<(i64, i64)>) -> String {
  let range_check = match bounds {
    Some((lower, upper)) => {
      format!(",\n      CHECK (timestamp >= {lower} AND timestamp < {upper})")
    }
    None => String::new(),
  };

  format!(
    r#"
    CREATE TABLE IF NOT EXISTS {table} (
      feature_id       INTEGER PRIMARY KEY NOT NULL,
      feature_def_ref  TEXT NOT NULL,
      entity_id        TEXT NOT NULL,
      value            NOT NULL,
      active           INTEGER NOT NULL CHECK (active IN (0, 1)),
      uuid             TEXT NOT NULL,
      timestamp        INTEGER NOT NULL,
      expire           INTEGER NOT NULL,
      CHECK (expire > timestamp){range_check}
    );
"#
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Error;

  fn fact_store() -> (Store, Ident) {
    let store = Store::open_in_memory().unwrap();
    let table = Ident::new("facts").unwrap();
    store.create_fact_table(&table).unwrap();
    (store, table)
  }

  fn insert_one(tx: &Transaction<'_>, table: &Ident) -> Result<()> {
    tx.execute(
      &format!(
        "INSERT INTO {table} (feature_def_ref, entity_id, value, active, uuid, timestamp, expire)
         VALUES ('a', 'b', 'v', 1, 'u', 0, 10)"
      ),
      (),
    )?;
    Ok(())
  }

  #[test]
  fn transaction_commits_on_ok() {
    let (mut store, table) = fact_store();
    store.transaction(|tx| insert_one(tx, &table)).unwrap();
    assert_eq!(store.count(&table).unwrap(), 1);
  }

  #[test]
  fn transaction_rolls_back_on_err() {
    let (mut store, table) = fact_store();
    let result: Result<()> = store.transaction(|tx| {
      insert_one(tx, &table)?;
      Err(Error::InvalidConfig("forced".to_string()))
    });
    assert!(result.is_err());
    assert_eq!(store.count(&table).unwrap(), 0);

    // The connection is usable again afterwards.
    store.transaction(|tx| insert_one(tx, &table)).unwrap();
    assert_eq!(store.count(&table).unwrap(), 1);
  }

  #[test]
  fn expire_must_follow_timestamp() {
    let (store, table) = fact_store();
    let err = store.connection().execute(
      &format!(
        "INSERT INTO {table} (feature_def_ref, entity_id, value, active, uuid, timestamp, expire)
         VALUES ('a', 'b', 'v', 1, 'u', 10, 10)"
      ),
      (),
    );
    assert!(err.is_err());
  }

  #[test]
  fn index_maintenance_is_repeatable() {
    let (mut store, table) = fact_store();
    store.create_indexes(&table).unwrap();
    store.create_indexes(&table).unwrap();

    let index_count = |store: &Store| -> i64 {
      store
        .connection()
        .query_row(
          "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = 'facts'",
          (),
          |row| row.get(0),
        )
        .unwrap()
    };
    assert_eq!(index_count(&store), 2);

    store.drop_indexes(&table).unwrap();
    store.drop_indexes(&table).unwrap();
    assert_eq!(index_count(&store), 0);
  }

  #[test]
  fn reports_version_and_existence() {
    let (store, table) = fact_store();
    assert!(store.sqlite_version().unwrap().starts_with('3'));
    assert!(store.table_exists(&table).unwrap());
    assert!(!store.table_exists(&Ident::new("missing").unwrap()).unwrap());
  }
}
