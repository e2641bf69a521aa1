use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use uuid::Uuid;

/// Number of bound columns per record in a bulk insert.
pub const RECORD_COLUMNS: usize = 7;

/// Column list shared by every fact and partition table insert.
pub const INSERT_COLUMNS: &str =
  "feature_def_ref, entity_id, value, active, uuid, timestamp, expire";

/// Placeholder payload: either a string or a number.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
  Text(String),
  Integer(i64),
  Real(f64),
}

impl fmt::Display for Payload {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Payload::Text(s) => f.write_str(s),
      Payload::Integer(i) => write!(f, "{i}"),
      Payload::Real(r) => write!(f, "{r}"),
    }
  }
}

impl ToSql for Payload {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(match self {
      Payload::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
      Payload::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
      Payload::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
    })
  }
}

impl FromSql for Payload {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    match value {
      ValueRef::Text(_) => Ok(Payload::Text(value.as_str()?.to_string())),
      ValueRef::Integer(i) => Ok(Payload::Integer(i)),
      ValueRef::Real(r) => Ok(Payload::Real(r)),
      _ => Err(FromSqlError::InvalidType),
    }
  }
}

/// A synthetic fact row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
  pub key_a: String,
  pub key_b: String,
  pub value: Payload,
  pub active: bool,
  pub correlation_id: Uuid,
  pub created_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

impl Record {
  /// Bound values in [`INSERT_COLUMNS`] order. Timestamps are epoch seconds.
  pub fn to_values(&self) -> [Value; RECORD_COLUMNS] {
    [
      Value::Text(self.key_a.clone()),
      Value::Text(self.key_b.clone()),
      match &self.value {
        Payload::Text(s) => Value::Text(s.clone()),
        Payload::Integer(i) => Value::Integer(*i),
        Payload::Real(r) => Value::Real(*r),
      },
      Value::Integer(self.active as i64),
      Value::Text(self.correlation_id.hyphenated().to_string()),
      Value::Integer(self.created_at.timestamp()),
      Value::Integer(self.expires_at.timestamp()),
    ]
  }
}

/// `INSERT INTO {table} (..) VALUES (..), (..)` with `rows` placeholder tuples.
pub(crate) fn bulk_insert_sql(table: &str, rows: usize) -> String {
  let tuple = format!("({})", vec!["?"; RECORD_COLUMNS].join(", "));
  let values = vec![tuple.as_str(); rows].join(", ");
  format!("INSERT INTO {table} ({INSERT_COLUMNS}) VALUES {values}")
}
