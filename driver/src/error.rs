use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("SQLite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("Invalid identifier: {0:?}")]
  InvalidIdentifier(String),

  #[error("Invalid config: {0}")]
  InvalidConfig(String),

  /// A batch failed under `FailurePolicy::Abort`.
  #[error("Batch {index} failed: {source}")]
  Batch {
    index: usize,
    #[source]
    source: rusqlite::Error,
  },
}

pub type Result<T> = std::result::Result<T, Error>;
