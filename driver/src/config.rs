use std::ffi::OsString;
use std::path::PathBuf;

use crate::constants::DB_PATH_ENV;

/// Database file to use: an explicit path wins over `LOAD_DRIVER_DB`. `None`
/// means the caller should fall back to a scratch location.
pub fn db_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
  resolve_db_path(explicit, std::env::var_os(DB_PATH_ENV))
}

fn resolve_db_path(explicit: Option<PathBuf>, from_env: Option<OsString>) -> Option<PathBuf> {
  explicit.or_else(|| from_env.filter(|v| !v.is_empty()).map(PathBuf::from))
}
