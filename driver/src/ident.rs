//! Table and partition names that are interpolated into SQL text.
//!
//! Values always go through bound parameters. Names cannot, so every name that
//! ends up in a statement is an [`Ident`]: `[A-Za-z_][A-Za-z0-9_]*`, at most
//! [`MAX_IDENT_LEN`] bytes.

use std::fmt;

use crate::error::{Error, Result};

pub const MAX_IDENT_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
  pub fn new(name: impl Into<String>) -> Result<Self> {
    let name = name.into();
    if !is_valid(&name) {
      return Err(Error::InvalidIdentifier(name));
    }
    return Ok(Self(name));
  }

  /// Derives a new identifier by appending `suffix`, e.g. a side table name.
  pub fn with_suffix(&self, suffix: &str) -> Result<Self> {
    return Self::new(format!("{}_{suffix}", self.0));
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

fn is_valid(name: &str) -> bool {
  if name.is_empty() || name.len() > MAX_IDENT_LEN {
    return false;
  }
  let mut chars = name.chars();
  let first_ok = chars
    .next()
    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
  return first_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
}

impl fmt::Display for Ident {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl AsRef<str> for Ident {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

impl TryFrom<&str> for Ident {
  type Error = Error;

  fn try_from(name: &str) -> Result<Self> {
    Self::new(name)
  }
}
