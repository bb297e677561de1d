//! Error types for `fosa-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A table or column name that is not a plain SQL identifier.
  #[error("invalid SQL identifier: {0:?}")]
  InvalidIdentifier(String),

  /// A legacy or target table name handed to the dump rewriter was empty or
  /// not a plain identifier.
  #[error("invalid dump rewrite: {0}")]
  InvalidRewrite(String),

  #[error("unknown hierarchy level: {0:?}")]
  UnknownLevel(String),

  #[error("unknown schema step: {0:?}")]
  UnknownStep(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Accept only `[A-Za-z_][A-Za-z0-9_]*`, the subset of names that can be
/// spliced into SQL without quoting concerns.
pub fn validate_identifier(name: &str) -> Result<&str> {
  let mut chars = name.chars();
  let valid = match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {
      chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
    _ => false,
  };
  if valid {
    Ok(name)
  } else {
    Err(Error::InvalidIdentifier(name.to_owned()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_identifiers_pass() {
    assert!(validate_identifier("health_districts").is_ok());
    assert!(validate_identifier("_tmp2").is_ok());
  }

  #[test]
  fn hostile_identifiers_are_rejected() {
    for bad in ["", "1abc", "nom ds", "region;DROP", "`x`", "é"] {
      assert!(
        matches!(validate_identifier(bad), Err(Error::InvalidIdentifier(_))),
        "{bad:?} should be rejected"
      );
    }
  }
}
