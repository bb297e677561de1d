//! Rewriting of SQL dumps before a bulk load.
//!
//! Dumps exported from the legacy database insert into the legacy table name
//! and wrap everything in their own transaction and session settings. The
//! loader runs the dump inside its own transaction, so those statements are
//! stripped and the inserts are pointed at the target table.
//!
//! Stripping works statement by statement, so it does not matter how a dump
//! tool lays statements out over lines.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result, entity::Level, error::validate_identifier};

// ─── Targets ─────────────────────────────────────────────────────────────────

/// A table that may be replaced wholesale by a dump.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TargetTable {
  Regions,
  Departments,
  Arrondissements,
  HealthDistricts,
  HealthAreas,
}

impl TargetTable {
  pub fn level(self) -> Level {
    match self {
      Self::Regions => Level::Region,
      Self::Departments => Level::Department,
      Self::Arrondissements => Level::Arrondissement,
      Self::HealthDistricts => Level::HealthDistrict,
      Self::HealthAreas => Level::HealthArea,
    }
  }

  pub fn table(self) -> &'static str { self.level().table() }
}

/// Outcome of a bulk load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
  pub table:               TargetTable,
  /// Row counts around the load. Advisory only.
  pub rows_before:         u64,
  pub rows_after:          u64,
  pub inserts_redirected:  usize,
  pub statements_stripped: usize,
  pub foreign_inserts:     usize,
}

// ─── Rewrite ─────────────────────────────────────────────────────────────────

/// Transaction-control, session and lock statements. Matched against the head
/// of one statement.
static STRIPPED: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(concat!(
    r"(?is)\A(?:",
    r"(?:START\s+TRANSACTION|BEGIN(?:\s+(?:DEFERRED|IMMEDIATE|EXCLUSIVE))?(?:\s+(?:TRANSACTION|WORK))?",
    r"|COMMIT(?:\s+(?:TRANSACTION|WORK))?|END(?:\s+TRANSACTION)?|ROLLBACK(?:\s+(?:TRANSACTION|WORK))?)",
    r"\s*(?:;\s*)?\z",
    r"|SET\s|LOCK\s+TABLES\b|UNLOCK\s+TABLES\b|/\*![0-9]+\s+SET\s",
    r")",
  ))
  .expect("stripped statement pattern is valid")
});

/// Savepoints cannot be stripped without changing what the dump means.
static REFUSED: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\A(?:SAVEPOINT\b|RELEASE\b|ROLLBACK\s+(?:(?:TRANSACTION|WORK)\s+)?TO\b)")
    .expect("refused statement pattern is valid")
});

static ANY_INSERT: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)\AINSERT\s+INTO\s").expect("insert pattern is valid"));

/// A dump ready to be executed against the target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRewrite {
  pub sql:                 String,
  /// `INSERT INTO <legacy>` statements pointed at the target table.
  pub inserts_redirected:  usize,
  /// Transaction-control, session and lock statements removed.
  pub statements_stripped: usize,
  /// Inserts into tables other than the legacy one, left untouched.
  pub foreign_inserts:     usize,
}

/// Rewrite `sql` so that inserts into `legacy` land in `target`.
///
/// The dump is split into statements first, so a `COMMIT;` sharing a line
/// with an insert is stripped like any other. Only the leading
/// `INSERT INTO <legacy>` clause of a statement is rewritten, whether the name
/// is backtick-quoted, double-quoted or bare. A longer identifier that merely
/// starts with the legacy name (`district_archive`) is left alone.
///
/// A savepoint statement is refused: the dump is rejected as a whole.
pub fn rewrite_dump(sql: &str, legacy: &str, target: &str) -> Result<DumpRewrite> {
  let legacy = validate_identifier(legacy)
    .map_err(|_| Error::InvalidRewrite(format!("legacy table name {legacy:?}")))?;
  let target = validate_identifier(target)
    .map_err(|_| Error::InvalidRewrite(format!("target table name {target:?}")))?;

  let name = regex::escape(legacy);
  let legacy_insert = Regex::new(&format!(
    r#"(?i:\AINSERT\s+INTO)\s+(?:`{name}`|"{name}"|{name}\b)"#
  ))
  .map_err(|e| Error::InvalidRewrite(e.to_string()))?;

  let mut out = DumpRewrite {
    sql:                 String::with_capacity(sql.len()),
    inserts_redirected:  0,
    statements_stripped: 0,
    foreign_inserts:     0,
  };

  for statement in split_statements(sql) {
    let head = statement_head(statement);
    if REFUSED.is_match(head) {
      let shown: String = head.chars().take(40).collect();
      return Err(Error::InvalidRewrite(format!(
        "dump opens or releases a savepoint ({shown:?})"
      )));
    }
    if STRIPPED.is_match(head) {
      out.statements_stripped += 1;
      continue;
    }

    out.sql.push_str(&statement[..statement.len() - head.len()]);
    if legacy_insert.is_match(head) {
      out.inserts_redirected += 1;
      out.sql.push_str(&legacy_insert.replace(head, |_: &Captures<'_>| {
        format!("INSERT INTO \"{target}\"")
      }));
    } else {
      if ANY_INSERT.is_match(head) {
        out.foreign_inserts += 1;
      }
      out.sql.push_str(head);
    }
  }

  if out.foreign_inserts > 0 {
    tracing::warn!(
      legacy,
      foreign_inserts = out.foreign_inserts,
      "dump inserts into tables other than the legacy table; they are kept as-is"
    );
  }

  Ok(out)
}

/// Split `sql` after every `;` that is not inside a quoted string, a quoted
/// identifier or a comment. Trailing text without a `;` forms the last piece.
fn split_statements(sql: &str) -> Vec<&str> {
  let bytes = sql.as_bytes();
  let mut pieces = Vec::new();
  let mut start = 0;
  let mut i = 0;

  while i < bytes.len() {
    match bytes[i] {
      // A doubled quote closes and reopens, which skips it correctly.
      quote @ (b'\'' | b'"' | b'`') => {
        i += 1;
        while i < bytes.len() && bytes[i] != quote {
          i += 1;
        }
      }
      b'-' if bytes.get(i + 1) == Some(&b'-') => {
        while i < bytes.len() && bytes[i] != b'\n' {
          i += 1;
        }
      }
      b'/' if bytes.get(i + 1) == Some(&b'*') => {
        i += 2;
        while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
          i += 1;
        }
        i += 1;
      }
      b';' => {
        pieces.push(&sql[start..=i]);
        start = i + 1;
      }
      _ => {}
    }
    i += 1;
  }

  if start < sql.len() {
    pieces.push(&sql[start..]);
  }
  pieces
}

/// The statement with leading whitespace and plain comments removed. MySQL
/// versioned comments (`/*!40101 ... */`) count as statement text.
fn statement_head(statement: &str) -> &str {
  let mut s = statement.trim_start();
  loop {
    if let Some(rest) = s.strip_prefix("--") {
      s = rest.split_once('\n').map_or("", |(_, r)| r).trim_start();
    } else if s.starts_with("/*") && !s.starts_with("/*!") {
      s = s[2..].split_once("*/").map_or("", |(_, r)| r).trim_start();
    } else {
      return s;
    }
  }
}
