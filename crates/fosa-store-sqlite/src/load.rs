//! Atomic table replacement from a rewritten dump.

use rusqlite::Connection;

use crate::schema::count_rows;

/// Row counts around a successful load.
pub struct Counts {
  pub before: u64,
  pub after:  u64,
}

/// Empty `table` and run `sql` in one transaction with foreign keys off.
///
/// SQLite ignores `PRAGMA foreign_keys` inside a transaction, so the pragma is
/// switched off before `BEGIN` and back on after commit or rollback, whatever
/// the outcome.
pub fn replace_table(conn: &mut Connection, table: &str, sql: &str) -> rusqlite::Result<Counts> {
  conn.pragma_update(None, "foreign_keys", false)?;
  let loaded = load_in_transaction(conn, table, sql);
  let restored = conn.pragma_update(None, "foreign_keys", true);
  let counts = loaded?;
  restored?;
  Ok(counts)
}

fn load_in_transaction(conn: &mut Connection, table: &str, sql: &str) -> rusqlite::Result<Counts> {
  // Dropped without commit on any early return, which rolls back.
  let tx = conn.transaction()?;
  let before = count_rows(&tx, table)?;
  tx.execute(&format!("DELETE FROM \"{table}\""), [])?;
  tx.execute_batch(sql)?;
  // The rewrite strips transaction control; a dump that still ended the
  // transaction must not be reported as loaded.
  if tx.is_autocommit() {
    return Err(rusqlite::Error::SqliteFailure(
      rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_MISUSE),
      Some("dump ended the load transaction".to_owned()),
    ));
  }
  let after = count_rows(&tx, table)?;
  tx.commit()?;
  Ok(Counts { before, after })
}
