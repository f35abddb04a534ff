//! Shared SQLite connection tuning
//!
//! Every pooled session runs through `apply_optimized_pragmas` so readers and
//! the hourly compiler can share one database file: WAL lets queries proceed
//! while a compilation transaction is open, and the busy timeout turns short
//! lock contention into a wait instead of an immediate SQLITE_BUSY.

use rusqlite::Connection;
use std::time::Duration;

/// Lock wait before SQLite reports SQLITE_BUSY
pub const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// WAL pages between automatic checkpoints
pub const WAL_AUTOCHECKPOINT_PAGES: i64 = 1_000;

pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "mmap_size", 268_435_456i64)?;
    // Negative value = size in KiB
    conn.pragma_update(None, "cache_size", -16_000i64)?;
    conn.pragma_update(None, "wal_autocheckpoint", WAL_AUTOCHECKPOINT_PAGES)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}
