//! Scoped SQLite sessions
//!
//! `SessionPool::session()` lends out a connection wrapped in a `Session`
//! guard. Dropping the guard (normal return, `?` early exit, or unwinding)
//! hands the connection back to the idle list, so neither the compiler nor
//! the query engine ever holds a connection beyond one unit of work.

use crate::error::StatisticsError;
use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Compiled statements kept per connection (query shapes + insert)
const STATEMENT_CACHE_CAPACITY: usize = 16;

pub struct SessionPool {
    db_path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
    opened: AtomicUsize,
}

impl SessionPool {
    pub fn new(db_path: impl AsRef<Path>, max_idle: usize) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle: max_idle.max(1),
            opened: AtomicUsize::new(0),
        }
    }

    /// Borrow a connection for one scoped unit of work
    pub fn session(&self) -> Result<Session<'_>, StatisticsError> {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let conn = match pooled {
            Some(conn) => conn,
            None => self.open_connection()?,
        };

        Ok(Session {
            conn: Some(conn),
            pool: self,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total connections opened over the pool's lifetime
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    fn open_connection(&self) -> Result<Connection, StatisticsError> {
        let conn = Connection::open(&self.db_path)?;
        apply_optimized_pragmas(&conn)?;
        conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);

        let total = self.opened.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("🔌 Opened SQLite session #{} on {}", total, self.db_path.display());
        Ok(conn)
    }

    fn release(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
        // Over capacity: connection closes when dropped here
    }
}

/// Connection on loan from a `SessionPool`
pub struct Session<'a> {
    conn: Option<Connection>,
    pool: &'a SessionPool,
}

impl Deref for Session<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("session connection is only taken on drop")
    }
}

impl DerefMut for Session<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("session connection is only taken on drop")
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
