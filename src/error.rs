//! Error types for statistics compilation and queries
//!
//! Storage failures are split into transient (SQLite busy/locked, worth a
//! retry) and permanent. Source failures never leave the compiler; they only
//! drop that source's contribution for one cycle.

use rusqlite::ErrorCode;
use std::time::Duration;

#[derive(Debug)]
pub enum StatisticsError {
    Database(rusqlite::Error),
    Io(std::io::Error),
    InvalidTimestamp(i64),
    Config(String),
    /// Background write task panicked or was cancelled
    Task(String),
}

impl StatisticsError {
    /// True when re-running the same unit of work may succeed
    /// (another writer holds the database lock).
    pub fn is_transient(&self) -> bool {
        match self {
            StatisticsError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for StatisticsError {
    fn from(err: rusqlite::Error) -> Self {
        StatisticsError::Database(err)
    }
}

impl From<tokio::task::JoinError> for StatisticsError {
    fn from(err: tokio::task::JoinError) -> Self {
        StatisticsError::Task(err.to_string())
    }
}

impl From<std::io::Error> for StatisticsError {
    fn from(err: std::io::Error) -> Self {
        StatisticsError::Io(err)
    }
}

impl std::fmt::Display for StatisticsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatisticsError::Database(e) => write!(f, "Database error: {}", e),
            StatisticsError::Io(e) => write!(f, "IO error: {}", e),
            StatisticsError::InvalidTimestamp(ts) => {
                write!(f, "Invalid stored timestamp: {}", ts)
            }
            StatisticsError::Config(msg) => write!(f, "Invalid configuration value: {}", msg),
            StatisticsError::Task(msg) => write!(f, "Background task failed: {}", msg),
        }
    }
}

impl std::error::Error for StatisticsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatisticsError::Database(e) => Some(e),
            StatisticsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Failure of a single source during one compilation cycle
#[derive(Debug)]
pub enum SourceError {
    Failed(String),
    Timeout(Duration),
    Panicked(String),
    Malformed(String),
}

impl From<rusqlite::Error> for SourceError {
    fn from(err: rusqlite::Error) -> Self {
        SourceError::Failed(err.to_string())
    }
}

impl From<StatisticsError> for SourceError {
    fn from(err: StatisticsError) -> Self {
        SourceError::Failed(err.to_string())
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Failed(msg) => write!(f, "Source failed: {}", msg),
            SourceError::Timeout(after) => write!(f, "Source timed out after {:?}", after),
            SourceError::Panicked(msg) => write!(f, "Source panicked: {}", msg),
            SourceError::Malformed(msg) => write!(f, "Malformed aggregate: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: ErrorCode) -> StatisticsError {
        let extended = match code {
            ErrorCode::DatabaseBusy => 5,
            ErrorCode::DatabaseLocked => 6,
            _ => 1,
        };
        StatisticsError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code,
                extended_code: extended,
            },
            None,
        ))
    }

    #[test]
    fn test_busy_and_locked_are_transient() {
        assert!(sqlite_failure(ErrorCode::DatabaseBusy).is_transient());
        assert!(sqlite_failure(ErrorCode::DatabaseLocked).is_transient());
    }

    #[test]
    fn test_other_errors_are_permanent() {
        assert!(!sqlite_failure(ErrorCode::ConstraintViolation).is_transient());
        assert!(!StatisticsError::Database(rusqlite::Error::InvalidQuery).is_transient());
        assert!(!StatisticsError::Config("bad".to_string()).is_transient());
        assert!(!StatisticsError::InvalidTimestamp(-1).is_transient());
    }

    #[test]
    fn test_display_messages() {
        let err = StatisticsError::Config("STATS_ON_CONFLICT=merge".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid configuration value: STATS_ON_CONFLICT=merge"
        );

        let err = SourceError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Source timed out after 250ms");
    }
}
