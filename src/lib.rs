//! Hourly statistics compilation over pluggable sources, persisted to SQLite

pub mod config;
pub mod error;
pub mod sources;
pub mod sqlite_pragma;
pub mod statistics;

pub use config::StatisticsConfig;
pub use error::{SourceError, StatisticsError};
