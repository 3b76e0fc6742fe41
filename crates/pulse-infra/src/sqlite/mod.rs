//! SQLite storage layer.
//!
//! Short-Term Store and embedding-cache backing store on SQLite with WAL mode
//! and split read/write connection pools.

pub mod embedding_cache;
pub mod pool;
pub mod short_term;

use chrono::{DateTime, SecondsFormat, Utc};

use pulse_types::error::RepositoryError;

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC timestamps, so SQL string comparison orders them correctly.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}
