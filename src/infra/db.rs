// Shared SQLite plumbing: opening the pool and timestamp encoding.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;

/// Open (creating if needed) a SQLite database.
///
/// Accepts a bare path, a `sqlite://` URL, or `sqlite::memory:`.
pub async fn connect(database_url: &str) -> anyhow::Result<Pool<Sqlite>> {
    let in_memory = database_url.contains(":memory:");

    // Ensure the file exists if it's a file path
    let path_str = database_url.trim_start_matches("sqlite://");
    if !in_memory && !Path::new(path_str).exists() {
        if let Some(parent) = Path::new(path_str).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::File::create(path_str)?;
    }

    let conn_str = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite://{}", database_url)
    };

    // Every connection to :memory: is its own database, so keep just one
    let mut options = SqlitePoolOptions::new();
    if in_memory {
        options = options.max_connections(1);
    }

    Ok(options.connect(&conn_str).await?)
}

/// Fixed-width UTC encoding so timestamps compare correctly as strings.
pub fn to_db_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. A malformed value is an error, never "now".
pub fn from_db_time(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}
