use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub type DbPool = SqlitePool;

pub async fn create_db_pool<P: AsRef<Path>>(
    db_path: P,
) -> Result<DbPool, Box<dyn std::error::Error>> {
    let db_path = db_path.as_ref();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database. Every connection to `:memory:` is a
/// separate database, so the pool is pinned to one connection that never expires.
pub async fn create_in_memory_pool() -> Result<DbPool, Box<dyn std::error::Error>> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}
