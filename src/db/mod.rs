pub mod models;
pub mod queries;
pub mod schema;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::time::Duration;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// How long a connection waits on a locked database before failing.
const DB_BUSY_TIMEOUT_SECS: u64 = 5;

/// Timestamp format for every TEXT date column. `DATE()` in SQLite understands it.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Open (creating if missing) the SQLite store at `db_path`.
pub async fn connect(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(DB_BUSY_TIMEOUT_SECS));

    SqlitePoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .connect_with(options)
        .await
}

/// Current local time in the store's timestamp format.
pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    /// A pool over a fresh database file with every table created.
    /// Keep the `TempDir` alive for as long as the pool is used.
    pub async fn test_pool() -> (SqlitePool, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = super::connect(path.to_str().unwrap()).await.unwrap();
        super::schema::ensure_all(&pool).await.unwrap();
        (pool, dir)
    }
}
