use super::errors::DatabaseError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// Builds one of the three named pools: `max_connections` fixes its size
/// (no growing/shrinking on demand, matching the original's eagerly-opened
/// connection list), and `synchronous_full` picks the pragma the sync-write
/// pool needs for durability against a power loss versus the relaxed
/// setting the read and async-write pools use for throughput.
pub async fn create_pool(
    url: &str,
    synchronous_full: bool,
    max_connections: u32,
) -> Result<SqlitePool, DatabaseError> {
    let synchronous = if synchronous_full {
        SqliteSynchronous::Full
    } else {
        SqliteSynchronous::Normal
    };
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .synchronous(synchronous)
        .disable_statement_logging();

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    Ok(pool)
}
