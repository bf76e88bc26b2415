use super::connection;
use super::errors::DatabaseError;
use super::transaction::Transaction;
use sqlx::{Row, SqlitePool};

/// Migration scripts embedded at compile time, keyed by the version they
/// advance `schema_version` to. Applied in ascending order by
/// [`Database::migrate`].
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../migrations/0001_schema_version.sql")),
    (2, include_str!("../../migrations/0002_tasks_and_schedules.sql")),
];

/// The three pools a docket instance keeps open: reads never queue behind
/// writes, the async-write pool batches ordinary mutations with relaxed
/// durability, and the sync-write pool flushes user-initiated writes
/// (create/delete/reactivate) to disk before returning.
pub struct Database {
    read_pool: SqlitePool,
    write_pool: SqlitePool,
    sync_write_pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the SQLite database at `url`, sizing the
    /// read pool to `read_pool_capacity` connections.
    pub async fn open(url: &str, read_pool_capacity: u32) -> Result<Self, DatabaseError> {
        let read_pool = connection::create_pool(url, false, read_pool_capacity).await?;
        let write_pool = connection::create_pool(url, false, 1).await?;
        let sync_write_pool = connection::create_pool(url, true, 1).await?;

        Ok(Self {
            read_pool,
            write_pool,
            sync_write_pool,
        })
    }

    /// Begins a read transaction (`BEGIN DEFERRED`) against the read pool.
    pub async fn begin_read(&self) -> Result<Transaction, DatabaseError> {
        let conn = self.read_pool.acquire().await?;
        Transaction::begin_deferred(conn).await
    }

    /// Begins a write transaction against either the async or sync-write
    /// pool, matching the original's `synchronous` flag on
    /// `Database.transaction`.
    pub async fn begin_write(&self, synchronous: bool) -> Result<Transaction, DatabaseError> {
        let pool = if synchronous {
            &self.sync_write_pool
        } else {
            &self.write_pool
        };
        let conn = pool.acquire().await?;
        Transaction::begin_immediate(conn).await
    }

    /// Runs every migration script whose version exceeds the database's
    /// current `schema_version`, advancing the tracking row inside the same
    /// transaction as the script.
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        let mut conn = self.write_pool.acquire().await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "INSERT INTO schema_version (version) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM schema_version)",
        )
        .execute(&mut *conn)
        .await?;
        let current_version: i64 = sqlx::query("SELECT version FROM schema_version")
            .fetch_one(&mut *conn)
            .await?
            .try_get(0)?;

        let mut pending: Vec<&(i64, &str)> = MIGRATIONS
            .iter()
            .filter(|(v, _)| *v > current_version)
            .collect();
        pending.sort_by_key(|(v, _)| *v);

        for (version, script) in pending {
            apply_migration(&mut conn, *version, script)
                .await
                .map_err(|source| DatabaseError::Migration {
                    version: *version,
                    source,
                })?;
            tracing::info!(version, "migrated database");
        }

        Ok(())
    }
}

async fn apply_migration(
    conn: &mut sqlx::pool::PoolConnection<sqlx::Sqlite>,
    version: i64,
    script: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("BEGIN IMMEDIATE").execute(&mut **conn).await?;
    let result: Result<(), sqlx::Error> = async {
        sqlx::raw_sql(script).execute(&mut **conn).await?;
        sqlx::query("UPDATE schema_version SET version = ?")
            .bind(version)
            .execute(&mut **conn)
            .await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            sqlx::query("COMMIT").execute(&mut **conn).await?;
            Ok(())
        }
        Err(err) => {
            sqlx::query("ROLLBACK").execute(&mut **conn).await.ok();
            Err(err)
        }
    }
}
