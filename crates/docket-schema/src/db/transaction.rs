use super::errors::DatabaseError;
use sqlx::Sqlite;

/// A hand-managed transaction, grounded on the read/write split
/// `BEGIN DEFERRED` / `BEGIN IMMEDIATE` makes in SQLite: readers never block
/// writers as long as they open with `DEFERRED`, and a single writer opens
/// with `IMMEDIATE` to fail fast on a busy database instead of deadlocking
/// with another writer mid-transaction. `sqlx`'s own `Transaction` type
/// always issues a plain `BEGIN`, so the mode distinction is hand-rolled
/// here on top of an owned pooled connection.
pub struct Transaction {
    conn: sqlx::pool::PoolConnection<Sqlite>,
    finished: bool,
}

impl Transaction {
    pub async fn begin_deferred(
        conn: sqlx::pool::PoolConnection<Sqlite>,
    ) -> Result<Self, DatabaseError> {
        Self::begin(conn, "DEFERRED").await
    }

    pub async fn begin_immediate(
        conn: sqlx::pool::PoolConnection<Sqlite>,
    ) -> Result<Self, DatabaseError> {
        Self::begin(conn, "IMMEDIATE").await
    }

    async fn begin(
        mut conn: sqlx::pool::PoolConnection<Sqlite>,
        mode: &str,
    ) -> Result<Self, DatabaseError> {
        sqlx::query(&format!("BEGIN {mode}"))
            .execute(&mut *conn)
            .await?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    pub fn as_mut(&mut self) -> &mut sqlx::pool::PoolConnection<Sqlite> {
        &mut self.conn
    }

    pub async fn commit(mut self) -> Result<(), DatabaseError> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), DatabaseError> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                "transaction dropped without an explicit commit or rollback; the \
                 connection may be returned to its pool with an open transaction"
            );
        }
    }
}
