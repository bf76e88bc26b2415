use super::errors::RepositoryError;
use crate::db::{Database, DatabaseError};
use crate::mapper;
use crate::schedule::Schedule;
use crate::specification::ScheduleSpecification;
use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn create_schedule(&self, schedule: &Schedule) -> Result<(), RepositoryError>;
    async fn get_schedule(&self, id: Uuid) -> Result<Schedule, RepositoryError>;
    async fn list_schedules(
        &self,
        spec: &ScheduleSpecification,
    ) -> Result<Vec<Schedule>, RepositoryError>;
    async fn delete_schedule(&self, id: Uuid) -> Result<(), RepositoryError>;
    async fn update_schedule(
        &self,
        schedule: &Schedule,
        synchronous: bool,
    ) -> Result<(), RepositoryError>;
}

pub struct SqliteScheduleRepository {
    db: std::sync::Arc<Database>,
}

impl SqliteScheduleRepository {
    #[must_use]
    pub fn new(db: std::sync::Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    async fn create_schedule(&self, schedule: &Schedule) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin_write(true).await?;
        let result = sqlx::query(
            "INSERT INTO schedules (id, version, created_at, ready_at, origin, interval, \
             retry_policy, enabled, task_args, task_retry_policy, task_sequence_number, \
             firings) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(schedule.id.to_string())
        .bind(schedule.version)
        .bind(mapper::dump_timestamp(schedule.created_at))
        .bind(mapper::dump_timestamp(schedule.ready_at))
        .bind(mapper::dump_timestamp(schedule.origin))
        .bind(mapper::dump_interval(schedule.interval))
        .bind(mapper::dump_retry_policy(&schedule.retry_policy))
        .bind(schedule.enabled)
        .bind(&schedule.task_args)
        .bind(mapper::dump_retry_policy(&schedule.task_retry_policy))
        .bind(schedule.task_sequence_number)
        .bind(mapper::dump_firings(&schedule.firings))
        .execute(tx.as_mut())
        .await;

        match result {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await?;
                Err(RepositoryError::AlreadyExists)
            }
            Err(err) => {
                tx.rollback().await.ok();
                Err(DatabaseError::from(err).into())
            }
        }
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Schedule, RepositoryError> {
        let mut tx = self.db.begin_read().await?;
        let row = sqlx::query(
            "SELECT id, version, created_at, ready_at, origin, interval, retry_policy, \
             enabled, task_args, task_retry_policy, task_sequence_number, firings \
             FROM schedules WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(tx.as_mut())
        .await
        .map_err(DatabaseError::from)?;
        tx.commit().await?;

        let row = row.ok_or(RepositoryError::NotFound)?;
        collect_schedule(&row)
    }

    async fn list_schedules(
        &self,
        spec: &ScheduleSpecification,
    ) -> Result<Vec<Schedule>, RepositoryError> {
        let mut tx = self.db.begin_read().await?;
        let rows = sqlx::query(
            "SELECT id, version, created_at, ready_at, origin, interval, retry_policy, \
             enabled, task_args, task_retry_policy, task_sequence_number, firings \
             FROM schedules \
             WHERE coalesce(enabled = ?, true) AND coalesce(ready_at <= ?, true)",
        )
        .bind(spec.enabled)
        .bind(spec.ready_as_of.map(mapper::dump_timestamp))
        .fetch_all(tx.as_mut())
        .await
        .map_err(DatabaseError::from)?;
        tx.commit().await?;

        rows.iter().map(collect_schedule).collect()
    }

    async fn delete_schedule(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin_write(true).await?;
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(id.to_string())
            .execute(tx.as_mut())
            .await
            .map_err(DatabaseError::from)?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_schedule(
        &self,
        schedule: &Schedule,
        synchronous: bool,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin_write(synchronous).await?;
        let result = sqlx::query(
            "UPDATE schedules SET version = version + 1, created_at = ?, ready_at = ?, \
             origin = ?, interval = ?, retry_policy = ?, enabled = ?, task_args = ?, \
             task_retry_policy = ?, task_sequence_number = ?, firings = ? \
             WHERE id = ? AND version = ?",
        )
        .bind(mapper::dump_timestamp(schedule.created_at))
        .bind(mapper::dump_timestamp(schedule.ready_at))
        .bind(mapper::dump_timestamp(schedule.origin))
        .bind(mapper::dump_interval(schedule.interval))
        .bind(mapper::dump_retry_policy(&schedule.retry_policy))
        .bind(schedule.enabled)
        .bind(&schedule.task_args)
        .bind(mapper::dump_retry_policy(&schedule.task_retry_policy))
        .bind(schedule.task_sequence_number)
        .bind(mapper::dump_firings(&schedule.firings))
        .bind(schedule.id.to_string())
        .bind(schedule.version)
        .execute(tx.as_mut())
        .await
        .map_err(DatabaseError::from)?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::UpdatedConcurrently);
        }
        Ok(())
    }
}

fn collect_schedule(row: &sqlx::sqlite::SqliteRow) -> Result<Schedule, RepositoryError> {
    let id: String = row.try_get(0).map_err(DatabaseError::from)?;
    let version: i64 = row.try_get(1).map_err(DatabaseError::from)?;
    let created_at: String = row.try_get(2).map_err(DatabaseError::from)?;
    let ready_at: String = row.try_get(3).map_err(DatabaseError::from)?;
    let origin: String = row.try_get(4).map_err(DatabaseError::from)?;
    let interval: f64 = row.try_get(5).map_err(DatabaseError::from)?;
    let retry_policy: serde_json::Value = row.try_get(6).map_err(DatabaseError::from)?;
    let enabled: bool = row.try_get(7).map_err(DatabaseError::from)?;
    let task_args: serde_json::Value = row.try_get(8).map_err(DatabaseError::from)?;
    let task_retry_policy: serde_json::Value = row.try_get(9).map_err(DatabaseError::from)?;
    let task_sequence_number: i64 = row.try_get(10).map_err(DatabaseError::from)?;
    let firings: serde_json::Value = row.try_get(11).map_err(DatabaseError::from)?;

    Ok(Schedule {
        id: id.parse().map_err(|e| decode_err("id", e))?,
        version,
        created_at: mapper::load_timestamp(&created_at).map_err(|e| decode_err("created_at", e))?,
        ready_at: mapper::load_timestamp(&ready_at).map_err(|e| decode_err("ready_at", e))?,
        origin: mapper::load_timestamp(&origin).map_err(|e| decode_err("origin", e))?,
        interval: mapper::load_interval(interval),
        retry_policy: mapper::load_retry_policy(&retry_policy)
            .map_err(|e| decode_err("retry_policy", e))?,
        enabled,
        task_args,
        task_retry_policy: mapper::load_retry_policy(&task_retry_policy)
            .map_err(|e| decode_err("task_retry_policy", e))?,
        task_sequence_number,
        firings: mapper::load_firings(&firings).map_err(|e| decode_err("firings", e))?,
    })
}

fn decode_err(column: &'static str, reason: impl ToString) -> RepositoryError {
    RepositoryError::from(DatabaseError::Decode {
        column,
        reason: reason.to_string(),
    })
}
