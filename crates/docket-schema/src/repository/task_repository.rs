use super::errors::RepositoryError;
use crate::db::{Database, DatabaseError};
use crate::mapper;
use crate::specification::TaskSpecification;
use crate::task::Task;
use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

/// The narrow surface services depend on: create, get, list-by-spec,
/// delete, CAS update. An in-memory implementation ([`super::memory`])
/// slots in unchanged for tests.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create_task(&self, task: &Task) -> Result<(), RepositoryError>;
    async fn get_task(&self, id: Uuid) -> Result<Task, RepositoryError>;
    async fn list_tasks(&self, spec: &TaskSpecification) -> Result<Vec<Task>, RepositoryError>;
    async fn delete_task(&self, id: Uuid) -> Result<(), RepositoryError>;
    async fn update_task(&self, task: &Task, synchronous: bool) -> Result<(), RepositoryError>;
}

pub struct SqliteTaskRepository {
    db: std::sync::Arc<Database>,
}

impl SqliteTaskRepository {
    #[must_use]
    pub fn new(db: std::sync::Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create_task(&self, task: &Task) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin_write(true).await?;
        let last_execution_ended_at = task.last_execution_ended_at().map(mapper::dump_timestamp);
        let result = sqlx::query(
            "INSERT INTO tasks (id, version, created_at, args, state, ready_at, \
             retry_policy, executions, last_execution_ended_at, schedule_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.to_string())
        .bind(task.version)
        .bind(mapper::dump_timestamp(task.created_at))
        .bind(&task.args)
        .bind(mapper::dump_task_state(task.state))
        .bind(mapper::dump_timestamp(task.ready_at))
        .bind(mapper::dump_retry_policy(&task.retry_policy))
        .bind(mapper::dump_executions(&task.executions))
        .bind(last_execution_ended_at)
        .bind(task.schedule_id.map(|id| id.to_string()))
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

    async fn get_task(&self, id: Uuid) -> Result<Task, RepositoryError> {
        let mut tx = self.db.begin_read().await?;
        let row = sqlx::query(
            "SELECT id, version, created_at, args, state, ready_at, retry_policy, \
             executions, schedule_id FROM tasks WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(tx.as_mut())
        .await
        .map_err(DatabaseError::from)?;
        tx.commit().await?;

        let row = row.ok_or(RepositoryError::NotFound)?;
        collect_task(&row).map_err(RepositoryError::from)
    }

    async fn list_tasks(&self, spec: &TaskSpecification) -> Result<Vec<Task>, RepositoryError> {
        let mut tx = self.db.begin_read().await?;
        let rows = sqlx::query(
            "SELECT id, version, created_at, args, state, ready_at, retry_policy, \
             executions, schedule_id FROM tasks \
             WHERE coalesce(state = ?, true) \
             AND coalesce(ready_at <= ?, true) \
             AND coalesce(last_execution_ended_at <= ?, true)",
        )
        .bind(spec.state.map(mapper::dump_task_state))
        .bind(spec.ready_as_of.map(mapper::dump_timestamp))
        .bind(spec.last_execution_ended_before.map(mapper::dump_timestamp))
        .fetch_all(tx.as_mut())
        .await
        .map_err(DatabaseError::from)?;
        tx.commit().await?;

        rows.iter().map(collect_task).collect()
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin_write(true).await?;
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
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

    async fn update_task(&self, task: &Task, synchronous: bool) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin_write(synchronous).await?;
        let last_execution_ended_at = task.last_execution_ended_at().map(mapper::dump_timestamp);
        let result = sqlx::query(
            "UPDATE tasks SET version = version + 1, created_at = ?, args = ?, state = ?, \
             ready_at = ?, retry_policy = ?, executions = ?, last_execution_ended_at = ?, \
             schedule_id = ? WHERE id = ? AND version = ?",
        )
        .bind(mapper::dump_timestamp(task.created_at))
        .bind(&task.args)
        .bind(mapper::dump_task_state(task.state))
        .bind(mapper::dump_timestamp(task.ready_at))
        .bind(mapper::dump_retry_policy(&task.retry_policy))
        .bind(mapper::dump_executions(&task.executions))
        .bind(last_execution_ended_at)
        .bind(task.schedule_id.map(|id| id.to_string()))
        .bind(task.id.to_string())
        .bind(task.version)
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

fn collect_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, RepositoryError> {
    let id: String = row.try_get(0).map_err(DatabaseError::from)?;
    let version: i64 = row.try_get(1).map_err(DatabaseError::from)?;
    let created_at: String = row.try_get(2).map_err(DatabaseError::from)?;
    let args: serde_json::Value = row.try_get(3).map_err(DatabaseError::from)?;
    let state: String = row.try_get(4).map_err(DatabaseError::from)?;
    let ready_at: String = row.try_get(5).map_err(DatabaseError::from)?;
    let retry_policy: serde_json::Value = row.try_get(6).map_err(DatabaseError::from)?;
    let executions: serde_json::Value = row.try_get(7).map_err(DatabaseError::from)?;
    let schedule_id: Option<String> = row.try_get(8).map_err(DatabaseError::from)?;

    Ok(Task {
        id: id.parse().map_err(|e| decode_err("id", e))?,
        version,
        created_at: mapper::load_timestamp(&created_at).map_err(|e| decode_err("created_at", e))?,
        args,
        state: mapper::load_task_state(&state)
            .ok_or_else(|| decode_err("state", format!("unrecognized task state {state:?}")))?,
        ready_at: mapper::load_timestamp(&ready_at).map_err(|e| decode_err("ready_at", e))?,
        retry_policy: mapper::load_retry_policy(&retry_policy)
            .map_err(|e| decode_err("retry_policy", e))?,
        executions: mapper::load_executions(&executions).map_err(|e| decode_err("executions", e))?,
        schedule_id: schedule_id
            .map(|id| id.parse())
            .transpose()
            .map_err(|e| decode_err("schedule_id", e))?,
    })
}

fn decode_err(column: &'static str, reason: impl ToString) -> RepositoryError {
    RepositoryError::from(DatabaseError::Decode {
        column,
        reason: reason.to_string(),
    })
}
