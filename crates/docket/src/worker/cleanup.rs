use super::base::PeriodicTask;
use crate::cleanup_policy::CleanupPolicy;
use crate::service::{TaskService, TaskServiceError};
use async_trait::async_trait;
use chrono::Utc;
use docket_schema::repository::RepositoryError;
use std::sync::Arc;

/// Sweeps terminal tasks past their retention deadline and deletes them.
pub struct CleanupWorker {
    task_service: Arc<TaskService>,
    cleanup_policy: CleanupPolicy,
}

impl CleanupWorker {
    #[must_use]
    pub fn new(task_service: Arc<TaskService>, cleanup_policy: CleanupPolicy) -> Self {
        Self {
            task_service,
            cleanup_policy,
        }
    }
}

#[async_trait]
impl PeriodicTask for CleanupWorker {
    fn name(&self) -> &'static str {
        "docket::CleanupWorker"
    }

    async fn work(&self) {
        let now = Utc::now();
        let deletable = self
            .task_service
            .deletable_tasks(
                self.cleanup_policy.succeeded_deadline(now),
                self.cleanup_policy.failed_deadline(now),
            )
            .await;

        let deletable = match deletable {
            Ok(tasks) => tasks,
            Err(error) => {
                tracing::error!(%error, "failed to list deletable tasks");
                return;
            }
        };

        for task in deletable {
            tracing::debug!(id = %task.id, "deleting task");
            match self.task_service.delete_task(task.id).await {
                Ok(()) => tracing::info!(id = %task.id, "deleted task"),
                Err(TaskServiceError::Repository(RepositoryError::Database(error))) => {
                    tracing::error!(id = %task.id, %error, "failed to delete task");
                }
                Err(error) => {
                    tracing::debug!(id = %task.id, %error, "failed to delete task");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use docket_schema::repository::InMemoryTaskRepository;
    use docket_schema::task::TaskState;
    use docket_schema::RetryPolicy;
    use serde_json::Value;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(TimeDelta::seconds(1), 2.0, None, 1)
    }

    #[tokio::test]
    async fn work_deletes_succeeded_tasks_past_their_deadline() {
        let handler: Arc<dyn crate::handler::TaskHandler> = Arc::new(|_args: Value| async move { Ok(()) });
        let task_service = Arc::new(TaskService::new(Arc::new(InMemoryTaskRepository::new()), Some(handler)));
        let task = task_service
            .create_task(Value::Null, TimeDelta::zero(), policy(), None, None)
            .await
            .unwrap();
        let task = task_service.execute_task(task.id).await.unwrap();
        assert_eq!(task.state, TaskState::Succeeded);

        let worker = CleanupWorker::new(
            Arc::clone(&task_service),
            CleanupPolicy {
                delete_succeeded_after: Some(TimeDelta::zero()),
                delete_failed_after: None,
            },
        );
        worker.work().await;

        assert!(matches!(
            task_service.task(task.id).await,
            Err(TaskServiceError::Repository(RepositoryError::NotFound))
        ));
    }

    #[tokio::test]
    async fn work_leaves_active_tasks_alone() {
        let task_service = Arc::new(TaskService::new(Arc::new(InMemoryTaskRepository::new()), None));
        let task = task_service
            .create_task(Value::Null, TimeDelta::zero(), policy(), None, None)
            .await
            .unwrap();

        let worker = CleanupWorker::new(
            Arc::clone(&task_service),
            CleanupPolicy {
                delete_succeeded_after: Some(TimeDelta::zero()),
                delete_failed_after: Some(TimeDelta::zero()),
            },
        );
        worker.work().await;

        assert!(task_service.task(task.id).await.is_ok());
    }
}
