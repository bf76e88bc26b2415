use super::errors::TaskServiceError;
use crate::handler::{HandlerNotFound, TaskHandler};
use chrono::{TimeDelta, Utc};
use docket_schema::repository::TaskRepository;
use docket_schema::specification::TaskSpecification;
use docket_schema::task::{Task, TaskState};
use docket_schema::RetryPolicy;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Orchestrates the task aggregate: creates tasks, lists them, and drives
/// the execute-task cycle (begin execution, run the handler, end execution,
/// persist with CAS) as one service-level operation.
pub struct TaskService {
    repository: Arc<dyn TaskRepository>,
    handler: Option<Arc<dyn TaskHandler>>,
}

impl TaskService {
    #[must_use]
    pub fn new(repository: Arc<dyn TaskRepository>, handler: Option<Arc<dyn TaskHandler>>) -> Self {
        Self { repository, handler }
    }

    pub async fn create_task(
        &self,
        args: Value,
        delay: TimeDelta,
        retry_policy: RetryPolicy,
        id: Option<Uuid>,
        schedule_id: Option<Uuid>,
    ) -> Result<Task, TaskServiceError> {
        let id = id.unwrap_or_else(Uuid::new_v4);
        let task = Task::create(Utc::now(), id, args, delay, retry_policy, schedule_id);
        self.repository.create_task(&task).await?;
        Ok(task)
    }

    pub async fn task(&self, id: Uuid) -> Result<Task, TaskServiceError> {
        Ok(self.repository.get_task(id).await?)
    }

    pub async fn list_tasks(&self, spec: &TaskSpecification) -> Result<Vec<Task>, TaskServiceError> {
        Ok(self.repository.list_tasks(spec).await?)
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<(), TaskServiceError> {
        Ok(self.repository.delete_task(id).await?)
    }

    pub async fn reactivate_task(&self, id: Uuid, delay: TimeDelta) -> Result<Task, TaskServiceError> {
        let mut task = self.repository.get_task(id).await?;
        task.reactivate(Utc::now(), delay)?;
        self.repository.update_task(&task, true).await?;
        Ok(task)
    }

    /// Tasks whose retention window (per the caller's `CleanupPolicy`) has
    /// elapsed since their last execution.
    pub async fn deletable_tasks(
        &self,
        succeeded_deadline: Option<chrono::DateTime<Utc>>,
        failed_deadline: Option<chrono::DateTime<Utc>>,
    ) -> Result<Vec<Task>, TaskServiceError> {
        let mut tasks = Vec::new();
        if let Some(deadline) = failed_deadline {
            let spec = TaskSpecification::builder()
                .state(TaskState::Failed)
                .last_execution_ended_before(deadline)
                .build();
            tasks.extend(self.repository.list_tasks(&spec).await?);
        }
        if let Some(deadline) = succeeded_deadline {
            let spec = TaskSpecification::builder()
                .state(TaskState::Succeeded)
                .last_execution_ended_before(deadline)
                .build();
            tasks.extend(self.repository.list_tasks(&spec).await?);
        }
        Ok(tasks)
    }

    pub async fn executable_tasks(&self) -> Result<Vec<Task>, TaskServiceError> {
        let spec = TaskSpecification::builder().state(TaskState::Active).ready_as_of(Utc::now()).build();
        Ok(self.repository.list_tasks(&spec).await?)
    }

    /// Runs one full execution cycle for `id`: begin, invoke the handler,
    /// end, and persist. The CAS on the final `update_task` is what makes
    /// two concurrent callers racing the same task id resolve to exactly
    /// one successful execution.
    pub async fn execute_task(&self, id: Uuid) -> Result<Task, TaskServiceError> {
        let mut task = self.repository.get_task(id).await?;
        let handler = self.handler.clone().ok_or(HandlerNotFound)?;

        task.begin_execution(Utc::now())?;

        let error = match handler.handle(&task.args).await {
            Ok(()) => None,
            Err(err) => Some(format!("{err:#}")),
        };

        task.end_execution(Utc::now(), error);
        self.repository.update_task(&task, false).await?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_schema::repository::InMemoryTaskRepository;
    use docket_schema::RetryPolicy;

    fn policy(max_attempts: u16) -> RetryPolicy {
        RetryPolicy::new(TimeDelta::seconds(1), 2.0, None, max_attempts)
    }

    fn service(handler: Option<Arc<dyn TaskHandler>>) -> TaskService {
        TaskService::new(Arc::new(InMemoryTaskRepository::new()), handler)
    }

    #[tokio::test]
    async fn execute_task_without_handler_reports_not_found() {
        let service = service(None);
        let task = service.create_task(Value::Null, TimeDelta::zero(), policy(3), None, None).await.unwrap();
        let err = service.execute_task(task.id).await.unwrap_err();
        assert!(matches!(err, TaskServiceError::HandlerNotFound(_)));
    }

    #[tokio::test]
    async fn successful_handler_marks_task_succeeded() {
        let handler: Arc<dyn TaskHandler> = Arc::new(|_args: Value| async move { Ok(()) });
        let service = service(Some(handler));
        let task = service.create_task(Value::Null, TimeDelta::zero(), policy(3), None, None).await.unwrap();
        let task = service.execute_task(task.id).await.unwrap();
        assert_eq!(task.state, TaskState::Succeeded);
    }

    #[tokio::test]
    async fn failing_handler_leaves_task_active_for_retry() {
        let handler: Arc<dyn TaskHandler> =
            Arc::new(|_args: Value| async move { Err(anyhow::anyhow!("boom")) });
        let service = service(Some(handler));
        let task = service.create_task(Value::Null, TimeDelta::zero(), policy(3), None, None).await.unwrap();
        let task = service.execute_task(task.id).await.unwrap();
        assert_eq!(task.state, TaskState::Active);
        assert_eq!(task.last_execution().unwrap().error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn deletable_tasks_filters_by_state_and_deadline() {
        let handler: Arc<dyn TaskHandler> = Arc::new(|_args: Value| async move { Ok(()) });
        let service = service(Some(handler));
        let task = service.create_task(Value::Null, TimeDelta::zero(), policy(1), None, None).await.unwrap();
        let executed = service.execute_task(task.id).await.unwrap();
        assert_eq!(executed.state, TaskState::Succeeded);

        let now = executed.last_execution_ended_at().unwrap();
        let none = service.deletable_tasks(Some(now - TimeDelta::seconds(1)), None).await.unwrap();
        assert!(none.is_empty());

        let some = service.deletable_tasks(Some(now + TimeDelta::seconds(1)), None).await.unwrap();
        assert_eq!(some.len(), 1);
    }
}
