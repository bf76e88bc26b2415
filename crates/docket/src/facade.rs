use crate::cleanup_policy::CleanupPolicy;
use crate::handler::TaskHandler;
use crate::service::{ScheduleService, ScheduleServiceError, TaskService, TaskServiceError};
use crate::settings::Settings;
use crate::worker::{CleanupWorker, ExecutionWorker, PeriodicTask, ScheduleWorker, WorkerHandle};
use chrono::TimeDelta;
use docket_schema::db::{Database, DatabaseError};
use docket_schema::repository::{SqliteScheduleRepository, SqliteTaskRepository};
use docket_schema::schedule::Schedule;
use docket_schema::specification::{ScheduleSpecification, TaskSpecification};
use docket_schema::task::Task;
use docket_schema::RetryPolicy;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Embedded entry point: owns the database, the task/schedule services, and
/// the three background workers. Construct with [`Docket::open`], call
/// [`Docket::start`] once the handler is registered, and [`Docket::stop`]
/// before dropping to let in-flight work finish cleanly.
pub struct Docket {
    task_service: Arc<TaskService>,
    schedule_service: Arc<ScheduleService>,
    settings: Settings,
    workers: Option<Workers>,
}

struct Workers {
    execution: WorkerHandle,
    schedule: WorkerHandle,
    cleanup: WorkerHandle,
}

impl Docket {
    /// Opens (creating if needed) the sqlite database at `url`, runs pending
    /// migrations, and wires up the task/schedule services. `handler`
    /// receives every due task's args; pass `None` to run a docket instance
    /// that only schedules and stores tasks (e.g. a producer-only process).
    pub async fn open(
        url: &str,
        settings: Settings,
        handler: Option<Arc<dyn TaskHandler>>,
    ) -> Result<Self, DatabaseError> {
        let db = Arc::new(Database::open(url, settings.read_pool_capacity()).await?);
        db.migrate().await?;

        let task_repository = Arc::new(SqliteTaskRepository::new(Arc::clone(&db)));
        let schedule_repository = Arc::new(SqliteScheduleRepository::new(db));

        let task_service = Arc::new(TaskService::new(task_repository, handler));
        let schedule_service = Arc::new(ScheduleService::new(schedule_repository, Arc::clone(&task_service)));

        Ok(Self {
            task_service,
            schedule_service,
            settings,
            workers: None,
        })
    }

    /// Starts the execution, schedule, and cleanup workers. A no-op if
    /// already started.
    pub fn start(&mut self) {
        if self.workers.is_some() {
            return;
        }

        let execution = WorkerHandle::spawn(
            ExecutionWorker::new(Arc::clone(&self.task_service), self.settings.execution_worker_threads),
            self.settings.execution_worker_interval,
        );
        let schedule = WorkerHandle::spawn(
            ScheduleWorker::new(Arc::clone(&self.schedule_service)),
            self.settings.schedule_worker_interval,
        );
        let cleanup_policy = CleanupPolicy {
            delete_succeeded_after: self.settings.delete_succeeded_after,
            delete_failed_after: self.settings.delete_failed_after,
        };
        let cleanup = WorkerHandle::spawn(
            CleanupWorker::new(Arc::clone(&self.task_service), cleanup_policy),
            self.settings.cleanup_worker_interval,
        );

        self.workers = Some(Workers {
            execution,
            schedule,
            cleanup,
        });
    }

    /// Stops the workers in reverse dependency order (cleanup, then
    /// execution, then schedule) and waits for each to exit. A no-op if not
    /// started. Workers can't stop themselves on `Drop` since that can't
    /// `.await` the in-flight loop iteration — see `worker::base`.
    pub async fn stop(&mut self) {
        let Some(workers) = self.workers.take() else {
            return;
        };
        workers.cleanup.stop().await;
        workers.execution.stop().await;
        workers.schedule.stop().await;
    }

    pub async fn create_task(
        &self,
        args: Value,
        delay: TimeDelta,
        retry_policy: Option<RetryPolicy>,
    ) -> Result<Task, TaskServiceError> {
        let retry_policy = retry_policy.unwrap_or(self.settings.default_retry_policy);
        self.task_service.create_task(args, delay, retry_policy, None, None).await
    }

    pub async fn task(&self, id: Uuid) -> Result<Task, TaskServiceError> {
        self.task_service.task(id).await
    }

    pub async fn tasks(&self, spec: &TaskSpecification) -> Result<Vec<Task>, TaskServiceError> {
        self.task_service.list_tasks(spec).await
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<(), TaskServiceError> {
        self.task_service.delete_task(id).await
    }

    pub async fn reactivate_task(&self, id: Uuid, delay: TimeDelta) -> Result<Task, TaskServiceError> {
        self.task_service.reactivate_task(id, delay).await
    }

    pub async fn create_schedule(
        &self,
        delay: TimeDelta,
        interval: TimeDelta,
        retry_policy: Option<RetryPolicy>,
        enabled: bool,
        task_args: Value,
        task_retry_policy: Option<RetryPolicy>,
    ) -> Result<Schedule, ScheduleServiceError> {
        let retry_policy = retry_policy.unwrap_or(self.settings.default_retry_policy);
        let task_retry_policy = task_retry_policy.unwrap_or(self.settings.default_retry_policy);
        self.schedule_service
            .create_schedule(delay, interval, retry_policy, enabled, task_args, task_retry_policy, None)
            .await
    }

    pub async fn schedule(&self, id: Uuid) -> Result<Schedule, ScheduleServiceError> {
        self.schedule_service.schedule(id).await
    }

    pub async fn schedules(&self, spec: &ScheduleSpecification) -> Result<Vec<Schedule>, ScheduleServiceError> {
        self.schedule_service.list_schedules(spec).await
    }

    pub async fn delete_schedule(&self, id: Uuid) -> Result<(), ScheduleServiceError> {
        self.schedule_service.delete_schedule(id).await
    }
}
