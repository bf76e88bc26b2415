use super::errors::ScheduleServiceError;
use super::task_service::TaskService;
use chrono::{TimeDelta, Utc};
use docket_schema::repository::{RepositoryError, ScheduleRepository};
use docket_schema::schedule::Schedule;
use docket_schema::specification::ScheduleSpecification;
use docket_schema::RetryPolicy;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Orchestrates the schedule aggregate: creates schedules, lists them, and
/// fires them — each firing idempotently creates the schedule's next task.
pub struct ScheduleService {
    repository: Arc<dyn ScheduleRepository>,
    task_service: Arc<TaskService>,
}

impl ScheduleService {
    #[must_use]
    pub fn new(repository: Arc<dyn ScheduleRepository>, task_service: Arc<TaskService>) -> Self {
        Self {
            repository,
            task_service,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_schedule(
        &self,
        delay: TimeDelta,
        interval: TimeDelta,
        retry_policy: RetryPolicy,
        enabled: bool,
        task_args: Value,
        task_retry_policy: RetryPolicy,
        id: Option<Uuid>,
    ) -> Result<Schedule, ScheduleServiceError> {
        let id = id.unwrap_or_else(Uuid::new_v4);
        let schedule = Schedule::create(
            Utc::now(),
            id,
            delay,
            interval,
            retry_policy,
            enabled,
            task_args,
            task_retry_policy,
        );
        self.repository.create_schedule(&schedule).await?;
        Ok(schedule)
    }

    pub async fn schedule(&self, id: Uuid) -> Result<Schedule, ScheduleServiceError> {
        Ok(self.repository.get_schedule(id).await?)
    }

    pub async fn list_schedules(
        &self,
        spec: &ScheduleSpecification,
    ) -> Result<Vec<Schedule>, ScheduleServiceError> {
        Ok(self.repository.list_schedules(spec).await?)
    }

    pub async fn delete_schedule(&self, id: Uuid) -> Result<(), ScheduleServiceError> {
        Ok(self.repository.delete_schedule(id).await?)
    }

    pub async fn fireable_schedules(&self) -> Result<Vec<Schedule>, ScheduleServiceError> {
        let spec = ScheduleSpecification::builder()
            .enabled(true)
            .ready_as_of(Utc::now())
            .build();
        Ok(self.repository.list_schedules(&spec).await?)
    }

    /// Begins a firing, creates the schedule's next task (ignoring
    /// `AlreadyExists` — that's the idempotency token doing its job after a
    /// crash mid-firing), ends the firing, and persists with CAS.
    pub async fn fire_schedule(&self, id: Uuid) -> Result<Schedule, ScheduleServiceError> {
        let mut schedule = self.repository.get_schedule(id).await?;
        schedule.begin_firing(Utc::now())?;

        let task_id = schedule.generate_task_id();
        let create_result = self
            .task_service
            .create_task(
                schedule.task_args.clone(),
                TimeDelta::zero(),
                schedule.task_retry_policy,
                Some(task_id),
                Some(schedule.id),
            )
            .await;

        let error = match create_result {
            Ok(_) => None,
            Err(err) if is_already_exists(&err) => None,
            Err(err) => Some(err.to_string()),
        };

        schedule.end_firing(Utc::now(), error)?;
        self.repository.update_schedule(&schedule, false).await?;
        Ok(schedule)
    }
}

fn is_already_exists(err: &super::errors::TaskServiceError) -> bool {
    matches!(
        err,
        super::errors::TaskServiceError::Repository(RepositoryError::AlreadyExists)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_schema::repository::{InMemoryScheduleRepository, InMemoryTaskRepository};
    use docket_schema::RetryPolicy;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(TimeDelta::seconds(1), 2.0, None, 3)
    }

    fn service() -> ScheduleService {
        let task_service = Arc::new(TaskService::new(Arc::new(InMemoryTaskRepository::new()), None));
        ScheduleService::new(Arc::new(InMemoryScheduleRepository::new()), task_service)
    }

    #[tokio::test]
    async fn firing_creates_a_task_and_advances_the_schedule() {
        let service = service();
        let schedule = service
            .create_schedule(TimeDelta::zero(), TimeDelta::seconds(10), policy(), true, Value::Null, policy(), None)
            .await
            .unwrap();

        let fired = service.fire_schedule(schedule.id).await.unwrap();
        assert_eq!(fired.task_sequence_number, 2);

        let task_id = Schedule::task_id_for(schedule.id, 1);
        let task = service.task_service.task(task_id).await.unwrap();
        assert_eq!(task.schedule_id, Some(schedule.id));
    }

    #[tokio::test]
    async fn refiring_after_task_already_exists_still_advances() {
        let service = service();
        let schedule = service
            .create_schedule(TimeDelta::zero(), TimeDelta::seconds(10), policy(), true, Value::Null, policy(), None)
            .await
            .unwrap();

        let task_id = Schedule::task_id_for(schedule.id, schedule.task_sequence_number);
        service
            .task_service
            .create_task(Value::Null, TimeDelta::zero(), policy(), Some(task_id), Some(schedule.id))
            .await
            .unwrap();

        let fired = service.fire_schedule(schedule.id).await.unwrap();
        assert_eq!(fired.task_sequence_number, 2);
        assert!(fired.last_firing().unwrap().error.is_none());
    }

    #[tokio::test]
    async fn disabled_schedule_is_not_fireable() {
        let service = service();
        service
            .create_schedule(TimeDelta::zero(), TimeDelta::seconds(10), policy(), false, Value::Null, policy(), None)
            .await
            .unwrap();

        assert!(service.fireable_schedules().await.unwrap().is_empty());
    }
}
