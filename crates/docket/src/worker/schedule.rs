use super::base::PeriodicTask;
use crate::service::ScheduleService;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Polls for fireable (`enabled`, ready) schedules and fires each in turn.
/// Firing is sequential — unlike the execution worker there's no pool here,
/// since a single fire_schedule call is already a handful of fast
/// transactional operations, not an arbitrary user handler.
pub struct ScheduleWorker {
    schedule_service: Arc<ScheduleService>,
}

impl ScheduleWorker {
    #[must_use]
    pub fn new(schedule_service: Arc<ScheduleService>) -> Self {
        Self { schedule_service }
    }

    async fn fire(&self, id: Uuid) {
        tracing::debug!(%id, "firing schedule");
        match self.schedule_service.fire_schedule(id).await {
            Ok(schedule) => {
                let firing = schedule.last_firing();
                let duration = firing.and_then(|f| f.duration());
                let error = firing.and_then(|f| f.error.as_deref());
                tracing::info!(%id, ?duration, error, "fired schedule");
            }
            Err(error) => {
                tracing::debug!(%id, %error, "failed to fire schedule");
            }
        }
    }
}

#[async_trait]
impl PeriodicTask for ScheduleWorker {
    fn name(&self) -> &'static str {
        "docket::ScheduleWorker"
    }

    async fn work(&self) {
        loop {
            let schedules = match self.schedule_service.fireable_schedules().await {
                Ok(schedules) => schedules,
                Err(error) => {
                    tracing::error!(%error, "failed to list fireable schedules");
                    return;
                }
            };
            if schedules.is_empty() {
                return;
            }
            for schedule in schedules {
                self.fire(schedule.id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::TaskService;
    use chrono::TimeDelta;
    use docket_schema::repository::{InMemoryScheduleRepository, InMemoryTaskRepository};
    use docket_schema::RetryPolicy;
    use serde_json::Value;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(TimeDelta::seconds(1), 2.0, None, 3)
    }

    #[tokio::test]
    async fn work_fires_ready_schedules_until_none_remain() {
        let task_service = Arc::new(TaskService::new(Arc::new(InMemoryTaskRepository::new()), None));
        let schedule_service =
            Arc::new(ScheduleService::new(Arc::new(InMemoryScheduleRepository::new()), task_service));
        let schedule = schedule_service
            .create_schedule(TimeDelta::zero(), TimeDelta::seconds(3600), policy(), true, Value::Null, policy(), None)
            .await
            .unwrap();

        let worker = ScheduleWorker::new(Arc::clone(&schedule_service));
        worker.work().await;

        let fired = schedule_service.schedule(schedule.id).await.unwrap();
        assert_eq!(fired.task_sequence_number, 2);
        assert!(schedule_service.fireable_schedules().await.unwrap().is_empty());
    }
}
