//! In-memory repository doubles. Grounded on the spec's own design note
//! that a second backend should slot in unchanged — these back the test
//! suite without touching SQLite at all.

use super::errors::RepositoryError;
use super::{ScheduleRepository, TaskRepository};
use crate::schedule::Schedule;
use crate::specification::{ScheduleSpecification, TaskSpecification};
use crate::task::Task;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<HashMap<Uuid, Task>>,
}

impl InMemoryTaskRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create_task(&self, task: &Task) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if tasks.contains_key(&task.id) {
            return Err(RepositoryError::AlreadyExists);
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Task, RepositoryError> {
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_tasks(&self, spec: &TaskSpecification) -> Result<Vec<Task>, RepositoryError> {
        Ok(self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .filter(|task| spec.is_satisfied_by(task))
            .cloned()
            .collect())
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_task(&self, task: &Task, _synchronous: bool) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let existing = tasks.get(&task.id).ok_or(RepositoryError::NotFound)?;
        if existing.version != task.version {
            return Err(RepositoryError::UpdatedConcurrently);
        }
        let mut updated = task.clone();
        updated.version += 1;
        tasks.insert(task.id, updated);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryScheduleRepository {
    schedules: Mutex<HashMap<Uuid, Schedule>>,
}

impl InMemoryScheduleRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn create_schedule(&self, schedule: &Schedule) -> Result<(), RepositoryError> {
        let mut schedules = self.schedules.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if schedules.contains_key(&schedule.id) {
            return Err(RepositoryError::AlreadyExists);
        }
        schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Schedule, RepositoryError> {
        self.schedules
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_schedules(
        &self,
        spec: &ScheduleSpecification,
    ) -> Result<Vec<Schedule>, RepositoryError> {
        Ok(self
            .schedules
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .filter(|schedule| spec.is_satisfied_by(schedule))
            .cloned()
            .collect())
    }

    async fn delete_schedule(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.schedules
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_schedule(
        &self,
        schedule: &Schedule,
        _synchronous: bool,
    ) -> Result<(), RepositoryError> {
        let mut schedules = self.schedules.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let existing = schedules.get(&schedule.id).ok_or(RepositoryError::NotFound)?;
        if existing.version != schedule.version {
            return Err(RepositoryError::UpdatedConcurrently);
        }
        let mut updated = schedule.clone();
        updated.version += 1;
        schedules.insert(schedule.id, updated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry_policy::RetryPolicy;
    use chrono::{TimeDelta, Utc};
    use serde_json::Value;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(TimeDelta::seconds(1), 2.0, None, 3)
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let repo = InMemoryTaskRepository::new();
        let now = Utc::now();
        let task = Task::create(now, Uuid::new_v4(), Value::Null, TimeDelta::zero(), policy(), None);
        repo.create_task(&task).await.unwrap();
        assert!(matches!(
            repo.create_task(&task).await,
            Err(RepositoryError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn update_detects_concurrent_modification() {
        let repo = InMemoryTaskRepository::new();
        let now = Utc::now();
        let task = Task::create(now, Uuid::new_v4(), Value::Null, TimeDelta::zero(), policy(), None);
        repo.create_task(&task).await.unwrap();

        let mut stale = task.clone();
        repo.update_task(&task, true).await.unwrap();
        stale.version = task.version;
        let result = repo.update_task(&stale, true).await;
        assert!(matches!(result, Err(RepositoryError::UpdatedConcurrently)));
    }
}
