use super::base::PeriodicTask;
use crate::service::{TaskService, TaskServiceError};
use async_trait::async_trait;
use docket_schema::repository::RepositoryError;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Polls for executable (`ACTIVE`, ready) tasks and runs each on a bounded
/// pool. `executing` tracks task ids with an in-flight execution so the
/// same task is never submitted twice concurrently — the CAS in
/// `TaskService::execute_task` would reject the loser anyway, but skipping
/// the duplicate submission avoids wasted handler invocations.
pub struct ExecutionWorker {
    task_service: Arc<TaskService>,
    semaphore: Arc<Semaphore>,
    executing: Arc<Mutex<HashSet<Uuid>>>,
    threads: u32,
}

impl ExecutionWorker {
    #[must_use]
    pub fn new(task_service: Arc<TaskService>, threads: NonZeroUsize) -> Self {
        Self {
            task_service,
            semaphore: Arc::new(Semaphore::new(threads.get())),
            executing: Arc::new(Mutex::new(HashSet::new())),
            threads: u32::try_from(threads.get()).unwrap_or(u32::MAX),
        }
    }

    fn submit(&self, id: Uuid) -> bool {
        {
            let mut executing = self.executing.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if !executing.insert(id) {
                return false;
            }
        }
        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
            self.executing.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&id);
            return false;
        };

        let task_service = Arc::clone(&self.task_service);
        let executing = Arc::clone(&self.executing);
        tokio::spawn(async move {
            let _permit = permit;
            run_one(&task_service, id).await;
            executing.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&id);
        });
        true
    }
}

async fn run_one(task_service: &TaskService, id: Uuid) {
    tracing::debug!(%id, "executing task");
    match task_service.execute_task(id).await {
        Ok(task) => {
            let execution = task.last_execution();
            let duration = execution.and_then(|e| e.duration());
            let error = execution.and_then(|e| e.error.as_deref());
            tracing::info!(%id, ?duration, error, "task executed");
        }
        Err(TaskServiceError::Repository(RepositoryError::Database(error))) => {
            tracing::error!(%id, %error, "failed to execute task");
        }
        Err(TaskServiceError::HandlerNotFound(error)) => {
            tracing::warn!(%id, %error, "failed to execute task");
        }
        Err(error) => {
            tracing::debug!(%id, %error, "failed to execute task");
        }
    }
}

#[async_trait]
impl PeriodicTask for ExecutionWorker {
    fn name(&self) -> &'static str {
        "docket::ExecutionWorker"
    }

    async fn work(&self) {
        loop {
            let tasks = match self.task_service.executable_tasks().await {
                Ok(tasks) => tasks,
                Err(error) => {
                    tracing::error!(%error, "failed to list executable tasks");
                    return;
                }
            };

            let submitted = tasks.into_iter().filter(|task| self.submit(task.id)).count();
            if submitted == 0 {
                return;
            }
        }
    }

    /// Waits for every in-flight execution to finish by acquiring all
    /// permits: a running job only releases its permit once it completes,
    /// so holding every permit at once means the pool is fully idle. By the
    /// time this runs, the loop has already exited and `submit` will not be
    /// called again, so permits released here are never reacquired.
    async fn drain(&self) {
        if let Ok(permit) = self.semaphore.acquire_many(self.threads).await {
            drop(permit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_schema::repository::InMemoryTaskRepository;
    use docket_schema::RetryPolicy;
    use serde_json::Value;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(chrono::TimeDelta::seconds(1), 2.0, None, 3)
    }

    #[tokio::test]
    async fn work_executes_ready_tasks_through_the_handler() {
        let repo = Arc::new(InMemoryTaskRepository::new());
        let ran = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        let handler: Arc<dyn crate::handler::TaskHandler> = Arc::new(move |_args: Value| {
            let ran = Arc::clone(&ran_clone);
            async move {
                ran.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        });
        let task_service = Arc::new(TaskService::new(repo, Some(handler)));
        task_service
            .create_task(Value::Null, chrono::TimeDelta::zero(), policy(), None, None)
            .await
            .unwrap();

        let worker = ExecutionWorker::new(task_service, NonZeroUsize::new(2).unwrap());
        worker.work().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(ran.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drain_waits_for_in_flight_handler_to_finish() {
        let repo = Arc::new(InMemoryTaskRepository::new());
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let finished_clone = Arc::clone(&finished);
        let handler: Arc<dyn crate::handler::TaskHandler> = Arc::new(move |_args: Value| {
            let finished = Arc::clone(&finished_clone);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                finished.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        });
        let task_service = Arc::new(TaskService::new(repo, Some(handler)));
        task_service
            .create_task(Value::Null, chrono::TimeDelta::zero(), policy(), None, None)
            .await
            .unwrap();

        let worker = ExecutionWorker::new(task_service, NonZeroUsize::new(2).unwrap());
        worker.work().await;

        assert!(!finished.load(std::sync::atomic::Ordering::SeqCst));
        worker.drain().await;
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
    }
}
