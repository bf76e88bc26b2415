use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Invoked once per due task by the execution worker. A handler failure
/// (any `Err`) is recorded as the execution's error string and feeds the
/// retry path; it never stops the worker.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, args: &Value) -> Result<(), anyhow::Error>;
}

#[async_trait]
impl<F, Fut> TaskHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), anyhow::Error>> + Send + 'static,
{
    async fn handle(&self, args: &Value) -> Result<(), anyhow::Error> {
        (self)(args.clone()).await
    }
}

/// Raised by [`crate::service::TaskService::execute_task`] when no handler
/// was registered. Logged at warning by the execution worker; the task
/// stays `ACTIVE` and is retried on the next poll.
#[derive(Debug, Error)]
#[error("no task handler registered")]
pub struct HandlerNotFound;
