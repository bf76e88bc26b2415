use async_trait::async_trait;
use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One iteration of a periodic background loop. Implementors do their own
/// error handling internally — `work` never fails the loop, matching the
/// Python original's `Worker.work`, which never propagates past the
/// individual task/schedule it's handling.
#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    async fn work(&self);

    /// Human-readable name used in the loop's tracing span.
    fn name(&self) -> &'static str;

    /// Called once the loop has exited, before [`WorkerHandle::stop`]
    /// returns. Workers that hand work off to detached tasks (like
    /// [`super::ExecutionWorker`]) override this to wait for that work to
    /// finish; the default is a no-op for workers that do all of their work
    /// inline within `work()`.
    async fn drain(&self) {}
}

/// Runs `task.work()` every `interval` until `token` is cancelled. Mirrors
/// the original's `Worker.loop`: work first, then wait (so a fresh worker
/// does one pass immediately instead of idling for a full interval).
async fn run(task: Arc<dyn PeriodicTask>, interval: TimeDelta, token: CancellationToken) {
    let interval = interval.to_std().unwrap_or(Duration::from_secs(1));
    loop {
        task.work().await;
        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
}

/// Spawns `task` onto its own periodic loop and returns a handle that stops
/// it: dropping the handle does *not* stop the loop (matching the spec's
/// explicit `start`/`stop` pair rather than `Drop`-based teardown — see
/// DESIGN.md).
pub struct WorkerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
    task: Arc<dyn PeriodicTask>,
}

impl WorkerHandle {
    pub fn spawn<T: PeriodicTask>(task: T, interval: TimeDelta) -> Self {
        let task: Arc<dyn PeriodicTask> = Arc::new(task);
        let token = CancellationToken::new();
        let span = tracing::info_span!("worker", name = task.name());
        let join = tokio::spawn(tracing::Instrument::instrument(
            run(Arc::clone(&task), interval, token.clone()),
            span,
        ));
        Self { token, join, task }
    }

    /// Signals the loop to stop after its current iteration, waits for it to
    /// actually exit — the same guarantee `Worker.stop`'s `stopped.wait()`
    /// gives in the original — and then waits for any work the loop handed
    /// off to finish via [`PeriodicTask::drain`].
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(error) = self.join.await {
            tracing::error!(%error, "worker task panicked");
        }
        self.task.drain().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTask(Arc<AtomicUsize>);

    #[async_trait]
    impl PeriodicTask for CountingTask {
        async fn work(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "test::CountingTask"
        }
    }

    #[tokio::test]
    async fn spawn_runs_work_immediately_then_stops_cleanly() {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = WorkerHandle::spawn(CountingTask(Arc::clone(&count)), TimeDelta::seconds(60));
        tokio::task::yield_now().await;
        handle.stop().await;
        assert!(count.load(Ordering::SeqCst) >= 1);
    }
}
