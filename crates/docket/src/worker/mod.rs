mod base;
mod cleanup;
mod execution;
mod schedule;

pub use base::{PeriodicTask, WorkerHandle};
pub use cleanup::CleanupWorker;
pub use execution::ExecutionWorker;
pub use schedule::ScheduleWorker;
