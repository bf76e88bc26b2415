//! `docket` — a lightweight, single-node, persistent task queue: at-least-once
//! delivery, exponential-backoff retries, fixed-interval recurring schedules,
//! and automatic cleanup of terminal tasks, backed by sqlite.
//!
//! The primary entry point is [`Docket`]: open it against a database URL,
//! register a [`TaskHandler`], [`Docket::start`] the background workers, and
//! use the facade methods to create and inspect tasks and schedules.

mod cleanup_policy;
mod facade;
mod handler;
mod service;
mod settings;
mod worker;

pub use cleanup_policy::CleanupPolicy;
pub use facade::Docket;
pub use handler::{HandlerNotFound, TaskHandler};
pub use service::{ScheduleService, ScheduleServiceError, TaskService, TaskServiceError};
pub use settings::Settings;
pub use worker::{CleanupWorker, ExecutionWorker, PeriodicTask, ScheduleWorker, WorkerHandle};

pub use docket_schema::repository::{RepositoryError, ScheduleRepository, TaskRepository};
pub use docket_schema::schedule::Schedule;
pub use docket_schema::specification::{ScheduleSpecification, TaskSpecification};
pub use docket_schema::task::{Task, TaskState};
pub use docket_schema::RetryPolicy;
