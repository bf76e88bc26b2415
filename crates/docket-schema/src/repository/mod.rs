mod errors;
mod memory;
mod schedule_repository;
mod task_repository;

pub use errors::RepositoryError;
pub use memory::{InMemoryScheduleRepository, InMemoryTaskRepository};
pub use schedule_repository::{ScheduleRepository, SqliteScheduleRepository};
pub use task_repository::{SqliteTaskRepository, TaskRepository};
