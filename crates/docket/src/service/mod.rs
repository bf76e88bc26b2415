mod errors;
mod schedule_service;
mod task_service;

pub use errors::{ScheduleServiceError, TaskServiceError};
pub use schedule_service::ScheduleService;
pub use task_service::TaskService;
