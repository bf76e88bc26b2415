use crate::handler::HandlerNotFound;
use docket_schema::repository::RepositoryError;
use docket_schema::schedule::{BeginFiringError, EndFiringError};
use docket_schema::task::{BeginExecutionError, TaskNotTerminal};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    HandlerNotFound(#[from] HandlerNotFound),

    #[error(transparent)]
    BeginExecution(#[from] BeginExecutionError),

    #[error(transparent)]
    NotTerminal(#[from] TaskNotTerminal),
}

#[derive(Debug, Error)]
pub enum ScheduleServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    BeginFiring(#[from] BeginFiringError),

    #[error(transparent)]
    EndFiring(#[from] EndFiringError),
}
