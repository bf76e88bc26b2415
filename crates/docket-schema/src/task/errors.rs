use thiserror::Error;

#[derive(Debug, Error)]
#[error("task is not active")]
pub struct TaskNotActive;

#[derive(Debug, Error)]
#[error("task is not ready to run yet")]
pub struct TaskNotReady;

#[derive(Debug, Error)]
#[error("task is not in a terminal state")]
pub struct TaskNotTerminal;
