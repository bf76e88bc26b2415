use thiserror::Error;

#[derive(Debug, Error)]
#[error("schedule is not enabled")]
pub struct ScheduleNotEnabled;

#[derive(Debug, Error)]
#[error("schedule is not ready to fire yet")]
pub struct ScheduleNotReady;

#[derive(Debug, Error)]
#[error("schedule's last firing has not ended yet")]
pub struct ScheduleFiringNotEnded;

#[derive(Debug, Error)]
#[error("schedule's last firing has already ended")]
pub struct ScheduleFiringAlreadyEnded;

#[derive(Debug, Error)]
#[error("schedule has not begun a firing yet")]
pub struct ScheduleFiringNotBegun;
