mod errors;

pub use self::errors::{TaskNotActive, TaskNotReady, TaskNotTerminal};

use crate::retry_policy::RetryPolicy;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Active,
    Succeeded,
    Failed,
}

impl TaskState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One attempt at running a task. The last element of [`Task::executions`]
/// may be in progress (`ended_at` is `None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub begun_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TaskExecution {
    fn begin(now: DateTime<Utc>) -> Self {
        Self {
            begun_at: now,
            ended_at: None,
            error: None,
        }
    }

    fn end(&mut self, now: DateTime<Utc>, error: Option<String>) {
        self.ended_at = Some(now);
        self.error = error;
    }

    #[must_use]
    pub fn ended(&self) -> bool {
        self.ended_at.is_some()
    }

    #[must_use]
    pub fn duration(&self) -> Option<TimeDelta> {
        self.ended_at.map(|ended_at| ended_at - self.begun_at)
    }
}

/// The unit of deferred work. See the module-level invariants in the crate
/// documentation for the state machine this type enforces.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: Uuid,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub state: TaskState,
    pub args: Value,
    pub ready_at: DateTime<Utc>,
    pub retry_policy: RetryPolicy,
    pub executions: Vec<TaskExecution>,
    pub schedule_id: Option<Uuid>,
}

impl Task {
    #[must_use]
    pub fn create(
        now: DateTime<Utc>,
        id: Uuid,
        args: Value,
        delay: TimeDelta,
        retry_policy: RetryPolicy,
        schedule_id: Option<Uuid>,
    ) -> Self {
        Self {
            id,
            version: 1,
            created_at: now,
            state: TaskState::Active,
            args,
            ready_at: now + delay,
            retry_policy,
            executions: Vec::new(),
            schedule_id,
        }
    }

    #[must_use]
    pub fn ready(&self, now: DateTime<Utc>) -> bool {
        self.ready_at <= now
    }

    #[must_use]
    pub fn last_execution(&self) -> Option<&TaskExecution> {
        self.executions.last()
    }

    #[must_use]
    pub fn last_execution_ended_at(&self) -> Option<DateTime<Utc>> {
        self.last_execution().and_then(|execution| execution.ended_at)
    }

    /// Marks the task as running. Only valid while `state == ACTIVE` and
    /// `ready_at <= now`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotActive`] or [`TaskNotReady`] if the preconditions do
    /// not hold.
    pub fn begin_execution(&mut self, now: DateTime<Utc>) -> Result<(), BeginExecutionError> {
        if self.state != TaskState::Active {
            return Err(BeginExecutionError::NotActive(TaskNotActive));
        }
        if !self.ready(now) {
            return Err(BeginExecutionError::NotReady(TaskNotReady));
        }
        debug_assert!(self.last_execution().map_or(true, TaskExecution::ended));
        self.executions.push(TaskExecution::begin(now));
        Ok(())
    }

    /// Ends the in-progress execution started by [`Task::begin_execution`]
    /// and advances the state machine: success terminates the task, a
    /// failure reschedules it unless the retry policy is exhausted, in which
    /// case the task becomes `FAILED`.
    ///
    /// # Panics
    ///
    /// Panics if there is no in-progress execution — callers must always
    /// pair this with a preceding successful `begin_execution`.
    #[allow(clippy::expect_used)]
    pub fn end_execution(&mut self, now: DateTime<Utc>, error: Option<String>) {
        let attempts = self.executions.len();
        let execution = self
            .executions
            .last_mut()
            .expect("end_execution called without a prior begin_execution");
        assert!(!execution.ended(), "execution already ended");
        execution.end(now, error.clone());

        if error.is_none() {
            self.state = TaskState::Succeeded;
        } else if let Ok(delay) = self.retry_policy.delay(u16_saturating(attempts)) {
            self.ready_at = now + delay;
        } else {
            self.state = TaskState::Failed;
        }
    }

    /// Moves a terminal task back to `ACTIVE`, leaving execution history
    /// intact.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotTerminal`] if the task is still `ACTIVE`.
    pub fn reactivate(&mut self, now: DateTime<Utc>, delay: TimeDelta) -> Result<(), TaskNotTerminal> {
        if !self.state.is_terminal() {
            return Err(TaskNotTerminal);
        }
        self.state = TaskState::Active;
        self.ready_at = now + delay;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BeginExecutionError {
    #[error(transparent)]
    NotActive(#[from] TaskNotActive),
    #[error(transparent)]
    NotReady(#[from] TaskNotReady),
}

fn u16_saturating(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u16) -> RetryPolicy {
        RetryPolicy::new(TimeDelta::seconds(1), 2.0, Some(TimeDelta::seconds(10)), max_attempts)
    }

    #[test]
    fn create_sets_ready_at_from_delay() {
        let now = Utc::now();
        let task = Task::create(now, Uuid::new_v4(), Value::Null, TimeDelta::seconds(5), policy(3), None);
        assert_eq!(task.ready_at, now + TimeDelta::seconds(5));
        assert_eq!(task.version, 1);
        assert_eq!(task.state, TaskState::Active);
        assert!(task.executions.is_empty());
    }

    #[test]
    fn begin_execution_rejects_not_ready() {
        let now = Utc::now();
        let mut task = Task::create(now, Uuid::new_v4(), Value::Null, TimeDelta::seconds(5), policy(3), None);
        let err = task.begin_execution(now).unwrap_err();
        assert!(matches!(err, BeginExecutionError::NotReady(_)));
    }

    #[test]
    fn begin_execution_rejects_non_active() {
        let now = Utc::now();
        let mut task = Task::create(now, Uuid::new_v4(), Value::Null, TimeDelta::zero(), policy(3), None);
        task.begin_execution(now).unwrap();
        task.end_execution(now, None);
        let err = task.begin_execution(now).unwrap_err();
        assert!(matches!(err, BeginExecutionError::NotActive(_)));
    }

    #[test]
    fn successful_execution_marks_succeeded() {
        let now = Utc::now();
        let mut task = Task::create(now, Uuid::new_v4(), Value::Null, TimeDelta::zero(), policy(3), None);
        task.begin_execution(now).unwrap();
        task.end_execution(now, None);
        assert_eq!(task.state, TaskState::Succeeded);
        assert_eq!(task.executions.len(), 1);
        assert!(task.last_execution().unwrap().error.is_none());
    }

    #[test]
    fn failed_execution_reschedules_until_attempts_exhausted() {
        let now = Utc::now();
        let mut task = Task::create(now, Uuid::new_v4(), Value::Null, TimeDelta::zero(), policy(2), None);

        task.begin_execution(now).unwrap();
        task.end_execution(now, Some("boom".into()));
        assert_eq!(task.state, TaskState::Active);
        assert_eq!(task.ready_at, now + TimeDelta::seconds(1));

        let now2 = task.ready_at;
        task.begin_execution(now2).unwrap();
        task.end_execution(now2, Some("boom again".into()));
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.executions.len(), 2);
        assert!(task.executions.iter().all(|e| e.error.is_some()));
    }

    #[test]
    fn reactivate_requires_terminal_state() {
        let now = Utc::now();
        let mut task = Task::create(now, Uuid::new_v4(), Value::Null, TimeDelta::zero(), policy(3), None);
        assert!(task.reactivate(now, TimeDelta::zero()).is_err());

        task.begin_execution(now).unwrap();
        task.end_execution(now, None);
        task.reactivate(now, TimeDelta::seconds(10)).unwrap();
        assert_eq!(task.state, TaskState::Active);
        assert_eq!(task.ready_at, now + TimeDelta::seconds(10));
        assert_eq!(task.executions.len(), 1);
    }
}
