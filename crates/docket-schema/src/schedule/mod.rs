mod errors;

pub use self::errors::{
    ScheduleFiringAlreadyEnded, ScheduleFiringNotBegun, ScheduleFiringNotEnded, ScheduleNotEnabled,
    ScheduleNotReady,
};

use crate::retry_policy::RetryPolicy;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One attempt by a schedule to produce its next task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleFiring {
    pub task_sequence_number: i64,
    pub begun_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ScheduleFiring {
    fn begin(now: DateTime<Utc>, task_sequence_number: i64) -> Self {
        Self {
            task_sequence_number,
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

/// A recurring task generator: fires on a fixed interval, producing an
/// idempotent task on each successful firing.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub id: Uuid,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub ready_at: DateTime<Utc>,
    pub origin: DateTime<Utc>,
    pub interval: TimeDelta,
    pub retry_policy: RetryPolicy,
    pub enabled: bool,
    pub task_args: Value,
    pub task_retry_policy: RetryPolicy,
    pub task_sequence_number: i64,
    pub firings: Vec<ScheduleFiring>,
}

impl Schedule {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        now: DateTime<Utc>,
        id: Uuid,
        delay: TimeDelta,
        interval: TimeDelta,
        retry_policy: RetryPolicy,
        enabled: bool,
        task_args: Value,
        task_retry_policy: RetryPolicy,
    ) -> Self {
        let origin = now + delay;
        Self {
            id,
            version: 1,
            created_at: now,
            ready_at: origin,
            origin,
            interval,
            retry_policy,
            enabled,
            task_args,
            task_retry_policy,
            task_sequence_number: 1,
            firings: Vec::new(),
        }
    }

    #[must_use]
    pub fn ready(&self, now: DateTime<Utc>) -> bool {
        self.ready_at <= now
    }

    #[must_use]
    pub fn last_firing(&self) -> Option<&ScheduleFiring> {
        self.firings.last()
    }

    /// Deterministic id for the task produced at `task_sequence_number`:
    /// `UUIDv5(NAMESPACE_OID, "{schedule.id}.{n}")`. Re-firing after a crash
    /// between task-insert and schedule-update produces the same id, so the
    /// repository's uniqueness constraint rejects the duplicate.
    #[must_use]
    pub fn generate_task_id(&self) -> Uuid {
        Self::task_id_for(self.id, self.task_sequence_number)
    }

    #[must_use]
    pub fn task_id_for(schedule_id: Uuid, task_sequence_number: i64) -> Uuid {
        let name = format!("{schedule_id}.{task_sequence_number}");
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }

    /// Begins a new firing for the current `task_sequence_number`.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleNotEnabled`], [`ScheduleNotReady`], or
    /// [`ScheduleFiringNotEnded`] if the preconditions do not hold.
    pub fn begin_firing(&mut self, now: DateTime<Utc>) -> Result<(), BeginFiringError> {
        if !self.enabled {
            return Err(BeginFiringError::NotEnabled(ScheduleNotEnabled));
        }
        if !self.ready(now) {
            return Err(BeginFiringError::NotReady(ScheduleNotReady));
        }
        if let Some(last_firing) = self.last_firing() {
            if !last_firing.ended() {
                return Err(BeginFiringError::NotEnded(ScheduleFiringNotEnded));
            }
            if last_firing.task_sequence_number != self.task_sequence_number {
                self.firings.clear();
            }
        }
        self.firings
            .push(ScheduleFiring::begin(now, self.task_sequence_number));
        Ok(())
    }

    /// Ends the in-progress firing. A successful firing (or one whose retry
    /// budget/period deadline has passed) advances `task_sequence_number`
    /// and `origin`; a failure that still has retry budget left just resets
    /// `ready_at` to the retry time.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleFiringNotBegun`] or [`ScheduleFiringAlreadyEnded`]
    /// if there is no in-progress firing.
    pub fn end_firing(
        &mut self,
        now: DateTime<Utc>,
        error: Option<String>,
    ) -> Result<(), EndFiringError> {
        let attempts = self.firings.len();
        let firing = self
            .firings
            .last_mut()
            .ok_or(EndFiringError::NotBegun(ScheduleFiringNotBegun))?;
        if firing.ended() {
            return Err(EndFiringError::AlreadyEnded(ScheduleFiringAlreadyEnded));
        }
        firing.end(now, error.clone());

        let next_firing_at = self.origin + self.interval;
        let advances = match &error {
            None => true,
            Some(_) => match self.retry_policy.delay(u16_saturating(attempts)) {
                Ok(delay) => {
                    let retry_at = now + delay;
                    if retry_at < next_firing_at {
                        self.ready_at = retry_at;
                        false
                    } else {
                        true
                    }
                }
                Err(_too_many_attempts) => true,
            },
        };

        if advances {
            self.task_sequence_number += 1;
            self.origin += self.interval;
            self.ready_at = self.origin;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BeginFiringError {
    #[error(transparent)]
    NotEnabled(#[from] ScheduleNotEnabled),
    #[error(transparent)]
    NotReady(#[from] ScheduleNotReady),
    #[error(transparent)]
    NotEnded(#[from] ScheduleFiringNotEnded),
}

#[derive(Debug, thiserror::Error)]
pub enum EndFiringError {
    #[error(transparent)]
    NotBegun(#[from] ScheduleFiringNotBegun),
    #[error(transparent)]
    AlreadyEnded(#[from] ScheduleFiringAlreadyEnded),
}

fn u16_saturating(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(TimeDelta::seconds(1), 2.0, Some(TimeDelta::seconds(60)), 5)
    }

    fn new_schedule(now: DateTime<Utc>) -> Schedule {
        Schedule::create(
            now,
            Uuid::new_v4(),
            TimeDelta::zero(),
            TimeDelta::seconds(10),
            policy(),
            true,
            Value::Null,
            policy(),
        )
    }

    #[test]
    fn generate_task_id_is_deterministic() {
        let now = Utc::now();
        let schedule = new_schedule(now);
        let a = schedule.generate_task_id();
        let b = Schedule::task_id_for(schedule.id, schedule.task_sequence_number);
        assert_eq!(a, b);
    }

    #[test]
    fn successful_firing_advances_sequence_and_origin() {
        let now = Utc::now();
        let mut schedule = new_schedule(now);
        let origin = schedule.origin;

        schedule.begin_firing(now).unwrap();
        schedule.end_firing(now, None).unwrap();

        assert_eq!(schedule.task_sequence_number, 2);
        assert_eq!(schedule.origin, origin + TimeDelta::seconds(10));
        assert_eq!(schedule.ready_at, schedule.origin);
    }

    #[test]
    fn failed_firing_with_retry_budget_left_does_not_advance() {
        let now = Utc::now();
        let mut schedule = new_schedule(now);
        schedule.interval = TimeDelta::seconds(1000);
        schedule.origin = now;
        schedule.ready_at = now;

        schedule.begin_firing(now).unwrap();
        schedule.end_firing(now, Some("boom".into())).unwrap();

        assert_eq!(schedule.task_sequence_number, 1);
        assert_eq!(schedule.ready_at, now + TimeDelta::seconds(1));
    }

    #[test]
    fn disabled_schedule_cannot_fire() {
        let now = Utc::now();
        let mut schedule = new_schedule(now);
        schedule.enabled = false;
        assert!(matches!(
            schedule.begin_firing(now),
            Err(BeginFiringError::NotEnabled(_))
        ));
    }

    #[test]
    fn firings_clear_once_sequence_advances() {
        let now = Utc::now();
        let mut schedule = new_schedule(now);

        schedule.begin_firing(now).unwrap();
        schedule.end_firing(now, None).unwrap();
        assert_eq!(schedule.firings.len(), 1);

        let next = schedule.ready_at;
        schedule.begin_firing(next).unwrap();
        assert_eq!(schedule.firings.len(), 1);
        assert_eq!(schedule.firings[0].task_sequence_number, 2);
    }
}
