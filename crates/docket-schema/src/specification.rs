//! Query specifications used by repositories' list operations. Each field is
//! an optional predicate; `None` means "don't filter on this". Repositories
//! translate these into `COALESCE(:param, column) = column`-style SQL, and
//! the in-memory test doubles evaluate [`TaskSpecification::is_satisfied_by`]
//! / [`ScheduleSpecification::is_satisfied_by`] directly.

use crate::task::{Task, TaskState};
use chrono::{DateTime, Utc};
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
pub struct TaskSpecification {
    pub state: Option<TaskState>,
    pub ready_as_of: Option<DateTime<Utc>>,
    pub last_execution_ended_before: Option<DateTime<Utc>>,
}

impl TaskSpecification {
    #[must_use]
    pub fn is_satisfied_by(&self, task: &Task) -> bool {
        if let Some(state) = self.state {
            if task.state != state {
                return false;
            }
        }
        if let Some(ready_as_of) = self.ready_as_of {
            if task.ready_at > ready_as_of {
                return false;
            }
        }
        if let Some(deadline) = self.last_execution_ended_before {
            match task.last_execution_ended_at() {
                Some(ended_at) if ended_at < deadline => {}
                _ => return false,
            }
        }
        true
    }
}

use crate::schedule::Schedule;

#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
pub struct ScheduleSpecification {
    pub enabled: Option<bool>,
    pub ready_as_of: Option<DateTime<Utc>>,
}

impl ScheduleSpecification {
    #[must_use]
    pub fn is_satisfied_by(&self, schedule: &Schedule) -> bool {
        if let Some(enabled) = self.enabled {
            if schedule.enabled != enabled {
                return false;
            }
        }
        if let Some(ready_as_of) = self.ready_as_of {
            if schedule.ready_at > ready_as_of {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use crate::retry_policy::RetryPolicy;
    use chrono::TimeDelta;
    use uuid::Uuid;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(TimeDelta::seconds(1), 2.0, None, 3)
    }

    #[test]
    fn task_specification_filters_by_state() {
        let now = Utc::now();
        let task = Task::create(now, Uuid::new_v4(), Value::Null, TimeDelta::zero(), policy(), None);
        let spec = TaskSpecification::builder().state(TaskState::Active).build();
        assert!(spec.is_satisfied_by(&task));

        let spec = TaskSpecification::builder().state(TaskState::Failed).build();
        assert!(!spec.is_satisfied_by(&task));
    }

    #[test]
    fn task_specification_filters_by_ready_as_of() {
        let now = Utc::now();
        let task = Task::create(now, Uuid::new_v4(), Value::Null, TimeDelta::seconds(60), policy(), None);
        let spec = TaskSpecification::builder().ready_as_of(now).build();
        assert!(!spec.is_satisfied_by(&task));

        let spec = TaskSpecification::builder()
            .ready_as_of(now + TimeDelta::seconds(120))
            .build();
        assert!(spec.is_satisfied_by(&task));
    }
}
