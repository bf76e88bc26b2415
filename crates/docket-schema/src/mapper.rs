//! Pure functions mapping between aggregate fields and their serialized row
//! representation. No I/O happens here — see [`crate::repository`] for that.

use crate::retry_policy::RetryPolicy;
use crate::schedule::ScheduleFiring;
use crate::task::{TaskExecution, TaskState};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

pub fn dump_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
}

pub fn load_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

pub fn dump_task_state(state: TaskState) -> &'static str {
    match state {
        TaskState::Active => "active",
        TaskState::Succeeded => "succeeded",
        TaskState::Failed => "failed",
    }
}

pub fn load_task_state(s: &str) -> Option<TaskState> {
    match s {
        "active" => Some(TaskState::Active),
        "succeeded" => Some(TaskState::Succeeded),
        "failed" => Some(TaskState::Failed),
        _ => None,
    }
}

pub fn dump_retry_policy(policy: &RetryPolicy) -> Value {
    serde_json::to_value(policy).unwrap_or(Value::Null)
}

pub fn load_retry_policy(value: &Value) -> Result<RetryPolicy, serde_json::Error> {
    serde_json::from_value(value.clone())
}

pub fn dump_executions(executions: &[TaskExecution]) -> Value {
    serde_json::to_value(executions).unwrap_or(Value::Null)
}

pub fn load_executions(value: &Value) -> Result<Vec<TaskExecution>, serde_json::Error> {
    serde_json::from_value(value.clone())
}

/// `schedules.interval` is stored as a `REAL` number of seconds, matching
/// the original's `interval: float`.
pub fn dump_interval(interval: TimeDelta) -> f64 {
    interval.num_milliseconds() as f64 / 1000.0
}

pub fn load_interval(seconds: f64) -> TimeDelta {
    TimeDelta::milliseconds((seconds * 1000.0).round() as i64)
}

pub fn dump_firings(firings: &[ScheduleFiring]) -> Value {
    serde_json::to_value(firings).unwrap_or(Value::Null)
}

pub fn load_firings(value: &Value) -> Result<Vec<ScheduleFiring>, serde_json::Error> {
    serde_json::from_value(value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip() {
        let now = Utc::now();
        let dumped = dump_timestamp(now);
        let loaded = load_timestamp(&dumped).unwrap();
        // RFC3339 truncates to microseconds on some platforms; compare millis.
        assert_eq!(now.timestamp_millis(), loaded.timestamp_millis());
    }

    #[test]
    fn task_state_round_trips() {
        for state in [TaskState::Active, TaskState::Succeeded, TaskState::Failed] {
            let dumped = dump_task_state(state);
            assert_eq!(load_task_state(dumped), Some(state));
        }
    }
}
