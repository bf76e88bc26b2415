use chrono::{DateTime, TimeDelta, Utc};

/// Retention windows past a terminal task's last execution. `None` disables
/// cleanup for that state entirely — the cleanup worker simply never lists
/// tasks in that state.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupPolicy {
    pub delete_succeeded_after: Option<TimeDelta>,
    pub delete_failed_after: Option<TimeDelta>,
}

impl CleanupPolicy {
    #[must_use]
    pub fn succeeded_deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.delete_succeeded_after.map(|after| now - after)
    }

    #[must_use]
    pub fn failed_deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.delete_failed_after.map(|after| now - after)
    }
}
