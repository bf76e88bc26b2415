use chrono::TimeDelta;
use docket_schema::RetryPolicy;
use std::num::NonZeroUsize;
use typed_builder::TypedBuilder;

/// Tunables for a [`crate::Docket`] instance. Every field has a default
/// matching spec.md §6's configuration table.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Settings {
    /// Applied to tasks/schedules whose creator omits a retry policy.
    #[builder(default = default_retry_policy())]
    pub default_retry_policy: RetryPolicy,

    /// How often the execution worker polls for ready tasks.
    #[builder(default = TimeDelta::seconds(1))]
    pub execution_worker_interval: TimeDelta,

    /// Size of the execution worker's task pool.
    #[builder(default = default_execution_worker_threads())]
    pub execution_worker_threads: NonZeroUsize,

    /// Retention period for succeeded tasks past their last execution, if any.
    #[builder(default, setter(strip_option))]
    pub delete_succeeded_after: Option<TimeDelta>,

    /// Retention period for failed tasks past their last execution, if any.
    #[builder(default, setter(strip_option))]
    pub delete_failed_after: Option<TimeDelta>,

    /// How often the cleanup worker sweeps deletable terminal tasks.
    #[builder(default = TimeDelta::seconds(60))]
    pub cleanup_worker_interval: TimeDelta,

    /// How often the schedule worker polls for fireable schedules.
    #[builder(default = TimeDelta::seconds(1))]
    pub schedule_worker_interval: TimeDelta,
}

impl Settings {
    #[must_use]
    pub fn read_pool_capacity(&self) -> u32 {
        // execution loop + schedule loop + cleanup loop + one spare, per
        // spec.md §5's expected steady-state parallelism.
        u32::try_from(self.execution_worker_threads.get() + 3).unwrap_or(u32::MAX)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_retry_policy: default_retry_policy(),
            execution_worker_interval: TimeDelta::seconds(1),
            execution_worker_threads: default_execution_worker_threads(),
            delete_succeeded_after: None,
            delete_failed_after: None,
            cleanup_worker_interval: TimeDelta::seconds(60),
            schedule_worker_interval: TimeDelta::seconds(1),
        }
    }
}

fn default_retry_policy() -> RetryPolicy {
    RetryPolicy::new(TimeDelta::seconds(1), 2.0, Some(TimeDelta::minutes(1)), 5)
}

fn default_execution_worker_threads() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_pool_capacity_adds_three_to_worker_threads() {
        let settings = Settings::builder()
            .execution_worker_threads(NonZeroUsize::new(7).unwrap())
            .build();
        assert_eq!(settings.read_pool_capacity(), 10);
    }
}
