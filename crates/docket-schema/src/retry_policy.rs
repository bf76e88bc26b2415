use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameters governing exponential-backoff re-attempts.
///
/// `delay(attempts)` is defined recursively: the first attempt (`attempts == 0`)
/// waits `initial_delay`; every attempt after that multiplies the previous
/// delay by `backoff_factor`, clamped to `max_delay` when set.
///
/// `initial_delay`/`max_delay` serialize as a number of seconds — chrono's
/// `serde` feature only covers `DateTime`/`Naive*`, not `TimeDelta`, so the
/// conversion is explicit here, matching `mapper::dump_interval` and the
/// original's `initial_delay`/`max_delay` float fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(with = "seconds")]
    pub initial_delay: TimeDelta,
    pub backoff_factor: f64,
    #[serde(with = "optional_seconds")]
    pub max_delay: Option<TimeDelta>,
    pub max_attempts: u16,
}

mod seconds {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(crate::mapper::dump_interval(*delta))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        Ok(crate::mapper::load_interval(f64::deserialize(deserializer)?))
    }
}

mod optional_seconds {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delta: &Option<TimeDelta>, serializer: S) -> Result<S::Ok, S::Error> {
        match delta {
            Some(delta) => serializer.serialize_some(&crate::mapper::dump_interval(*delta)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<TimeDelta>, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.map(crate::mapper::load_interval))
    }
}

#[derive(Debug, Error)]
#[error("too many attempts")]
pub struct TooManyAttempts;

impl RetryPolicy {
    #[must_use]
    pub fn new(
        initial_delay: TimeDelta,
        backoff_factor: f64,
        max_delay: Option<TimeDelta>,
        max_attempts: u16,
    ) -> Self {
        Self {
            initial_delay,
            backoff_factor,
            max_delay,
            max_attempts,
        }
    }

    /// Computes the delay before the `attempts`-th retry.
    ///
    /// `attempts` counts completed executions so far: `0` means the task has
    /// never run, `1` means one attempt has been made and this is the delay
    /// before the second.
    ///
    /// # Errors
    ///
    /// Returns [`TooManyAttempts`] once `attempts` reaches `max_attempts`.
    pub fn delay(&self, attempts: u16) -> Result<TimeDelta, TooManyAttempts> {
        if attempts == 0 {
            return Ok(TimeDelta::zero());
        }
        if attempts == 1 {
            return Ok(self.initial_delay);
        }
        if attempts >= self.max_attempts {
            return Err(TooManyAttempts);
        }
        let previous = self.delay(attempts - 1)?;
        let scaled = scale(previous, self.backoff_factor);
        Ok(match self.max_delay {
            Some(max_delay) => scaled.min(max_delay),
            None => scaled,
        })
    }
}

fn scale(delta: TimeDelta, factor: f64) -> TimeDelta {
    let millis = delta.num_milliseconds() as f64 * factor;
    TimeDelta::milliseconds(millis.round() as i64)
}
