//! Bounded polling with exponential backoff.

use super::clock::Clock;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    #[serde(with = "duration_text")]
    pub initial_interval: Duration,
    #[serde(with = "duration_text")]
    pub max_interval: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
    #[serde(with = "duration_text")]
    pub max_elapsed: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 120,
            max_elapsed: Duration::from_secs(30 * 60),
        }
    }
}

impl PollPolicy {
    /// Scaled interval, capped at `max_interval`. A product too large for
    /// `Duration` is the cap.
    fn next_interval(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier.max(1.0))
            .map_or(self.max_interval, |scaled| scaled.min(self.max_interval))
    }
}

/// Result of one status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    Pending,
    Done(T),
}

#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    #[error("gave up after {attempts} checks over {}", human(.elapsed))]
    Timeout { attempts: u32, elapsed: Duration },
    #[error("{0}")]
    Check(E),
}

pub(crate) fn human(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

/// Run `check` until it reports `Done`, fails, or the policy's bounds are spent.
///
/// The first check runs immediately. Sleeps never overshoot `max_elapsed`, and
/// a timeout leaves whatever the check was watching untouched.
pub async fn poll_until<T, E, F, Fut>(
    clock: &dyn Clock,
    policy: &PollPolicy,
    mut check: F,
) -> Result<(T, u32), PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStep<T>, E>>,
{
    let started = clock.now();
    let mut interval = policy.initial_interval;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match check(attempts).await.map_err(PollError::Check)? {
            PollStep::Done(value) => return Ok((value, attempts)),
            PollStep::Pending => {}
        }

        let elapsed = clock.now().saturating_duration_since(started);
        if attempts >= policy.max_attempts || elapsed >= policy.max_elapsed {
            return Err(PollError::Timeout { attempts, elapsed });
        }
        let remaining = policy.max_elapsed - elapsed;
        clock.sleep(interval.min(remaining)).await;
        interval = policy.next_interval(interval);
    }
}

/// `Duration` as humantime text ("2s", "10m") in config files.
pub(crate) mod duration_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
