//! Delay policy between step attempts.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay grows with each failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * attempt
    #[default]
    Linear,
    /// delay = base * 2^(attempt - 1)
    Exponential,
    /// delay = base
    Constant,
}

/// Jitter applied on top of the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Use the computed delay as-is.
    #[default]
    None,
    /// Random from 0 to the computed delay.
    Full,
}

/// Backoff between attempts of one step.
///
/// The default waits `attempt × 1s` with no cap and no jitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBackoff {
    /// Growth strategy.
    pub strategy: BackoffStrategy,
    /// Base delay.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Option<Duration>,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Linear,
            base_delay: Duration::from_secs(1),
            max_delay: None,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryBackoff {
    /// Creates the default linear backoff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Caps every delay at `max_delay`.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the wait after `failed_attempts` failures (1-based).
    #[must_use]
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        let attempt = failed_attempts.max(1);
        let delay = match self.strategy {
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Constant => self.base_delay,
        };
        let delay = self.max_delay.map_or(delay, |max| delay.min(max));

        match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                let max_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                if max_ms == 0 {
                    delay
                } else {
                    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
                }
            }
        }
    }
}
