//! Exponential reconnect backoff with bounded jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Reconnect backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for any delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor applied after each failed attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Extra random fraction of the delay, in `[0, jitter]`.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl BackoffConfig {
    /// Validate the settings.
    ///
    /// `multiplier > 1 + jitter` keeps successive delays strictly
    /// increasing until the cap, whatever jitter is drawn.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.initial_delay_ms == 0 {
            anyhow::bail!("reconnect.initial_delay_ms must be > 0");
        }
        if self.max_delay_ms < self.initial_delay_ms {
            anyhow::bail!("reconnect.max_delay_ms must be >= reconnect.initial_delay_ms");
        }
        if !(0.0..1.0).contains(&self.jitter) {
            anyhow::bail!("reconnect.jitter must be in [0, 1)");
        }
        if !self.multiplier.is_finite() || self.multiplier <= 1.0 + self.jitter {
            anyhow::bail!("reconnect.multiplier must be greater than 1 + jitter");
        }
        Ok(())
    }
}

/// Stateful delay generator for one reconnect episode.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let jitter = if self.config.jitter > 0.0 {
            rand::rng().random_range(0.0..=self.config.jitter)
        } else {
            0.0
        };
        let delay = self.delay_for(self.attempt, jitter);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Start over from the initial delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let max = self.config.max_delay_ms as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.config.initial_delay_ms as f64 * self.config.multiplier.powi(exponent);
        let millis = (base * (1.0 + jitter)).min(max);
        // Whole milliseconds would flatten small delays into equal steps.
        Duration::from_nanos((millis * 1_000_000.0).round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(jitter: f64) -> BackoffConfig {
        BackoffConfig {
            initial_delay_ms: 100,
            max_delay_ms: 2_000,
            multiplier: 2.0,
            jitter,
        }
    }

    #[test]
    fn test_delays_grow_then_cap() {
        let mut backoff = Backoff::new(config(0.0));
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600, 2000, 2000]);
    }

    #[test]
    fn test_jittered_delays_strictly_increase_until_cap() {
        let mut backoff = Backoff::new(config(0.5));
        let cap = Duration::from_millis(2_000);
        let mut previous = Duration::ZERO;

        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay <= cap);
            if delay < cap {
                assert!(delay > previous, "{:?} should exceed {:?}", delay, previous);
            } else {
                assert!(delay >= previous);
            }
            previous = delay;
        }
    }

    #[test]
    fn test_small_delays_keep_growing() {
        let cfg = BackoffConfig {
            initial_delay_ms: 1,
            max_delay_ms: 1_000,
            multiplier: 1.2,
            jitter: 0.1,
        };
        assert!(cfg.validate().is_ok());

        let mut backoff = Backoff::new(cfg);
        let cap = Duration::from_secs(1);
        let delays: Vec<Duration> = (0..60).map(|_| backoff.next_delay()).collect();

        assert!(delays[0] >= Duration::from_millis(1));
        assert!(delays[0] <= Duration::from_micros(1_100));
        for pair in delays.windows(2) {
            if pair[1] < cap {
                assert!(pair[1] > pair[0], "delays not increasing: {:?}", delays);
            }
        }
        assert_eq!(delays[59], cap);
    }

    #[test]
    fn test_jitter_is_bounded() {
        let backoff = Backoff::new(config(0.25));
        assert_eq!(backoff.delay_for(1, 0.0), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(1, 0.25), Duration::from_millis(250));
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new(config(0.0));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_huge_attempt_saturates_at_cap() {
        let backoff = Backoff::new(config(0.0));
        assert_eq!(backoff.delay_for(u32::MAX, 0.0), Duration::from_millis(2_000));
    }

    #[test]
    fn test_validate() {
        assert!(BackoffConfig::default().validate().is_ok());

        let mut cfg = config(0.5);
        cfg.multiplier = 1.4;
        assert!(cfg.validate().is_err());

        let mut cfg = config(0.0);
        cfg.max_delay_ms = 50;
        assert!(cfg.validate().is_err());

        let mut cfg = config(0.0);
        cfg.initial_delay_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
