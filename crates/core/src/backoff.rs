use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pure retry policy for result polling.
///
/// Defaults match the reference retry policy:
/// Attempt 1: immediate
/// Attempt 2: after 1s
/// Attempt 3: after 2s
/// ... doubling, 6 attempts in total.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Upper bound for a single delay.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    6
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: None,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after failed attempt `attempt` (0-based) before the next one.
    ///
    /// `initial * multiplier^attempt`, clamped to `max_delay_ms` when set.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.initial_delay_ms as f64 * self.multiplier.powi(exp);
        let mut ms = if raw.is_finite() && raw < u64::MAX as f64 {
            raw.round() as u64
        } else {
            u64::MAX
        };
        if let Some(cap) = self.max_delay_ms {
            ms = ms.min(cap);
        }
        Duration::from_millis(ms)
    }

    /// True if another attempt is allowed after `attempts_made` attempts.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Sum of every delay the policy can sleep through before giving up.
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|a| self.delay_after(a))
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }

    /// Rejects policies that would never poll or would poll faster over time.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!("multiplier must be >= 1.0, got {}", self.multiplier));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_doubles_from_one_second() {
        let p = BackoffPolicy::default();
        assert_eq!(p.max_attempts, 6);
        assert_eq!(p.delay_after(0), Duration::from_secs(1));
        assert_eq!(p.delay_after(1), Duration::from_secs(2));
        assert_eq!(p.delay_after(2), Duration::from_secs(4));
        assert_eq!(p.delay_after(4), Duration::from_secs(16));
    }

    #[test]
    fn delay_is_capped() {
        let p = BackoffPolicy {
            max_delay_ms: Some(3_000),
            ..Default::default()
        };
        assert_eq!(p.delay_after(1), Duration::from_secs(2));
        assert_eq!(p.delay_after(2), Duration::from_secs(3));
        assert_eq!(p.delay_after(30), Duration::from_secs(3));
    }

    #[test]
    fn huge_exponent_saturates() {
        let p = BackoffPolicy::default();
        assert_eq!(p.delay_after(u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn worst_case_skips_delay_after_last_attempt() {
        let p = BackoffPolicy::default();
        // 1 + 2 + 4 + 8 + 16
        assert_eq!(p.worst_case_wait(), Duration::from_secs(31));

        let single = BackoffPolicy {
            max_attempts: 1,
            ..Default::default()
        };
        assert_eq!(single.worst_case_wait(), Duration::ZERO);
    }

    #[test]
    fn validate_rejects_bad_policies() {
        assert!(BackoffPolicy::default().validate().is_ok());
        let zero = BackoffPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
        let shrinking = BackoffPolicy {
            multiplier: 0.5,
            ..Default::default()
        };
        assert!(shrinking.validate().is_err());
    }
}
