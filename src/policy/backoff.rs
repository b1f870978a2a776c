// src/policy/backoff.rs

use std::time::Duration;

use crate::types::BackoffKind;

/// Compiled retry backoff: how long a requeued task stays ineligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    kind: BackoffKind,
    delay: Duration,
    max_delay: Option<Duration>,
}

impl BackoffPolicy {
    pub fn new(kind: BackoffKind, delay: Duration, max_delay: Option<Duration>) -> Self {
        Self {
            kind,
            delay,
            max_delay,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::new(BackoffKind::Fixed, delay, None)
    }

    /// Delay before retry number `retry_count` (1-based) becomes eligible.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let raw = match self.kind {
            BackoffKind::Fixed => self.delay,
            BackoffKind::Exponential => {
                let exp = retry_count.saturating_sub(1).min(31);
                self.delay.saturating_mul(1u32 << exp)
            }
        };
        match self.max_delay {
            Some(cap) => raw.min(cap),
            None => raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_doubles_and_caps() {
        let p = BackoffPolicy::new(
            BackoffKind::Exponential,
            Duration::from_millis(100),
            Some(Duration::from_millis(350)),
        );
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(350));
    }

    #[test]
    fn fixed_is_constant() {
        let p = BackoffPolicy::fixed(Duration::from_millis(5));
        assert_eq!(p.delay_for(1), p.delay_for(7));
    }
}
