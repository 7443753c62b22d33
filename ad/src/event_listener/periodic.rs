//! Periodic listener

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{EventListener, EventListenerError};

/// Period of a periodic listener; the components are summed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodicConfig {
    pub seconds: u64,
    pub minutes: u64,
    pub hours: u64,
    pub days: u64,
}

impl PeriodicConfig {
    pub fn period(&self) -> Duration {
        let seconds = self
            .seconds
            .saturating_add(self.minutes.saturating_mul(60))
            .saturating_add(self.hours.saturating_mul(60 * 60))
            .saturating_add(self.days.saturating_mul(60 * 60 * 24));
        Duration::from_secs(seconds)
    }
}

/// Event is the number of whole periods elapsed since construction
#[derive(Debug, Clone)]
pub struct PeriodicListener {
    period: Duration,
    started: Instant,
}

impl PeriodicListener {
    pub fn new(config: &PeriodicConfig) -> Result<Self, EventListenerError> {
        let period = config.period();
        if period.is_zero() {
            return Err(EventListenerError::ZeroPeriod);
        }
        Ok(Self {
            period,
            started: Instant::now(),
        })
    }

    fn periods_elapsed(&self, elapsed: Duration) -> u128 {
        elapsed.as_nanos() / self.period.as_nanos()
    }

    fn remaining(&self, elapsed: Duration) -> Duration {
        let into_period = elapsed.as_nanos() % self.period.as_nanos();
        let remaining = self.period.as_nanos() - into_period;
        Duration::from_nanos(u64::try_from(remaining).unwrap_or(u64::MAX))
    }
}

impl EventListener for PeriodicListener {
    fn kind(&self) -> &'static str {
        "periodic"
    }

    fn event(&self) -> String {
        self.periods_elapsed(self.started.elapsed()).to_string()
    }

    fn time_until_next_event(&self) -> Duration {
        self.remaining(self.started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(seconds: u64) -> PeriodicListener {
        PeriodicListener::new(&PeriodicConfig {
            seconds,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_period_sums_components() {
        let config = PeriodicConfig {
            seconds: 1,
            minutes: 2,
            hours: 1,
            days: 1,
        };
        assert_eq!(config.period(), Duration::from_secs(1 + 120 + 3600 + 86400));
    }

    #[test]
    fn test_first_event_is_zero() {
        let listener = listener(3600);
        assert_eq!(listener.event(), "0");
        assert!(listener.time_until_next_event() <= Duration::from_secs(3600));
    }

    #[test]
    fn test_periods_elapsed_and_remaining() {
        let listener = listener(10);

        assert_eq!(listener.periods_elapsed(Duration::from_secs(9)), 0);
        assert_eq!(listener.periods_elapsed(Duration::from_secs(10)), 1);
        assert_eq!(listener.periods_elapsed(Duration::from_secs(25)), 2);
        assert_eq!(listener.remaining(Duration::from_secs(25)), Duration::from_secs(5));
        assert_eq!(listener.remaining(Duration::from_secs(20)), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_period_rejected() {
        let result = PeriodicListener::new(&PeriodicConfig::default());
        assert_eq!(result.unwrap_err(), EventListenerError::ZeroPeriod);
    }
}
