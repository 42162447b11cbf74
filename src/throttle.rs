use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of "now" for publish throttling and elapsed-time reporting.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Rate limiter for snapshot publishes.
///
/// The first request always passes, as does any forced request. Others
/// pass once `interval` has elapsed since the last accepted one.
#[derive(Debug, Clone)]
pub struct PublishThrottle {
    interval: Duration,
    last_publish: Option<Instant>,
}

impl PublishThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_publish: None,
        }
    }

    pub fn should_publish(&mut self, now: Instant, force: bool) -> bool {
        let due = match self.last_publish {
            None => true,
            Some(_) if force => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            self.last_publish = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(300);

    #[test]
    fn test_first_publish_is_never_delayed() {
        let clock = ManualClock::new();
        let mut throttle = PublishThrottle::new(INTERVAL);
        assert!(throttle.should_publish(clock.now(), false));
    }

    #[test]
    fn test_intermediate_publishes_are_spaced() {
        let clock = ManualClock::new();
        let mut throttle = PublishThrottle::new(INTERVAL);
        assert!(throttle.should_publish(clock.now(), false));

        clock.advance(Duration::from_millis(100));
        assert!(!throttle.should_publish(clock.now(), false));

        clock.advance(Duration::from_millis(199));
        assert!(!throttle.should_publish(clock.now(), false));

        clock.advance(Duration::from_millis(1));
        assert!(throttle.should_publish(clock.now(), false));

        // The window restarts from the accepted publish.
        clock.advance(Duration::from_millis(299));
        assert!(!throttle.should_publish(clock.now(), false));
    }

    #[test]
    fn test_forced_publish_bypasses_interval() {
        let clock = ManualClock::new();
        let mut throttle = PublishThrottle::new(INTERVAL);
        assert!(throttle.should_publish(clock.now(), false));
        assert!(throttle.should_publish(clock.now(), true));
        assert!(!throttle.should_publish(clock.now(), false));
    }
}
