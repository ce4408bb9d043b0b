use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};

/// Reconnect delays: doubling from `initial`, capped at `max`, restarted by [`Backoff::reset`].
pub struct Backoff {
    builder: ExponentialBuilder,
    max: Duration,
    delays: ExponentialBackoff,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, jitter: bool) -> Self {
        let max = max.max(initial);
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(initial)
            .with_max_delay(max)
            .with_factor(2.0)
            .without_max_times();
        if jitter {
            builder = builder.with_jitter();
        }
        Self {
            delays: builder.clone().build(),
            builder,
            max,
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt. Jitter adds a random amount on top.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.delays.next().unwrap_or(self.max)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.delays = self.builder.clone().build();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_then_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(2), false);
        let delays = (0..6).map(|_| backoff.next_delay()).collect::<Vec<_>>();
        assert_eq!(
            delays,
            [250, 500, 1000, 2000, 2000, 2000].map(Duration::from_millis)
        );
        assert_eq!(backoff.attempt(), 6);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
    }

    #[test]
    fn never_runs_out() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), false);
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_secs(30));
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_near_base() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), true);
        for base in [100, 200, 400, 800, 1000].map(Duration::from_millis) {
            let delay = backoff.next_delay();
            assert!(delay >= base / 2 && delay <= base * 2, "{delay:?}");
        }
    }
}
