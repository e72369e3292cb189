// Copyright © 2020-2021
// Author: Antonio Caggiano <info@antoniocaggiano.eu>
// SPDX-License-Identifier: MIT

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Source of timestamps for usage tracking.
/// Caches never read the system time directly, so tests can drive time by hand.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Clock backed by `Instant::now()`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock which only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    elapsed: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward by `delta`
    pub fn advance(&self, delta: Duration) {
        self.elapsed.set(self.elapsed.get() + delta);
    }

    /// Time passed since the clock was created
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed.get()
    }
}

/// Useful timer to get delta time between two maintenance passes
pub struct Timer<'c> {
    clock: &'c dyn Clock,
    prev: Instant,
}

impl<'c> Timer<'c> {
    pub fn new(clock: &'c dyn Clock) -> Self {
        let prev = clock.now();
        Self { clock, prev }
    }

    /// Returns time passed since the previous call, or since creation
    pub fn get_delta(&mut self) -> Duration {
        let curr = self.clock.now();
        let delta = curr - self.prev;
        self.prev = curr;
        delta
    }

    /// Returns the time of last `get_delta()`
    pub fn get_prev(&self) -> Instant {
        self.prev
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn manual_does_not_move() {
        let clock = ManualClock::new();
        let a = clock.now();
        let b = clock.now();
        assert_eq!(a, b);
    }

    #[test]
    fn manual_advance() {
        let clock = ManualClock::new();
        let a = clock.now();
        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.now() - a, Duration::from_secs(3));
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn timer_delta() {
        let clock = ManualClock::new();
        let mut timer = Timer::new(&clock);
        clock.advance(Duration::from_millis(16));
        assert_eq!(timer.get_delta(), Duration::from_millis(16));
        assert_eq!(timer.get_prev(), clock.now());
        assert_eq!(timer.get_delta(), Duration::ZERO);
    }

    #[test]
    fn system_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
