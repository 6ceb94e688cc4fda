// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Inter frame timing.

use std::time::Instant;
use trace::ClockRate;

/// Decides when a frame leaves.
///
/// Gaps are in clock ticks and measured start to start.
pub trait Pacer {
    /// Restart the clock; the next frame leaves at tick zero plus its gap.
    fn start(&mut self);

    /// Wait `gap` ticks after the previous frame and return the departure tick of the next one.
    fn wait(&mut self, gap: u64) -> u64;
}

/// Logical clock which never sleeps.
#[derive(Clone, Debug, Default)]
pub struct VirtualPacer {
    now: u64,
}

impl VirtualPacer {
    /// Create a new [`VirtualPacer`] at tick zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current tick.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.now
    }
}

impl Pacer for VirtualPacer {
    fn start(&mut self) {
        self.now = 0;
    }

    fn wait(&mut self, gap: u64) -> u64 {
        self.now = self.now.saturating_add(gap);
        self.now
    }
}

/// Paces frames against the wall clock.
///
/// Every departure is an absolute deadline derived from the cumulative tick count, so late
/// wakeups delay a single frame without shifting the ones after it.
#[derive(Clone, Debug)]
pub struct WallClockPacer {
    clock: ClockRate,
    origin: Instant,
    ticks: u64,
}

impl WallClockPacer {
    /// Create a new [`WallClockPacer`] counting ticks of `clock`.
    #[must_use]
    pub fn new(clock: ClockRate) -> Self {
        Self {
            clock,
            origin: Instant::now(),
            ticks: 0,
        }
    }
}

impl Pacer for WallClockPacer {
    fn start(&mut self) {
        self.origin = Instant::now();
        self.ticks = 0;
    }

    fn wait(&mut self, gap: u64) -> u64 {
        self.ticks = self.ticks.saturating_add(gap);
        let deadline = self.origin + self.clock.ticks_to_duration(self.ticks);
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        self.ticks
    }
}

#[cfg(test)]
mod test {
    use crate::pacer::{Pacer, VirtualPacer, WallClockPacer};
    use std::time::{Duration, Instant};
    use trace::ClockRate;

    #[test]
    fn virtual_time_is_the_sum_of_gaps() {
        let mut pacer = VirtualPacer::new();
        pacer.start();
        assert_eq!(pacer.wait(0), 0);
        assert_eq!(pacer.wait(10), 10);
        assert_eq!(pacer.wait(5), 15);
        pacer.start();
        assert_eq!(pacer.now(), 0);
    }

    #[test]
    fn wall_clock_does_not_drift() {
        // 1 MHz: one tick per microsecond
        let mut pacer = WallClockPacer::new(ClockRate::new(1_000_000).unwrap());
        pacer.start();
        let begin = Instant::now();
        for _ in 0..20 {
            pacer.wait(1_000);
        }
        assert_eq!(pacer.wait(0), 20_000);
        assert!(begin.elapsed() >= Duration::from_millis(20));
    }
}
