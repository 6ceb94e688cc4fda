// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Conversion between clock ticks and wall time.

use core::num::NonZero;
use core::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Frequency of the clock which `delta_t` is counted in.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClockRate(NonZero<u64>);

impl Default for ClockRate {
    fn default() -> Self {
        ClockRate::DEFAULT
    }
}

impl ClockRate {
    /// The 156.25 MHz clock of a 10G Ethernet MAC (one tick per 64-bit word).
    #[allow(unsafe_code)] // safe due to const eval
    pub const DEFAULT: ClockRate = ClockRate(unsafe { NonZero::new_unchecked(156_250_000) });

    /// Create a new [`ClockRate`] from a frequency in Hz.
    ///
    /// Returns `None` for zero.
    #[must_use]
    pub const fn new(hz: u64) -> Option<ClockRate> {
        match NonZero::new(hz) {
            Some(hz) => Some(ClockRate(hz)),
            None => None,
        }
    }

    /// The frequency in Hz.
    #[must_use]
    pub const fn hz(self) -> u64 {
        self.0.get()
    }

    /// Convert ticks to nanoseconds, truncating.
    #[must_use]
    pub fn ticks_to_nanos(self, ticks: u64) -> u64 {
        let nanos = u128::from(ticks) * NANOS_PER_SEC / u128::from(self.hz());
        u64::try_from(nanos).unwrap_or(u64::MAX)
    }

    /// Convert ticks to a [`Duration`], truncating to whole nanoseconds.
    #[must_use]
    pub fn ticks_to_duration(self, ticks: u64) -> Duration {
        Duration::from_nanos(self.ticks_to_nanos(ticks))
    }

    /// Convert a [`Duration`] to ticks, rounding to the nearest tick.
    #[must_use]
    pub fn duration_to_ticks(self, duration: Duration) -> u64 {
        let ticks = (duration.as_nanos() * u128::from(self.hz()) + NANOS_PER_SEC / 2) / NANOS_PER_SEC;
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }
}

/// Converts a stream of wall time gaps into tick gaps.
///
/// Each gap is derived from the cumulative time, so rounding errors never accumulate: the sum of
/// all returned ticks is always within half a tick of the total elapsed time.
#[derive(Clone, Debug)]
pub struct CycleCounter {
    clock: ClockRate,
    elapsed: Duration,
    emitted: u64,
}

impl CycleCounter {
    /// Start counting at zero.
    #[must_use]
    pub fn new(clock: ClockRate) -> Self {
        CycleCounter {
            clock,
            elapsed: Duration::ZERO,
            emitted: 0,
        }
    }

    /// Advance by `gap` and return the number of ticks it corresponds to.
    pub fn advance(&mut self, gap: Duration) -> u64 {
        self.elapsed = self.elapsed.saturating_add(gap);
        let target = self.clock.duration_to_ticks(self.elapsed);
        let ticks = target.saturating_sub(self.emitted);
        self.emitted = target;
        ticks
    }

    /// Total ticks returned so far.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.emitted
    }
}
