// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ring geometry and the transfer policy.
//!
//! Everything here is a pure function of the pointer pair.  `rd == wr` always means the ring is
//! empty; the policy never lets the write pointer catch up with the read pointer from behind, so
//! a full ring cannot be mistaken for an empty one.

use crate::BUS_WIDTH;
use crate::error::RingError;

/// Size and transfer limit of a ring.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RingGeometry {
    size: u32,
    max_transfer: u32,
}

impl RingGeometry {
    /// Create a new [`RingGeometry`].
    ///
    /// # Errors
    ///
    /// * [`RingError::Misaligned`] unless `size` is a non-zero multiple of [`BUS_WIDTH`].
    /// * [`RingError::BufferTooSmall`] unless `size > max_transfer > 0`.
    pub fn new(size: u32, max_transfer: u32) -> Result<Self, RingError> {
        if size == 0 || size % BUS_WIDTH != 0 {
            return Err(RingError::Misaligned {
                size: u64::from(size),
            });
        }
        if max_transfer == 0 || size <= max_transfer {
            return Err(RingError::BufferTooSmall {
                size: u64::from(size),
                max_transfer: u64::from(max_transfer),
            });
        }
        Ok(RingGeometry { size, max_transfer })
    }

    /// Ring size in bytes.
    #[must_use]
    pub const fn size(self) -> u32 {
        self.size
    }

    /// Largest single transfer step.
    #[must_use]
    pub const fn max_transfer(self) -> u32 {
        self.max_transfer
    }

    /// Bytes between `wr` and the ring end.
    #[must_use]
    pub const fn writable_extent(self, wr: u32) -> u32 {
        self.size - wr
    }

    /// Bytes readable at `rd` without crossing the ring end.
    #[must_use]
    pub const fn readable_extent(self, rd: u32, wr: u32) -> u32 {
        if rd <= wr { wr - rd } else { self.size - rd }
    }

    /// Bytes held by the ring.
    #[must_use]
    pub const fn used(self, rd: u32, wr: u32) -> u32 {
        if rd <= wr { wr - rd } else { self.size - rd + wr }
    }

    /// Bytes not held by the ring.  Not all of them can be written: the policy keeps `wr` from
    /// reaching `rd`.
    #[must_use]
    pub const fn free(self, rd: u32, wr: u32) -> u32 {
        self.size - self.used(rd, wr)
    }

    /// May the producer write `len` bytes at `wr` in one step?
    #[must_use]
    pub const fn can_write(self, rd: u32, wr: u32, len: u32) -> bool {
        if len == 0 || len > self.size - wr {
            return false;
        }
        let wraps = wr + len == self.size;
        if rd == wr {
            // empty; wrapping to 0 with rd at 0 would make a full ring look empty
            !(rd == 0 && wraps)
        } else if rd < wr {
            rd != 0 || !wraps
        } else {
            rd - wr > len
        }
    }

    /// Longest step [`RingGeometry::can_write`] accepts at `wr`, ignoring the transfer limit.
    /// Zero if the ring is full.
    #[must_use]
    pub const fn writable(self, rd: u32, wr: u32) -> u32 {
        if rd > wr {
            rd - wr - 1
        } else if rd == 0 {
            self.size - wr - 1
        } else {
            self.size - wr
        }
    }

    /// May the consumer read `len` bytes at `rd` in one step?
    #[must_use]
    pub const fn can_read(self, rd: u32, wr: u32, len: u32) -> bool {
        if len == 0 || rd == wr {
            false
        } else if rd < wr {
            wr - rd >= len
        } else {
            len <= self.size - rd
        }
    }

    /// Write pointer after a step of `len` bytes at `wr`.
    #[must_use]
    pub const fn advance_write(self, wr: u32, len: u32) -> u32 {
        self.advance(wr, len)
    }

    /// Read pointer after a step of `len` bytes at `rd`.
    #[must_use]
    pub const fn advance_read(self, rd: u32, len: u32) -> u32 {
        self.advance(rd, len)
    }

    const fn advance(self, at: u32, len: u32) -> u32 {
        debug_assert!(len <= self.size - at);
        let next = at + len;
        if next == self.size { 0 } else { next }
    }

    /// Split a transfer of `len` bytes at `at` into the part before the ring end and the rest.
    #[must_use]
    pub const fn split(self, at: u32, len: u32) -> (u32, u32) {
        let extent = self.size - at;
        if len <= extent { (len, 0) } else { (extent, len - extent) }
    }

    /// May the producer write a whole record of `len` bytes, crossing the ring end if needed?
    ///
    /// Each step is checked with [`RingGeometry::can_write`], the second with the write pointer
    /// virtually advanced past the first.
    #[must_use]
    pub const fn can_commit(self, rd: u32, wr: u32, len: u32) -> bool {
        if len == 0 || len >= self.size {
            return false;
        }
        let (first, second) = self.split(wr, len);
        if !self.can_write(rd, wr, first) {
            return false;
        }
        second == 0 || self.can_write(rd, self.advance_write(wr, first), second)
    }

    /// May the consumer read a whole record of `len` bytes, crossing the ring end if needed?
    #[must_use]
    pub const fn can_consume(self, rd: u32, wr: u32, len: u32) -> bool {
        if len == 0 || len >= self.size {
            return false;
        }
        let (first, second) = self.split(rd, len);
        if !self.can_read(rd, wr, first) {
            return false;
        }
        second == 0 || self.can_read(self.advance_read(rd, first), wr, second)
    }
}
