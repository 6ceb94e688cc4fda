// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Byte addressable memory shared by a ring's producer and consumer.

use crate::error::RingError;
use crate::sync::Arc;
use core::cell::UnsafeCell;
use core::ops::Range;
use std::sync::{Mutex, PoisonError};

/// A fixed size byte region which two threads may access concurrently, provided they touch
/// disjoint ranges.
///
/// Rings claim their part of the region as a [`Window`].  Windows never overlap, and within a
/// window only the ring handles copy bytes, each only over ranges the transfer policy has
/// handed to it.
pub struct Memory {
    cells: Box<[UnsafeCell<u8>]>,
    claims: Mutex<Vec<Range<usize>>>,
}

// SAFETY: `Memory` exposes no safe access to its bytes while shared.  The crate internal copy
// functions are only reached through a `Window`, and windows are disjoint.
#[allow(unsafe_code)]
unsafe impl Sync for Memory {}

impl core::fmt::Debug for Memory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Memory")
            .field("len", &self.cells.len())
            .finish_non_exhaustive()
    }
}

impl Memory {
    /// Allocate `len` zeroed bytes.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Memory {
            cells: (0..len).map(|_| UnsafeCell::new(0)).collect(),
            claims: Mutex::new(Vec::new()),
        }
    }

    /// Claim `base..base + size` for one ring.  The claim is released when the [`Window`] drops.
    ///
    /// # Errors
    ///
    /// * [`RingError::OutOfBounds`] if the range does not fit.
    /// * [`RingError::Overlap`] if the range intersects a window still in use.
    pub fn window(memory: &Arc<Memory>, base: usize, size: usize) -> Result<Window, RingError> {
        let range = match base.checked_add(size) {
            Some(end) if end <= memory.len() => base..end,
            _ => {
                return Err(RingError::OutOfBounds {
                    base: base as u64,
                    size: size as u64,
                    memory: memory.len() as u64,
                });
            }
        };
        let mut claims = memory.claims.lock().unwrap_or_else(PoisonError::into_inner);
        if claims
            .iter()
            .any(|claim| claim.start < range.end && range.start < claim.end)
        {
            return Err(RingError::Overlap {
                base: base as u64,
                size: size as u64,
            });
        }
        claims.push(range.clone());
        Ok(Window {
            memory: memory.clone(),
            range,
        })
    }

    fn release(&self, range: &Range<usize>) {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        claims.retain(|claim| claim != range);
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True for a zero sized region.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Copy the whole region out.  Exclusive access guarantees no transfer is in flight.
    #[must_use]
    pub fn to_vec(&mut self) -> Vec<u8> {
        self.cells.iter_mut().map(|cell| *cell.get_mut()).collect()
    }

    /// Copy `src` into the region at `offset`.
    ///
    /// # Safety
    ///
    /// No other thread may access `offset..offset + src.len()` for the duration of the call.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    #[allow(unsafe_code)]
    unsafe fn write(&self, offset: usize, src: &[u8]) {
        let cells = &self.cells[offset..offset + src.len()];
        let dst = UnsafeCell::raw_get(cells.as_ptr());
        // SAFETY: bounds checked above and the caller guarantees exclusive access to the range
        unsafe { core::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len()) };
    }

    /// Copy bytes from the region at `offset` into `dst`.
    ///
    /// # Safety
    ///
    /// No other thread may write `offset..offset + dst.len()` for the duration of the call.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    #[allow(unsafe_code)]
    unsafe fn read(&self, offset: usize, dst: &mut [u8]) {
        let cells = &self.cells[offset..offset + dst.len()];
        let src = UnsafeCell::raw_get(cells.as_ptr()).cast_const();
        // SAFETY: bounds checked above and the caller guarantees nobody writes the range
        unsafe { core::ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len()) };
    }
}

/// An exclusively claimed part of a [`Memory`].
#[derive(Debug)]
pub struct Window {
    memory: Arc<Memory>,
    range: Range<usize>,
}

impl Window {
    /// Offset of the window in its memory.
    #[must_use]
    pub fn base(&self) -> usize {
        self.range.start
    }

    /// Size of the window in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// True for a zero sized window.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Copy `src` into the window at `offset`.
    ///
    /// # Safety
    ///
    /// No other thread may access `offset..offset + src.len()` for the duration of the call.
    ///
    /// # Panics
    ///
    /// Panics if the range leaves the window.
    #[allow(unsafe_code)]
    pub(crate) unsafe fn write(&self, offset: usize, src: &[u8]) {
        assert!(offset + src.len() <= self.len());
        // SAFETY: the range lies inside this window and the caller holds it exclusively
        unsafe { self.memory.write(self.range.start + offset, src) }
    }

    /// Copy bytes from the window at `offset` into `dst`.
    ///
    /// # Safety
    ///
    /// No other thread may write `offset..offset + dst.len()` for the duration of the call.
    ///
    /// # Panics
    ///
    /// Panics if the range leaves the window.
    #[allow(unsafe_code)]
    pub(crate) unsafe fn read(&self, offset: usize, dst: &mut [u8]) {
        assert!(offset + dst.len() <= self.len());
        // SAFETY: the range lies inside this window and nobody else writes it
        unsafe { self.memory.read(self.range.start + offset, dst) }
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        self.memory.release(&self.range);
    }
}
