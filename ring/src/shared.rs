// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Producer and consumer handles of a ring.
//!
//! The producer owns the write pointer and the consumer owns the read pointer.  Each side copies
//! bytes first and publishes its pointer afterwards with `Release` ordering; the other side
//! loads that pointer with `Acquire` ordering before it touches the bytes.

use crate::error::RingError;
use crate::geometry::RingGeometry;
use crate::memory::{Memory, Window};
use crate::regs::Registers;
use crate::sync::{Arc, AtomicBool, AtomicU32, Ordering};
use core::time::Duration;
use crossbeam_utils::Backoff;

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Out of band requests shared between the host and the engines.
#[derive(Debug)]
pub struct Control {
    abort: AtomicBool,
    stop: AtomicBool,
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl Control {
    /// Create a new [`Control`] with nothing requested.
    #[must_use]
    pub fn new() -> Self {
        Control {
            abort: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        }
    }

    /// Ask every blocked transfer to give up at its next suspension point.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    /// Has an abort been requested?
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// Ask a running engine to finish gracefully.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Has a stop been requested?
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Withdraw all requests.
    pub fn clear(&self) {
        self.abort.store(false, Ordering::Release);
        self.stop.store(false, Ordering::Release);
    }
}

/// How a blocked side waits for the other one.
///
/// Waiting spins, then yields (see [`Backoff`]), then sleeps for the poll interval between
/// attempts.  An abort requested through the [`Control`] is honoured between attempts.
#[derive(Clone, Debug)]
pub struct Waiter {
    control: Arc<Control>,
    poll: Duration,
}

impl Waiter {
    /// Default sleep between attempts once spinning gave up.
    pub const DEFAULT_POLL: Duration = Duration::from_micros(10);

    /// Create a new [`Waiter`].
    #[must_use]
    pub fn new(control: Arc<Control>, poll: Duration) -> Self {
        Waiter { control, poll }
    }

    /// The shared [`Control`].
    #[must_use]
    pub fn control(&self) -> &Arc<Control> {
        &self.control
    }

    /// Suspend once.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::Aborted`] if an abort was requested.
    pub fn pause(&self, backoff: &Backoff) -> Result<(), RingError> {
        if self.control.is_aborted() {
            return Err(RingError::Aborted);
        }
        if backoff.is_completed() {
            std::thread::sleep(self.poll);
        } else {
            backoff.snooze();
        }
        Ok(())
    }

    /// Repeat `attempt` until it yields a value.
    ///
    /// # Errors
    ///
    /// Returns the first error of `attempt`, or [`RingError::Aborted`].
    pub fn wait_until<T>(
        &self,
        mut attempt: impl FnMut() -> Result<Option<T>, RingError>,
    ) -> Result<T, RingError> {
        let backoff = Backoff::new();
        loop {
            if let Some(value) = attempt()? {
                return Ok(value);
            }
            self.pause(&backoff)?;
        }
    }
}

/// State shared by the two ends of one ring.
///
/// The pointer pair lives here; the `ADDR_RD`/`ADDR_WR` registers mirror it.  Nothing written to
/// the register file can move the bytes either end is allowed to touch.
#[derive(Debug)]
struct Shared {
    window: Window,
    geometry: RingGeometry,
    registers: Registers,
    rd: AtomicU32,
    wr: AtomicU32,
}

/// Constructors of producer / consumer pairs.
#[derive(Debug)]
pub struct Ring;

impl Ring {
    /// Carve a ring out of `memory` at `base` and hand out its two ends.
    ///
    /// The window is claimed from `memory` for as long as either end lives, programmed into
    /// `registers`, and both pointers start at zero.
    ///
    /// # Errors
    ///
    /// * [`RingError::OutOfBounds`] if the window does not fit in `memory`.
    /// * [`RingError::Overlap`] if the window intersects the window of a live ring.
    /// * [`RingError::Register`] if the register map is broken.
    pub fn new(
        memory: Arc<Memory>,
        base: usize,
        geometry: RingGeometry,
        registers: Registers,
    ) -> Result<(Producer, Consumer), RingError> {
        let window = Memory::window(&memory, base, geometry.size() as usize)?;
        Ring::with_window(window, geometry, registers)
    }

    /// Build a ring over an already claimed `window`.
    ///
    /// # Errors
    ///
    /// * [`RingError::OutOfBounds`] if `window` is not the size of `geometry`.
    /// * [`RingError::Register`] if the register map is broken.
    pub fn with_window(
        window: Window,
        geometry: RingGeometry,
        registers: Registers,
    ) -> Result<(Producer, Consumer), RingError> {
        let base = window.base();
        if window.len() != geometry.size() as usize {
            return Err(RingError::OutOfBounds {
                base: base as u64,
                size: u64::from(geometry.size()),
                memory: window.len() as u64,
            });
        }
        registers.set_window(base as u64, geometry.size())?;
        registers.rd()?.store(0, Ordering::Release);
        registers.wr()?.store(0, Ordering::Release);
        debug!(
            "{} ring at {base:#x}, {} bytes, max transfer {}",
            registers.map().name,
            geometry.size(),
            geometry.max_transfer()
        );
        let shared = Arc::new(Shared {
            window,
            geometry,
            registers,
            rd: AtomicU32::new(0),
            wr: AtomicU32::new(0),
        });
        Ok((
            Producer {
                shared: shared.clone(),
                wr: 0,
            },
            Consumer { shared, rd: 0 },
        ))
    }

    /// Like [`Ring::new`], with the window taken from the already programmed `registers`.
    ///
    /// # Errors
    ///
    /// See [`RingGeometry::new`] and [`Ring::new`].
    pub fn from_registers(
        memory: Arc<Memory>,
        registers: Registers,
        max_transfer: u32,
    ) -> Result<(Producer, Consumer), RingError> {
        let base = registers.mem_addr()?;
        let size = registers.mem_size()?;
        let geometry = RingGeometry::new(
            u32::try_from(size).map_err(|_| RingError::Misaligned { size })?,
            max_transfer,
        )?;
        let base = usize::try_from(base).map_err(|_| RingError::OutOfBounds {
            base,
            size,
            memory: memory.len() as u64,
        })?;
        Ring::new(memory, base, geometry, registers)
    }
}

/// Reset both pointers of a ring to zero.
///
/// Exclusive borrows of both ends guarantee no transfer is in flight.
///
/// # Errors
///
/// Returns [`RingError::Mismatch`] if the handles belong to different rings.
pub fn reset(producer: &mut Producer, consumer: &mut Consumer) -> Result<(), RingError> {
    if !Arc::ptr_eq(&producer.shared, &consumer.shared) {
        return Err(RingError::Mismatch);
    }
    producer.publish(0)?;
    consumer.publish(0)?;
    Ok(())
}

/// The writing end of a ring.
#[derive(Debug)]
pub struct Producer {
    shared: Arc<Shared>,
    wr: u32,
}

impl Producer {
    /// Geometry of the ring.
    #[must_use]
    pub fn geometry(&self) -> RingGeometry {
        self.shared.geometry
    }

    /// Registers of the engine this ring belongs to.
    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.shared.registers
    }

    /// The write pointer.
    #[must_use]
    pub fn write_pointer(&self) -> u32 {
        self.wr
    }

    fn observe(&self) -> u32 {
        self.shared.rd.load(Ordering::Acquire)
    }

    /// Longest step [`Producer::try_write`] would accept now, before the transfer limit.  Only
    /// grows until the next write.
    #[must_use]
    pub fn writable(&self) -> u32 {
        self.geometry().writable(self.observe(), self.wr)
    }

    fn publish(&mut self, wr: u32) -> Result<(), RingError> {
        self.shared.wr.store(wr, Ordering::Release);
        self.shared.registers.wr()?.store(wr, Ordering::Release);
        self.wr = wr;
        Ok(())
    }

    #[allow(unsafe_code)]
    fn copy_in(&self, at: u32, data: &[u8]) {
        // SAFETY: the policy approved `at..at + data.len()`; the consumer does not read it
        // before the write pointer is published past it.
        unsafe { self.shared.window.write(at as usize, data) }
    }

    fn len_of(&self, data: &[u8]) -> Result<u32, RingError> {
        u32::try_from(data.len()).map_err(|_| RingError::BufferTooSmall {
            size: u64::from(self.geometry().size()),
            max_transfer: data.len() as u64,
        })
    }

    /// Write `data` in one step at the write pointer if the policy allows it.
    ///
    /// Returns `Ok(false)` if the consumer has not made room yet.  An empty `data` is a no-op.
    ///
    /// # Errors
    ///
    /// * [`RingError::TransferTooLarge`] if `data` exceeds the maximum transfer size.
    /// * [`RingError::RingOverrun`] if `data` does not fit before the ring end.
    pub fn try_write(&mut self, data: &[u8]) -> Result<bool, RingError> {
        if data.is_empty() {
            return Ok(true);
        }
        let geometry = self.geometry();
        let len = self.len_of(data)?;
        if len > geometry.max_transfer() {
            return Err(RingError::TransferTooLarge {
                len: u64::from(len),
                max: geometry.max_transfer(),
            });
        }
        let extent = geometry.writable_extent(self.wr);
        if len > extent {
            return Err(RingError::RingOverrun {
                wr: self.wr,
                len: u64::from(len),
                extent,
            });
        }
        if !geometry.can_write(self.observe(), self.wr, len) {
            return Ok(false);
        }
        self.copy_in(self.wr, data);
        self.publish(geometry.advance_write(self.wr, len))?;
        Ok(true)
    }

    /// Write a whole record, in up to two steps across the ring end, publishing the write
    /// pointer once after all bytes are in place.
    ///
    /// Returns `Ok(false)` if the consumer has not made room yet.  An empty record is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::BufferTooSmall`] if the record can never fit.
    pub fn try_commit(&mut self, record: &[u8]) -> Result<bool, RingError> {
        if record.is_empty() {
            return Ok(true);
        }
        let geometry = self.geometry();
        let len = self.len_of(record)?;
        if len >= geometry.size() {
            return Err(RingError::BufferTooSmall {
                size: u64::from(geometry.size()),
                max_transfer: u64::from(len),
            });
        }
        if !geometry.can_commit(self.observe(), self.wr, len) {
            return Ok(false);
        }
        let (first, second) = geometry.split(self.wr, len);
        let (head, tail) = record.split_at(first as usize);
        self.copy_in(self.wr, head);
        let mut wr = geometry.advance_write(self.wr, first);
        if second > 0 {
            self.copy_in(wr, tail);
            wr = geometry.advance_write(wr, second);
        }
        self.publish(wr)?;
        Ok(true)
    }

    /// Block until [`Producer::try_write`] succeeds.
    ///
    /// # Errors
    ///
    /// As [`Producer::try_write`], or [`RingError::Aborted`].
    pub fn wait_write(&mut self, data: &[u8], waiter: &Waiter) -> Result<(), RingError> {
        waiter.wait_until(|| Ok(self.try_write(data)?.then_some(())))
    }

    /// Block until [`Producer::try_commit`] succeeds.
    ///
    /// # Errors
    ///
    /// As [`Producer::try_commit`], or [`RingError::Aborted`].
    pub fn wait_commit(&mut self, record: &[u8], waiter: &Waiter) -> Result<(), RingError> {
        waiter.wait_until(|| Ok(self.try_commit(record)?.then_some(())))
    }
}

/// The reading end of a ring.
#[derive(Debug)]
pub struct Consumer {
    shared: Arc<Shared>,
    rd: u32,
}

impl Consumer {
    /// Geometry of the ring.
    #[must_use]
    pub fn geometry(&self) -> RingGeometry {
        self.shared.geometry
    }

    /// Registers of the engine this ring belongs to.
    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.shared.registers
    }

    /// The read pointer.
    #[must_use]
    pub fn read_pointer(&self) -> u32 {
        self.rd
    }

    fn observe(&self) -> u32 {
        self.shared.wr.load(Ordering::Acquire)
    }

    fn publish(&mut self, rd: u32) -> Result<(), RingError> {
        self.shared.rd.store(rd, Ordering::Release);
        self.shared.registers.rd()?.store(rd, Ordering::Release);
        self.rd = rd;
        Ok(())
    }

    #[allow(unsafe_code)]
    fn copy_out(&self, at: u32, dst: &mut [u8]) {
        // SAFETY: the policy approved `at..at + dst.len()`; the producer does not write it
        // again before the read pointer is published past it.
        unsafe { self.shared.window.read(at as usize, dst) }
    }

    /// Number of bytes published by the producer and not yet consumed.
    #[must_use]
    pub fn available(&self) -> u32 {
        self.geometry().used(self.rd, self.observe())
    }

    /// Copy the next `dst.len()` bytes without consuming them.
    ///
    /// Returns `Ok(false)` if fewer bytes are available.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::BufferTooSmall`] if `dst` can never be filled.
    pub fn try_peek(&self, dst: &mut [u8]) -> Result<bool, RingError> {
        if dst.is_empty() {
            return Ok(true);
        }
        let geometry = self.geometry();
        let len = u32::try_from(dst.len())
            .ok()
            .filter(|len| *len < geometry.size())
            .ok_or(RingError::BufferTooSmall {
                size: u64::from(geometry.size()),
                max_transfer: dst.len() as u64,
            })?;
        if !geometry.can_consume(self.rd, self.observe(), len) {
            return Ok(false);
        }
        let (first, _) = geometry.split(self.rd, len);
        let (head, tail) = dst.split_at_mut(first as usize);
        self.copy_out(self.rd, head);
        if !tail.is_empty() {
            self.copy_out(geometry.advance_read(self.rd, first), tail);
        }
        Ok(true)
    }

    /// Peek at the next meta word.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::Register`] if the register map is broken.
    pub fn try_peek_word(&self) -> Result<Option<u64>, RingError> {
        let mut word = [0u8; size_of::<u64>()];
        Ok(self.try_peek(&mut word)?.then(|| u64::from_le_bytes(word)))
    }

    fn advance(&mut self, len: u32) -> Result<(), RingError> {
        let geometry = self.geometry();
        let (first, second) = geometry.split(self.rd, len);
        let rd = geometry.advance_read(geometry.advance_read(self.rd, first), second);
        self.publish(rd)
    }

    /// Copy out and consume the next `dst.len()` bytes, crossing the ring end if needed.
    ///
    /// Returns `Ok(false)` if fewer bytes are available.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::BufferTooSmall`] if `dst` can never be filled.
    pub fn try_consume(&mut self, dst: &mut [u8]) -> Result<bool, RingError> {
        if !self.try_peek(dst)? {
            return Ok(false);
        }
        #[allow(clippy::cast_possible_truncation)] // checked by try_peek
        let len = dst.len() as u32;
        self.advance(len)?;
        Ok(true)
    }

    /// Consume `len` bytes without copying them.
    ///
    /// Returns `Ok(false)` if fewer bytes are available.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::BufferTooSmall`] if `len` bytes can never be available.
    pub fn try_skip(&mut self, len: u32) -> Result<bool, RingError> {
        if len == 0 {
            return Ok(true);
        }
        let geometry = self.geometry();
        if len >= geometry.size() {
            return Err(RingError::BufferTooSmall {
                size: u64::from(geometry.size()),
                max_transfer: u64::from(len),
            });
        }
        if !geometry.can_consume(self.rd, self.observe(), len) {
            return Ok(false);
        }
        self.advance(len)?;
        Ok(true)
    }

    /// Append up to `max` contiguous bytes to `out` in one step.
    ///
    /// Returns the number of bytes transferred, zero if nothing is readable.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::Register`] if the register map is broken.
    pub fn try_read_step(&mut self, max: u32, out: &mut Vec<u8>) -> Result<u32, RingError> {
        let geometry = self.geometry();
        let wr = self.observe();
        let len = geometry
            .readable_extent(self.rd, wr)
            .min(max)
            .min(geometry.max_transfer());
        if !geometry.can_read(self.rd, wr, len) {
            return Ok(0);
        }
        let start = out.len();
        out.resize(start + len as usize, 0);
        self.copy_out(self.rd, &mut out[start..]);
        self.publish(geometry.advance_read(self.rd, len))?;
        Ok(len)
    }

    /// Block until [`Consumer::try_peek_word`] yields a word.
    ///
    /// # Errors
    ///
    /// As [`Consumer::try_peek_word`], or [`RingError::Aborted`].
    pub fn wait_peek_word(&self, waiter: &Waiter) -> Result<u64, RingError> {
        waiter.wait_until(|| self.try_peek_word())
    }

    /// Block until [`Consumer::try_consume`] succeeds.
    ///
    /// # Errors
    ///
    /// As [`Consumer::try_consume`], or [`RingError::Aborted`].
    pub fn wait_consume(&mut self, dst: &mut [u8], waiter: &Waiter) -> Result<(), RingError> {
        waiter.wait_until(|| Ok(self.try_consume(dst)?.then_some(())))
    }

    /// Block until [`Consumer::try_skip`] succeeds.
    ///
    /// # Errors
    ///
    /// As [`Consumer::try_skip`], or [`RingError::Aborted`].
    pub fn wait_skip(&mut self, len: u32, waiter: &Waiter) -> Result<(), RingError> {
        waiter.wait_until(|| Ok(self.try_skip(len)?.then_some(())))
    }
}
