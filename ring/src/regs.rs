// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The 32-bit register file which controls an engine and its ring.

use crate::error::RegisterError;
use crate::sync::{Arc, AtomicU32, Ordering};

/// Number of registers in a [`RegisterFile`].
pub const REGISTER_COUNT: usize = 16;

/// Register offsets of the capture engine.
pub mod capture {
    use crate::regs::RegisterMap;

    /// Capture is running while non-zero.
    pub const CTRL_ACTIVE: u32 = 0x00;
    /// Lower 32 bits of the ring window base.
    pub const CTRL_MEM_ADDR_LO: u32 = 0x04;
    /// Upper 32 bits of the ring window base.
    pub const CTRL_MEM_ADDR_HI: u32 = 0x08;
    /// Ring size minus one.
    pub const CTRL_MEM_RANGE: u32 = 0x0C;
    /// Write pointer (owned by the engine).
    pub const CTRL_ADDR_WR: u32 = 0x10;
    /// Read pointer (owned by the host).
    pub const CTRL_ADDR_RD: u32 = 0x14;
    /// Snap limit of captured frames.
    pub const CTRL_MAX_LEN_CAPTURE: u32 = 0x18;
    /// Number of captured frames.
    pub const STATUS_PKT_CNT: u32 = 0x1C;
    /// Non-zero while the engine is capturing or flushing.
    pub const STATUS_ACTIVE: u32 = 0x20;
    /// Sticky error bits, see [`ErrorFlags`](crate::regs::ErrorFlags).
    pub const STATUS_ERRS: u32 = 0x24;

    /// The capture register map.
    pub const MAP: RegisterMap = RegisterMap {
        name: "capture",
        mem_addr_lo: CTRL_MEM_ADDR_LO,
        mem_addr_hi: CTRL_MEM_ADDR_HI,
        mem_range: CTRL_MEM_RANGE,
        addr_wr: CTRL_ADDR_WR,
        addr_rd: CTRL_ADDR_RD,
        status_active: STATUS_ACTIVE,
        status_pkt_cnt: STATUS_PKT_CNT,
        ctrl_start: Some(CTRL_ACTIVE),
        status_errs: Some(STATUS_ERRS),
        max_len_capture: Some(CTRL_MAX_LEN_CAPTURE),
        trace_size: None,
    };
}

/// Register offsets of the replay engine.
pub mod replay {
    use crate::regs::RegisterMap;

    /// Lower 32 bits of the ring window base.
    pub const CTRL_MEM_ADDR_LO: u32 = 0x00;
    /// Upper 32 bits of the ring window base.
    pub const CTRL_MEM_ADDR_HI: u32 = 0x04;
    /// Ring size minus one.
    pub const CTRL_MEM_RANGE: u32 = 0x08;
    /// Write pointer (owned by the host).
    pub const CTRL_ADDR_WR: u32 = 0x0C;
    /// Read pointer (owned by the engine).
    pub const CTRL_ADDR_RD: u32 = 0x10;
    /// Lower 32 bits of the trace size.
    pub const CTRL_TRACE_SIZE_LO: u32 = 0x14;
    /// Upper 32 bits of the trace size.
    pub const CTRL_TRACE_SIZE_HI: u32 = 0x18;
    /// Written non-zero to start replay.
    pub const CTRL_START: u32 = 0x1C;
    /// Non-zero while the engine is replaying.
    pub const STATUS_ACTIVE: u32 = 0x20;
    /// Number of replayed frames.
    pub const STATUS_PKT_CNT: u32 = 0x24;

    /// The replay register map.
    pub const MAP: RegisterMap = RegisterMap {
        name: "replay",
        mem_addr_lo: CTRL_MEM_ADDR_LO,
        mem_addr_hi: CTRL_MEM_ADDR_HI,
        mem_range: CTRL_MEM_RANGE,
        addr_wr: CTRL_ADDR_WR,
        addr_rd: CTRL_ADDR_RD,
        status_active: STATUS_ACTIVE,
        status_pkt_cnt: STATUS_PKT_CNT,
        ctrl_start: Some(CTRL_START),
        status_errs: None,
        max_len_capture: None,
        trace_size: Some((CTRL_TRACE_SIZE_LO, CTRL_TRACE_SIZE_HI)),
    };
}

bitflags::bitflags! {
    /// Sticky error bits of `STATUS_ERRS`.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ErrorFlags: u32 {
        /// A frame was dropped because the ring was full.
        const OVERFLOW = 1 << 0;
        /// An inter-frame gap did not fit the capture `delta_t` field and was saturated.
        const DELTA_SATURATED = 1 << 1;
    }
}

/// Offsets of the registers an engine uses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegisterMap {
    /// Name of the engine, for diagnostics.
    pub name: &'static str,
    /// Lower half of the window base.
    pub mem_addr_lo: u32,
    /// Upper half of the window base.
    pub mem_addr_hi: u32,
    /// Window size minus one.
    pub mem_range: u32,
    /// Write pointer.
    pub addr_wr: u32,
    /// Read pointer.
    pub addr_rd: u32,
    /// Engine activity.
    pub status_active: u32,
    /// Frame counter.
    pub status_pkt_cnt: u32,
    /// Start / activity request.
    pub ctrl_start: Option<u32>,
    /// Sticky error bits.
    pub status_errs: Option<u32>,
    /// Capture snap limit.
    pub max_len_capture: Option<u32>,
    /// Trace size as a (lo, hi) pair.
    pub trace_size: Option<(u32, u32)>,
}

/// Sixteen 32-bit registers addressed by byte offset.
#[derive(Debug)]
pub struct RegisterFile {
    regs: [AtomicU32; REGISTER_COUNT],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Create a register file with every register zero.
    #[must_use]
    pub fn new() -> Self {
        RegisterFile {
            regs: core::array::from_fn(|_| AtomicU32::new(0)),
        }
    }

    pub(crate) fn slot(&self, offset: u32) -> Result<&AtomicU32, RegisterError> {
        if offset % 4 != 0 {
            return Err(RegisterError::Unaligned(offset));
        }
        self.regs
            .get((offset / 4) as usize)
            .ok_or(RegisterError::OutOfRange(offset))
    }

    /// Read the register at `offset`.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] for unaligned or unknown offsets.
    pub fn read(&self, offset: u32) -> Result<u32, RegisterError> {
        Ok(self.slot(offset)?.load(Ordering::Acquire))
    }

    /// Write the register at `offset`.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] for unaligned or unknown offsets.
    pub fn write(&self, offset: u32, value: u32) -> Result<(), RegisterError> {
        self.slot(offset)?.store(value, Ordering::Release);
        Ok(())
    }
}

/// A [`RegisterFile`] seen through an engine's [`RegisterMap`].
///
/// Cloning shares the underlying register file, so the host and the engine observe the same
/// registers.
#[derive(Clone, Debug)]
pub struct Registers {
    file: Arc<RegisterFile>,
    map: RegisterMap,
}

impl Registers {
    /// Fresh registers of the capture engine.
    #[must_use]
    pub fn capture() -> Self {
        Self::with_map(capture::MAP)
    }

    /// Fresh registers of the replay engine.
    #[must_use]
    pub fn replay() -> Self {
        Self::with_map(replay::MAP)
    }

    /// Fresh registers laid out by `map`.
    ///
    /// Offsets of `map` which do not address a register fail on first use.
    #[must_use]
    pub fn with_map(map: RegisterMap) -> Self {
        Registers {
            file: Arc::new(RegisterFile::new()),
            map,
        }
    }

    /// The raw register file.
    #[must_use]
    pub fn file(&self) -> &RegisterFile {
        &self.file
    }

    /// The register map.
    #[must_use]
    pub fn map(&self) -> &RegisterMap {
        &self.map
    }

    /// True if both handles refer to the same register file.
    #[must_use]
    pub fn same_file(&self, other: &Registers) -> bool {
        Arc::ptr_eq(&self.file, &other.file)
    }

    fn optional<T>(offset: Option<T>, name: &'static str) -> Result<T, RegisterError> {
        offset.ok_or(RegisterError::Unmapped(name))
    }

    pub(crate) fn rd(&self) -> Result<&AtomicU32, RegisterError> {
        self.file.slot(self.map.addr_rd)
    }

    pub(crate) fn wr(&self) -> Result<&AtomicU32, RegisterError> {
        self.file.slot(self.map.addr_wr)
    }

    /// Program the ring window: its base address and its size.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map is broken.
    pub fn set_window(&self, base: u64, size: u32) -> Result<(), RegisterError> {
        #[allow(clippy::cast_possible_truncation)] // split in halves
        let (lo, hi) = (base as u32, (base >> 32) as u32);
        self.file.write(self.map.mem_addr_lo, lo)?;
        self.file.write(self.map.mem_addr_hi, hi)?;
        self.file.write(self.map.mem_range, size.wrapping_sub(1))
    }

    /// Base address of the ring window.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map is broken.
    pub fn mem_addr(&self) -> Result<u64, RegisterError> {
        let lo = self.file.read(self.map.mem_addr_lo)?;
        let hi = self.file.read(self.map.mem_addr_hi)?;
        Ok((u64::from(hi) << 32) | u64::from(lo))
    }

    /// Size of the ring window.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map is broken.
    pub fn mem_size(&self) -> Result<u64, RegisterError> {
        Ok(u64::from(self.file.read(self.map.mem_range)?) + 1)
    }

    /// Current value of the read pointer.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map is broken.
    pub fn read_pointer(&self) -> Result<u32, RegisterError> {
        self.file.read(self.map.addr_rd)
    }

    /// Current value of the write pointer.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map is broken.
    pub fn write_pointer(&self) -> Result<u32, RegisterError> {
        self.file.read(self.map.addr_wr)
    }

    /// Set or clear the activity status.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map is broken.
    pub fn set_active(&self, active: bool) -> Result<(), RegisterError> {
        self.file.write(self.map.status_active, u32::from(active))
    }

    /// Is the engine active?
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map is broken.
    pub fn active(&self) -> Result<bool, RegisterError> {
        Ok(self.file.read(self.map.status_active)? != 0)
    }

    /// Write the start / activity request register.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map has no such register.
    pub fn set_start(&self, start: bool) -> Result<(), RegisterError> {
        let offset = Self::optional(self.map.ctrl_start, "CTRL_START")?;
        self.file.write(offset, u32::from(start))
    }

    /// Read the start / activity request register.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map has no such register.
    pub fn start(&self) -> Result<bool, RegisterError> {
        let offset = Self::optional(self.map.ctrl_start, "CTRL_START")?;
        Ok(self.file.read(offset)? != 0)
    }

    /// Count one more frame.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map is broken.
    pub fn increment_packets(&self) -> Result<(), RegisterError> {
        self.file
            .slot(self.map.status_pkt_cnt)?
            .fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Reset the frame counter.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map is broken.
    pub fn clear_packets(&self) -> Result<(), RegisterError> {
        self.file.write(self.map.status_pkt_cnt, 0)
    }

    /// Number of frames counted.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map is broken.
    pub fn packets(&self) -> Result<u32, RegisterError> {
        self.file.read(self.map.status_pkt_cnt)
    }

    /// Set sticky error bits.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map has no error register.
    pub fn raise(&self, flags: ErrorFlags) -> Result<(), RegisterError> {
        let offset = Self::optional(self.map.status_errs, "STATUS_ERRS")?;
        self.file.slot(offset)?.fetch_or(flags.bits(), Ordering::AcqRel);
        Ok(())
    }

    /// The sticky error bits.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map has no error register.
    pub fn errors(&self) -> Result<ErrorFlags, RegisterError> {
        let offset = Self::optional(self.map.status_errs, "STATUS_ERRS")?;
        Ok(ErrorFlags::from_bits_retain(self.file.read(offset)?))
    }

    /// Clear every sticky error bit.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map has no error register.
    pub fn clear_errors(&self) -> Result<(), RegisterError> {
        let offset = Self::optional(self.map.status_errs, "STATUS_ERRS")?;
        self.file.write(offset, 0)
    }

    /// Program the capture snap limit.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map has no such register.
    pub fn set_max_capture_len(&self, len: u16) -> Result<(), RegisterError> {
        let offset = Self::optional(self.map.max_len_capture, "CTRL_MAX_LEN_CAPTURE")?;
        self.file.write(offset, u32::from(len))
    }

    /// The capture snap limit.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map has no such register.
    pub fn max_capture_len(&self) -> Result<u32, RegisterError> {
        let offset = Self::optional(self.map.max_len_capture, "CTRL_MAX_LEN_CAPTURE")?;
        self.file.read(offset)
    }

    /// Program the trace size.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map has no trace size registers.
    pub fn set_trace_size(&self, size: u64) -> Result<(), RegisterError> {
        let (lo, hi) = Self::optional(self.map.trace_size, "CTRL_TRACE_SIZE")?;
        #[allow(clippy::cast_possible_truncation)] // split in halves
        let (low, high) = (size as u32, (size >> 32) as u32);
        self.file.write(lo, low)?;
        self.file.write(hi, high)
    }

    /// The trace size.
    ///
    /// # Errors
    ///
    /// Returns a [`RegisterError`] if the map has no trace size registers.
    pub fn trace_size(&self) -> Result<u64, RegisterError> {
        let (lo, hi) = Self::optional(self.map.trace_size, "CTRL_TRACE_SIZE")?;
        Ok((u64::from(self.file.read(hi)?) << 32) | u64::from(self.file.read(lo)?))
    }
}
