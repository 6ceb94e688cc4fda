// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ring buffer errors.

use crate::BUS_WIDTH;

/// Errors of the ring buffer and its configuration.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    /// The ring size is zero or not a multiple of the bus width.
    #[error("ring size {size} is not a non-zero multiple of the {BUS_WIDTH} byte bus width")]
    Misaligned {
        /// The rejected size.
        size: u64,
    },
    /// The ring cannot hold a single maximum sized transfer.
    #[error("ring size {size} must exceed the maximum transfer size {max_transfer}")]
    BufferTooSmall {
        /// The ring size.
        size: u64,
        /// The transfer (or record) size which does not fit.
        max_transfer: u64,
    },
    /// A transfer step was requested past the end of the ring.
    #[error("transfer of {len} bytes at offset {wr} overruns the ring end (extent {extent})")]
    RingOverrun {
        /// The write pointer.
        wr: u32,
        /// The requested length.
        len: u64,
        /// Bytes left before the ring end.
        extent: u32,
    },
    /// A transfer step is larger than the configured maximum.
    #[error("transfer of {len} bytes exceeds the maximum transfer size {max}")]
    TransferTooLarge {
        /// The requested length.
        len: u64,
        /// The configured maximum.
        max: u32,
    },
    /// The ring window does not fit the backing memory.
    #[error("ring window at {base:#x} of {size:#x} bytes exceeds memory of {memory:#x} bytes")]
    OutOfBounds {
        /// Start of the window.
        base: u64,
        /// Size of the window.
        size: u64,
        /// Size of the backing memory.
        memory: u64,
    },
    /// The ring window intersects a window another ring still uses.
    #[error("ring window at {base:#x} of {size:#x} bytes overlaps a window in use")]
    Overlap {
        /// Start of the window.
        base: u64,
        /// Size of the window.
        size: u64,
    },
    /// The producer and consumer handles do not belong to the same ring.
    #[error("producer and consumer belong to different rings")]
    Mismatch,
    /// A blocked transfer was aborted.
    #[error("transfer aborted")]
    Aborted,
    /// Register access failed.
    #[error(transparent)]
    Register(#[from] RegisterError),
}

/// Errors of register access.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    /// Register offsets are multiples of 4.
    #[error("register offset {0:#06x} is not 4-byte aligned")]
    Unaligned(u32),
    /// No register at this offset.
    #[error("no register at offset {0:#06x}")]
    OutOfRange(u32),
    /// The register is not part of this engine's map.
    #[error("register {0} is not mapped for this engine")]
    Unmapped(&'static str),
}

/// Errors of the bulk transfer agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The host side source or sink failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The ring refused the transfer.
    #[error(transparent)]
    Ring(#[from] RingError),
}
