// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors of the trace codec.

use crate::len::InvalidFrameLen;

/// A field of a meta word.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    /// Inter-frame gap in clock ticks.
    DeltaT,
    /// Number of payload bytes stored in the record.
    SnapLen,
    /// Length of the frame on the wire.
    WireLen,
    /// Latency measured by the capture direction.
    Latency,
}

impl core::fmt::Display for Field {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Field::DeltaT => "delta_t",
            Field::SnapLen => "snap_len",
            Field::WireLen => "wire_len",
            Field::Latency => "latency",
        };
        f.write_str(name)
    }
}

/// Errors which may occur when encoding or decoding a trace record.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A value does not fit the field it is encoded into.
    #[error("{field} value {value} does not fit its encoding (max {max})")]
    FieldOverflow {
        /// The offending field.
        field: Field,
        /// The value which was rejected.
        value: u64,
        /// The largest value the field accepts in this context.
        max: u64,
    },
    /// The buffer ends before the record does.
    #[error("record at offset {offset} needs {needed} bytes but only {available} are available")]
    TruncatedRecord {
        /// Offset of the record in the buffer.
        offset: usize,
        /// Bytes required by the record, counted from `offset`.
        needed: usize,
        /// Bytes present from `offset` to the end of the buffer.
        available: usize,
    },
    /// The payload handed to the encoder is shorter than the snap length.
    #[error("payload has {actual} bytes but the snap length is {snap_len}")]
    PayloadTooShort {
        /// Requested snap length.
        snap_len: u16,
        /// Length of the supplied payload.
        actual: usize,
    },
    /// The meta word violates its layout (reserved bits set or `snap_len > wire_len`).
    #[error("invalid meta word {word:#018x}")]
    InvalidMeta {
        /// The raw meta word.
        word: u64,
    },
    /// The encoded meta word would be indistinguishable from the end-of-trace sentinel.
    #[error("meta word collides with the end-of-trace sentinel")]
    SentinelCollision,
    /// Records only start at 8-byte aligned offsets.
    #[error("offset {offset} is not aligned to the meta word size")]
    Unaligned {
        /// The misaligned offset.
        offset: usize,
    },
}

impl CodecError {
    pub(crate) fn overflow(field: Field, value: impl Into<u64>, max: impl Into<u64>) -> CodecError {
        CodecError::FieldOverflow {
            field,
            value: value.into(),
            max: max.into(),
        }
    }

    pub(crate) fn length(field: Field, err: InvalidFrameLen) -> CodecError {
        CodecError::FieldOverflow {
            field,
            value: err.0 as u64,
            max: crate::len::FrameLen::MAX.get().into(),
        }
    }
}

/// A [`CodecError`] located in a trace.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("record #{index} at offset {offset}: {source}")]
pub struct RecordError {
    /// Zero based index of the failing record.
    pub index: usize,
    /// Byte offset of the failing record.
    pub offset: usize,
    /// What went wrong.
    #[source]
    pub source: CodecError,
}
