// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Decoded trace records.

use crate::codec::record_len;
use crate::error::CodecError;
use crate::layout::TraceMeta;
use crate::len::FrameLen;

/// A single record of a trace: its meta word and the stored (snapped) payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceRecord<M> {
    meta: M,
    payload: Vec<u8>,
}

impl<M: TraceMeta> TraceRecord<M> {
    /// Create a record from its meta word and (at least `snap_len` bytes of) frame data.
    ///
    /// Bytes beyond `snap_len` are not stored.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::PayloadTooShort`] if `data` is shorter than the snap length.
    pub fn new(meta: M, data: &[u8]) -> Result<Self, CodecError> {
        let snap_len = meta.snap_len();
        let Some(payload) = data.get(..snap_len.as_usize()) else {
            return Err(CodecError::PayloadTooShort {
                snap_len: snap_len.get(),
                actual: data.len(),
            });
        };
        Ok(TraceRecord {
            meta,
            payload: payload.to_vec(),
        })
    }

    /// The meta word of this record.
    #[must_use]
    pub fn meta(&self) -> &M {
        &self.meta
    }

    /// The stored payload (exactly `snap_len` bytes).
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Gap to the previous record in clock ticks.
    #[must_use]
    pub fn delta_t(&self) -> u32 {
        self.meta.delta_t()
    }

    /// Length of the frame on the wire.
    #[must_use]
    pub fn wire_len(&self) -> FrameLen {
        self.meta.wire_len()
    }

    /// Number of stored payload bytes.
    #[must_use]
    pub fn snap_len(&self) -> FrameLen {
        self.meta.snap_len()
    }

    /// Number of bytes this record occupies in a trace.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        record_len(self.snap_len().as_usize())
    }

    /// The frame as it goes on the wire: the payload zero extended to `wire_len`.
    #[must_use]
    pub fn frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.wire_len().as_usize());
        frame.extend_from_slice(&self.payload);
        frame.resize(self.wire_len().as_usize(), 0);
        frame
    }

    /// Take the stored payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub(crate) fn from_parts(meta: M, payload: Vec<u8>) -> Self {
        debug_assert_eq!(payload.len(), meta.snap_len().as_usize());
        TraceRecord { meta, payload }
    }
}
