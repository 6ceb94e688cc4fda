// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Incremental construction of complete traces.

use crate::codec::{encode_record, pad_trace};
use crate::error::CodecError;
use crate::layout::TraceMeta;
use crate::record::TraceRecord;
use core::marker::PhantomData;

/// Accumulates records of layout `M` into a trace buffer.
#[derive(Debug)]
pub struct TraceWriter<M> {
    buf: Vec<u8>,
    records: usize,
    _layout: PhantomData<M>,
}

impl<M: TraceMeta> Default for TraceWriter<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: TraceMeta> TraceWriter<M> {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        TraceWriter {
            buf: Vec::new(),
            records: 0,
            _layout: PhantomData,
        }
    }

    /// Append a record built from `meta` and the first `snap_len` bytes of `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::PayloadTooShort`] if `payload` is shorter than the snap length.
    pub fn push(&mut self, meta: &M, payload: &[u8]) -> Result<(), CodecError> {
        encode_record(meta, payload, &mut self.buf)?;
        self.records += 1;
        Ok(())
    }

    /// Append an already decoded record.
    pub fn push_record(&mut self, record: &TraceRecord<M>) {
        // the payload of a record always covers its snap length
        if self.push(record.meta(), record.payload()).is_err() {
            unreachable!()
        }
    }

    /// Number of records written so far.
    #[must_use]
    pub fn records(&self) -> usize {
        self.records
    }

    /// Number of bytes written so far (excluding end padding).
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Pad the trace to a multiple of the bus width and return it.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        pad_trace(&mut self.buf);
        self.buf
    }
}

impl<M: TraceMeta> Extend<TraceRecord<M>> for TraceWriter<M> {
    fn extend<T: IntoIterator<Item = TraceRecord<M>>>(&mut self, iter: T) {
        for record in iter {
            self.push_record(&record);
        }
    }
}
