// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Iteration over the records of a complete trace.

use crate::codec::{Decoded, decode_with, padding_end, read_word};
use crate::error::{CodecError, RecordError};
use crate::layout::{META_LEN, SENTINEL, TraceMeta};
use crate::record::TraceRecord;

/// Iterator over every record of a trace buffer.
///
/// Sentinel padding is skipped up to the next bus width boundary, so the concatenation of
/// several complete traces reads as one long trace.  Iteration stops at the end of the buffer
/// or after the first error.
#[derive(Debug)]
pub struct TraceReader<'a, M: TraceMeta> {
    buf: &'a [u8],
    param: M::Param,
    offset: usize,
    index: usize,
    failed: bool,
}

impl<'a, M: TraceMeta> TraceReader<'a, M> {
    /// Read `buf` using layout `M`.
    #[must_use]
    pub fn new(buf: &'a [u8], param: M::Param) -> Self {
        TraceReader {
            buf,
            param,
            offset: 0,
            index: 0,
            failed: false,
        }
    }

    /// Offset of the next record.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of records returned so far.
    #[must_use]
    pub fn records_read(&self) -> usize {
        self.index
    }

    fn fail(&mut self, source: CodecError) -> RecordError {
        self.failed = true;
        RecordError {
            index: self.index,
            offset: self.offset,
            source,
        }
    }

    fn skip_padding(&mut self) -> Result<(), CodecError> {
        let end = padding_end(self.offset);
        if end > self.buf.len() {
            return Err(CodecError::TruncatedRecord {
                offset: self.offset,
                needed: end - self.offset,
                available: self.buf.len() - self.offset,
            });
        }
        for at in (self.offset..end).step_by(META_LEN) {
            match read_word(self.buf, at)? {
                Some(SENTINEL) => {}
                Some(word) => return Err(CodecError::InvalidMeta { word }),
                None => unreachable!(),
            }
        }
        self.offset = end;
        Ok(())
    }
}

impl<M: TraceMeta> Iterator for TraceReader<'_, M> {
    type Item = Result<TraceRecord<M>, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed || self.offset == self.buf.len() {
                return None;
            }
            match decode_with::<M>(self.buf, self.offset, self.param) {
                Ok(Decoded::Record { record, consumed }) => {
                    self.offset += consumed.get();
                    self.index += 1;
                    return Some(Ok(record));
                }
                Ok(Decoded::EndOfTrace) => {
                    if let Err(e) = self.skip_padding() {
                        return Some(Err(self.fail(e)));
                    }
                }
                Err(e) => return Some(Err(self.fail(e))),
            }
        }
    }
}
