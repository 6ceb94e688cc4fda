// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Encoding and decoding of single records.

use crate::error::{CodecError, Field};
use crate::layout::{BUS_WIDTH, META_LEN, ReplayMeta, SENTINEL, TraceMeta};
use crate::len::FrameLen;
use crate::record::TraceRecord;
use core::num::NonZero;

/// Round `len` up to the next multiple of the meta word size.
#[must_use]
pub const fn padded_len(len: usize) -> usize {
    len.next_multiple_of(META_LEN)
}

/// Number of bytes occupied by a record storing `snap_len` payload bytes.
#[must_use]
pub const fn record_len(snap_len: usize) -> usize {
    META_LEN + padded_len(snap_len)
}

/// Offset of the first record following sentinel padding which starts at `offset`.
#[must_use]
pub const fn padding_end(offset: usize) -> usize {
    (offset / BUS_WIDTH + 1) * BUS_WIDTH
}

/// Result of decoding at an offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded<M> {
    /// A complete record.
    Record {
        /// The decoded record.
        record: TraceRecord<M>,
        /// Number of bytes the record occupies (always a multiple of 8).
        consumed: NonZero<usize>,
    },
    /// The offset holds a sentinel word, or is the end of the buffer.
    EndOfTrace,
}

/// Encode one replay direction record.
///
/// # Errors
///
/// * [`CodecError::FieldOverflow`] if a length exceeds 2047 or `snap_len > wire_len`.
/// * [`CodecError::PayloadTooShort`] if `payload` holds fewer than `snap_len` bytes.
pub fn encode(
    wire_len: u16,
    snap_len: u16,
    delta_t: u32,
    payload: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let wire_len = FrameLen::new(wire_len).map_err(|e| CodecError::length(Field::WireLen, e))?;
    let snap_len = FrameLen::new(snap_len).map_err(|e| CodecError::length(Field::SnapLen, e))?;
    let meta = ReplayMeta::new(wire_len, snap_len, delta_t)?;
    let mut out = Vec::with_capacity(record_len(snap_len.as_usize()));
    encode_record(&meta, payload, &mut out)?;
    Ok(out)
}

/// Append one record to `out`.
///
/// Only the first `snap_len` bytes of `payload` are stored.  On error nothing is appended.
///
/// # Errors
///
/// Returns [`CodecError::PayloadTooShort`] if `payload` holds fewer than `snap_len` bytes.
pub fn encode_record<M: TraceMeta>(
    meta: &M,
    payload: &[u8],
    out: &mut Vec<u8>,
) -> Result<NonZero<usize>, CodecError> {
    let snap_len = meta.snap_len();
    let Some(data) = payload.get(..snap_len.as_usize()) else {
        return Err(CodecError::PayloadTooShort {
            snap_len: snap_len.get(),
            actual: payload.len(),
        });
    };
    let len = record_len(data.len());
    let start = out.len();
    out.reserve(len);
    out.extend_from_slice(&meta.to_word().to_le_bytes());
    out.extend_from_slice(data);
    out.resize(start + len, 0);
    Ok(NonZero::new(len).unwrap_or_else(|| unreachable!()))
}

/// Decode the replay direction record at `offset`.
///
/// # Errors
///
/// See [`decode_with`].
pub fn decode(buffer: &[u8], offset: usize) -> Result<Decoded<ReplayMeta>, CodecError> {
    decode_with(buffer, offset, ())
}

/// Read the raw meta word at `offset`.
///
/// Returns `Ok(None)` at the end of the buffer.
///
/// # Errors
///
/// * [`CodecError::Unaligned`] if `offset` is not a multiple of 8.
/// * [`CodecError::TruncatedRecord`] if fewer than 8 bytes remain.
pub fn read_word(buffer: &[u8], offset: usize) -> Result<Option<u64>, CodecError> {
    if offset % META_LEN != 0 {
        return Err(CodecError::Unaligned { offset });
    }
    if offset == buffer.len() {
        return Ok(None);
    }
    let available = buffer.len().saturating_sub(offset);
    let Some(bytes) = buffer.get(offset..).and_then(|rest| rest.first_chunk::<META_LEN>()) else {
        return Err(CodecError::TruncatedRecord {
            offset,
            needed: META_LEN,
            available,
        });
    };
    Ok(Some(u64::from_le_bytes(*bytes)))
}

/// Decode the record at `offset` using layout `M`.
///
/// # Errors
///
/// * [`CodecError::Unaligned`] if `offset` is not a multiple of 8.
/// * [`CodecError::TruncatedRecord`] if the buffer ends inside the record.
/// * [`CodecError::InvalidMeta`] if the meta word violates the layout.
pub fn decode_with<M: TraceMeta>(
    buffer: &[u8],
    offset: usize,
    param: M::Param,
) -> Result<Decoded<M>, CodecError> {
    let word = match read_word(buffer, offset)? {
        None | Some(SENTINEL) => return Ok(Decoded::EndOfTrace),
        Some(word) => word,
    };
    let meta = M::from_word(word, param)?;
    let snap_len = meta.snap_len().as_usize();
    let needed = record_len(snap_len);
    let available = buffer.len() - offset;
    if available < needed {
        return Err(CodecError::TruncatedRecord {
            offset,
            needed,
            available,
        });
    }
    let start = offset + META_LEN;
    let payload = buffer[start..start + snap_len].to_vec();
    Ok(Decoded::Record {
        record: TraceRecord::from_parts(meta, payload),
        consumed: NonZero::new(needed).unwrap_or_else(|| unreachable!()),
    })
}

/// Append sentinel words until the length of `trace` is a multiple of [`BUS_WIDTH`].
///
/// Returns the number of bytes appended.
pub fn pad_trace(trace: &mut Vec<u8>) -> usize {
    debug_assert_eq!(trace.len() % META_LEN, 0);
    let target = trace.len().next_multiple_of(BUS_WIDTH);
    let added = target - trace.len();
    for _ in 0..added / META_LEN {
        trace.extend_from_slice(&SENTINEL.to_le_bytes());
    }
    added
}

#[cfg(test)]
mod test {
    use crate::codec::{Decoded, decode, decode_with, encode, encode_record, pad_trace, padded_len, record_len};
    use crate::error::{CodecError, Field};
    use crate::layout::{BUS_WIDTH, CaptureMeta, META_LEN, ReplayMeta, SENTINEL, TraceMeta};
    use crate::len::FrameLen;
    use pretty_assertions::assert_eq;

    #[test]
    fn padding_arithmetic() {
        assert_eq!(padded_len(0), 0);
        assert_eq!(padded_len(1), 8);
        assert_eq!(padded_len(8), 8);
        assert_eq!(padded_len(60), 64);
        assert_eq!(record_len(0), 8);
        assert_eq!(record_len(60), 72);
        assert_eq!(record_len(2047), 2056);
    }

    #[test]
    fn sixty_byte_record_is_seventy_two_bytes() {
        let payload: Vec<u8> = (0..60).collect();
        let encoded = encode(60, 60, 100, &payload).unwrap();
        assert_eq!(encoded.len(), 72);
        assert_eq!(&encoded[8..68], payload.as_slice());
        assert_eq!(&encoded[68..], &[0, 0, 0, 0]);

        let Decoded::Record { record, consumed } = decode(&encoded, 0).unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(consumed.get(), 72);
        assert_eq!(record.delta_t(), 100);
        assert_eq!(record.wire_len().get(), 60);
        assert_eq!(record.payload(), payload.as_slice());
    }

    #[test]
    fn snapped_record_stores_only_snap_bytes() {
        let payload = [0xAAu8; 1514];
        let encoded = encode(1514, 64, 0, &payload).unwrap();
        assert_eq!(encoded.len(), 72);
        let Decoded::Record { record, .. } = decode(&encoded, 0).unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(record.wire_len().get(), 1514);
        assert_eq!(record.snap_len().get(), 64);
        assert_eq!(record.payload(), &payload[..64]);
    }

    #[test]
    fn empty_snap_is_a_bare_meta_word() {
        let encoded = encode(60, 0, 9, &[]).unwrap();
        assert_eq!(encoded.len(), META_LEN);
        let Decoded::Record { record, consumed } = decode(&encoded, 0).unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(consumed.get(), META_LEN);
        assert!(record.payload().is_empty());
        assert_eq!(record.frame(), vec![0; 60]);
    }

    #[test]
    fn encode_rejects_bad_lengths() {
        assert_eq!(
            encode(3000, 60, 0, &[0; 60]),
            Err(CodecError::FieldOverflow {
                field: Field::WireLen,
                value: 3000,
                max: 2047
            })
        );
        assert!(matches!(
            encode(60, 61, 0, &[0; 61]),
            Err(CodecError::FieldOverflow {
                field: Field::SnapLen,
                ..
            })
        ));
        assert_eq!(
            encode(60, 60, 0, &[0; 10]),
            Err(CodecError::PayloadTooShort {
                snap_len: 60,
                actual: 10
            })
        );
    }

    #[test]
    fn failed_encode_leaves_output_untouched() {
        let meta = ReplayMeta::new(FrameLen::new(60).unwrap(), FrameLen::new(60).unwrap(), 0).unwrap();
        let mut out = vec![1, 2, 3];
        assert!(encode_record(&meta, &[0; 59], &mut out).is_err());
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn decode_reports_truncation() {
        let encoded = encode(60, 60, 0, &[7; 60]).unwrap();
        assert_eq!(
            decode(&encoded[..40], 0),
            Err(CodecError::TruncatedRecord {
                offset: 0,
                needed: 72,
                available: 40
            })
        );
        assert_eq!(
            decode(&encoded[..4], 0),
            Err(CodecError::TruncatedRecord {
                offset: 0,
                needed: META_LEN,
                available: 4
            })
        );
        assert_eq!(
            decode(&encoded, 80),
            Err(CodecError::TruncatedRecord {
                offset: 80,
                needed: META_LEN,
                available: 0
            })
        );
    }

    #[test]
    fn decode_rejects_unaligned_offsets() {
        let encoded = encode(60, 60, 0, &[7; 60]).unwrap();
        assert_eq!(decode(&encoded, 3), Err(CodecError::Unaligned { offset: 3 }));
    }

    #[test]
    fn sentinel_and_buffer_end_are_end_of_trace() {
        let mut trace = encode(60, 60, 0, &[7; 60]).unwrap();
        assert_eq!(decode(&trace, trace.len()), Ok(Decoded::EndOfTrace));
        let added = pad_trace(&mut trace);
        assert_eq!(added, 56);
        assert_eq!(trace.len(), 128);
        assert_eq!(decode(&trace, 72), Ok(Decoded::EndOfTrace));
        assert!(trace[72..].chunks(8).all(|word| word == SENTINEL.to_le_bytes()));
    }

    #[test]
    fn pad_trace_is_idempotent_on_aligned_traces() {
        let mut trace = vec![0u8; BUS_WIDTH];
        assert_eq!(pad_trace(&mut trace), 0);
        assert_eq!(trace.len(), BUS_WIDTH);
    }

    #[test]
    fn capture_records_decode_with_their_capture_limit() {
        let meta = CaptureMeta::new(
            FrameLen::new(1000).unwrap(),
            FrameLen::new(100).unwrap(),
            5,
            None,
        )
        .unwrap();
        let frame = vec![0x5A; 1000];
        let mut out = Vec::new();
        let consumed = encode_record(&meta, &frame, &mut out).unwrap();
        assert_eq!(consumed.get(), record_len(100));
        let Decoded::Record { record, .. } =
            decode_with::<CaptureMeta>(&out, 0, FrameLen::new(100).unwrap()).unwrap()
        else {
            panic!("expected a record");
        };
        assert_eq!(record.meta(), &meta);
        assert_eq!(record.payload(), &frame[..100]);
    }

    #[test]
    fn encoded_records_round_trip() {
        bolero::check!()
            .with_type()
            .for_each(|(meta, fill): &(ReplayMeta, u8)| {
                let payload = vec![*fill; meta.snap_len().as_usize()];
                let mut out = Vec::new();
                let consumed = encode_record(meta, &payload, &mut out).unwrap();
                assert_eq!(out.len(), consumed.get());
                assert_eq!(out.len() % META_LEN, 0);
                assert_eq!(out.len(), record_len(payload.len()));
                let Decoded::Record { record, consumed: decoded } = decode(&out, 0).unwrap() else {
                    panic!("expected a record");
                };
                assert_eq!(decoded, consumed);
                assert_eq!(record.meta(), meta);
                assert_eq!(record.payload(), payload.as_slice());
            });
    }
}
