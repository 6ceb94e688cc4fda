// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Random trace generation.

use crate::error::{CodecError, Field};
use crate::layout::ReplayMeta;
use crate::len::FrameLen;
use crate::record::TraceRecord;
use crate::writer::TraceWriter;
use etherparse::{EtherType, Ethernet2Header};
use rand::Rng;

/// Local experimental ether type carried by generated frames.
pub const ETHER_TYPE: EtherType = EtherType(0x88B5);
/// Source MAC of generated frames.
pub const SOURCE: [u8; 6] = [0x53, 0x00, 0x00, 0x00, 0x00, 0x01];
/// Destination MAC of generated frames.
pub const DESTINATION: [u8; 6] = [0x53, 0x00, 0x00, 0x00, 0x00, 0x02];

const MIN_PAYLOAD: u32 = 50;
const MAX_PAYLOAD: u32 = 100;

/// A generated trace together with the records it was built from.
#[derive(Clone, Debug)]
pub struct GeneratedTrace {
    /// The complete (padded) trace.
    pub trace: Vec<u8>,
    /// The records in trace order, for comparison against replayed output.
    pub records: Vec<TraceRecord<ReplayMeta>>,
}

fn below<R: Rng + ?Sized>(rng: &mut R, bound: u32) -> u32 {
    rng.next_u32() % bound
}

/// Generate a random frame: an Ethernet header followed by 50 to 100 random bytes.
pub fn random_frame<R: Rng + ?Sized>(rng: &mut R) -> Vec<u8> {
    let header = Ethernet2Header {
        source: SOURCE,
        destination: DESTINATION,
        ether_type: ETHER_TYPE,
    };
    let payload_len = MIN_PAYLOAD + below(rng, MAX_PAYLOAD - MIN_PAYLOAD + 1);
    let mut frame = Vec::with_capacity(Ethernet2Header::LEN + payload_len as usize);
    frame.extend_from_slice(&header.to_bytes());
    frame.extend((0..payload_len).map(|_| rng.next_u32().to_le_bytes()[0] & 0x7F));
    frame
}

/// Generate a trace of `count` random records.
///
/// Every record stores between 14 bytes (the Ethernet header) and the whole frame, and carries a
/// random 32-bit `delta_t`.
///
/// # Errors
///
/// Never fails for the frame sizes produced here; the error is propagated from the codec.
pub fn random_trace<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Result<GeneratedTrace, CodecError> {
    let mut writer = TraceWriter::new();
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let frame = random_frame(rng);
        let wire_len = FrameLen::try_from(frame.len())
            .map_err(|e| CodecError::length(Field::WireLen, e))?;
        let min_snap = u32::try_from(Ethernet2Header::LEN).unwrap_or(u32::MAX);
        let snap = min_snap + below(rng, u32::from(wire_len.get()) - min_snap + 1);
        let snap_len = FrameLen::try_from(snap as usize)
            .map_err(|e| CodecError::length(Field::SnapLen, e))?;
        let meta = ReplayMeta::new(wire_len, snap_len, rng.next_u32())?;
        let record = TraceRecord::new(meta, &frame)?;
        writer.push_record(&record);
        records.push(record);
    }
    Ok(GeneratedTrace {
        trace: writer.finish(),
        records,
    })
}

#[cfg(test)]
mod test {
    use crate::generate::{DESTINATION, SOURCE, random_frame, random_trace};
    use crate::layout::{BUS_WIDTH, ReplayMeta};
    use crate::reader::TraceReader;

    #[test]
    fn frames_carry_an_ethernet_header() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let frame = random_frame(&mut rng);
            assert!((64..=114).contains(&frame.len()));
            assert_eq!(&frame[..6], &DESTINATION);
            assert_eq!(&frame[6..12], &SOURCE);
            assert_eq!(&frame[12..14], &[0x88, 0xB5]);
            assert!(frame[14..].iter().all(|b| *b < 0x80));
        }
    }

    #[test]
    fn generated_trace_reads_back() {
        let mut rng = rand::rng();
        let generated = random_trace(500, &mut rng).unwrap();
        assert_eq!(generated.trace.len() % BUS_WIDTH, 0);
        let decoded: Vec<_> = TraceReader::<ReplayMeta>::new(&generated.trace, ())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(decoded, generated.records);
        for record in &decoded {
            assert!(record.snap_len().get() >= 14);
            assert!(record.snap_len() <= record.wire_len());
        }
    }
}
