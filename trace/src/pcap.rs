// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Conversion between pcap captures and traces.

use crate::clock::{ClockRate, CycleCounter};
use crate::error::{CodecError, Field, RecordError};
use crate::layout::{ReplayMeta, TraceMeta};
use crate::len::FrameLen;
use crate::reader::TraceReader;
use crate::writer::TraceWriter;
use core::time::Duration;
use pcap_file::pcap::{PcapHeader, PcapPacket, PcapReader, PcapWriter};
use pcap_file::{DataLink, TsResolution};
use std::io::{Read, Write};

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Errors which may occur while converting between pcap and trace.
#[derive(Debug, thiserror::Error)]
pub enum PcapError {
    /// The pcap stream could not be read or written.
    #[error(transparent)]
    Pcap(#[from] pcap_file::PcapError),
    /// Only Ethernet captures can be converted.
    #[error("unsupported link type {0:?}")]
    LinkType(DataLink),
    /// A packet cannot be represented as a trace record.
    #[error("packet #{index}: {source}")]
    Packet {
        /// Zero based index of the packet in the capture.
        index: usize,
        /// Why the packet was rejected.
        #[source]
        source: CodecError,
    },
    /// The trace is malformed.
    #[error(transparent)]
    Trace(#[from] RecordError),
}

/// Summary of a conversion.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Conversion {
    /// Number of packets (records) converted.
    pub packets: usize,
    /// Number of trace bytes read or produced.
    pub trace_bytes: usize,
}

/// Convert a pcap stream into a replay trace.
///
/// The `delta_t` of each record is the gap since the previous packet, in ticks of `clock`; the
/// first record has `delta_t = 0`.  Packets are stored whole: `snap_len` is the captured length
/// and `wire_len` the original length of each packet.
///
/// # Errors
///
/// * [`PcapError::LinkType`] if the capture is not Ethernet.
/// * [`PcapError::Packet`] if a packet is longer than 2047 bytes or its gap exceeds 32 bits of
///   ticks.
#[tracing::instrument(level = "debug", skip(reader))]
pub fn import<R: Read>(reader: R, clock: ClockRate) -> Result<(Vec<u8>, Conversion), PcapError> {
    let mut pcap = PcapReader::new(reader)?;
    let header = pcap.header();
    if header.datalink != DataLink::ETHERNET {
        return Err(PcapError::LinkType(header.datalink));
    }
    let mut writer = TraceWriter::<ReplayMeta>::new();
    let mut ticks = CycleCounter::new(clock);
    let mut previous: Option<Duration> = None;
    let mut index = 0;
    while let Some(packet) = pcap.next_packet() {
        let packet = packet?;
        let gap = match previous {
            None => 0,
            Some(previous) => ticks.advance(packet.timestamp.saturating_sub(previous)),
        };
        previous = Some(packet.timestamp);
        let meta = import_meta(&packet, gap).map_err(|source| PcapError::Packet { index, source })?;
        writer
            .push(&meta, &packet.data)
            .map_err(|source| PcapError::Packet { index, source })?;
        trace!("packet #{index}: {meta:?}");
        index += 1;
    }
    let trace = writer.finish();
    let conversion = Conversion {
        packets: index,
        trace_bytes: trace.len(),
    };
    debug!("imported {conversion:?}");
    Ok((trace, conversion))
}

fn import_meta(packet: &PcapPacket<'_>, gap: u64) -> Result<ReplayMeta, CodecError> {
    let delta_t = u32::try_from(gap).map_err(|_| CodecError::overflow(Field::DeltaT, gap, u32::MAX))?;
    let wire_len = usize::try_from(packet.orig_len).unwrap_or(usize::MAX);
    let wire_len = FrameLen::try_from(wire_len).map_err(|e| CodecError::length(Field::WireLen, e))?;
    let snap_len =
        FrameLen::try_from(packet.data.len()).map_err(|e| CodecError::length(Field::SnapLen, e))?;
    ReplayMeta::new(wire_len, snap_len, delta_t)
}

/// Convert a trace into a nanosecond resolution Ethernet pcap stream.
///
/// The first packet is stamped at time zero and every following packet `delta_t` ticks later
/// than its predecessor.
///
/// # Errors
///
/// * [`PcapError::Trace`] if the trace is malformed.
/// * [`PcapError::Pcap`] if writing fails.
#[tracing::instrument(level = "debug", skip(trace, writer), fields(trace_len = trace.len()))]
pub fn export<M: TraceMeta, W: Write>(
    trace: &[u8],
    param: M::Param,
    clock: ClockRate,
    writer: W,
) -> Result<Conversion, PcapError> {
    let header = PcapHeader {
        datalink: DataLink::ETHERNET,
        ts_resolution: TsResolution::NanoSecond,
        ..Default::default()
    };
    let mut pcap = PcapWriter::with_header(writer, header)?;
    let mut ticks: u64 = 0;
    let mut packets = 0;
    for record in TraceReader::<M>::new(trace, param) {
        let record = record?;
        if packets > 0 {
            ticks = ticks.saturating_add(u64::from(record.delta_t()));
        }
        let packet = PcapPacket::new(
            clock.ticks_to_duration(ticks),
            u32::from(record.wire_len().get()),
            record.payload(),
        );
        pcap.write_packet(&packet)?;
        packets += 1;
    }
    let conversion = Conversion {
        packets,
        trace_bytes: trace.len(),
    };
    debug!("exported {conversion:?}");
    Ok(conversion)
}
