// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The replay engine.
//!
//! The engine is the consumer of a ring the host fills with a trace.  It decodes one record at
//! a time, waits for the record's gap and hands the zero extended frame to a [`FrameSink`].

use crate::error::ReplayError;
use crate::pacer::Pacer;
use crate::sink::{FrameSink, ReplayedFrame};
use ring::{Consumer, Registers, Waiter};
use stats::EngineStats;
use std::sync::Arc;
use trace::codec::padding_end;
use trace::{BUS_WIDTH, CodecError, META_LEN, SENTINEL, TraceMeta, TraceRecord, record_len};

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Static configuration of a replay run.
#[derive(Copy, Clone, Debug)]
pub struct ReplayConfig<M: TraceMeta> {
    trace_size: usize,
    param: M::Param,
}

impl<M: TraceMeta> ReplayConfig<M> {
    /// Replay exactly `trace_size` bytes, decoding meta words with `param`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::TraceSize`] unless `trace_size` is a non-zero multiple of the bus
    /// width.
    pub fn new(trace_size: u64, param: M::Param) -> Result<Self, ReplayError> {
        let Ok(size) = usize::try_from(trace_size) else {
            return Err(ReplayError::TraceSize(trace_size));
        };
        if size == 0 || size % BUS_WIDTH != 0 {
            return Err(ReplayError::TraceSize(trace_size));
        }
        Ok(Self {
            trace_size: size,
            param,
        })
    }

    /// Take the trace size from the `CTRL_TRACE_SIZE_*` registers.
    ///
    /// # Errors
    ///
    /// See [`ReplayConfig::new`]; also fails if the trace size registers are not mapped.
    pub fn from_registers(registers: &Registers, param: M::Param) -> Result<Self, ReplayError> {
        Self::new(registers.trace_size()?, param)
    }

    /// Bytes consumed per run.
    #[must_use]
    pub fn trace_size(&self) -> usize {
        self.trace_size
    }

    /// Parameter used to decode meta words.
    #[must_use]
    pub fn param(&self) -> M::Param {
        self.param
    }
}

/// What the engine is doing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReplayState {
    /// Not running.
    Idle,
    /// Consuming the trace.
    Draining,
}

/// Result of a complete run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Frames transmitted.
    pub frames: u64,
    /// Trace bytes consumed, padding included.
    pub bytes: u64,
    /// Departure tick of the last frame.
    pub ticks: u64,
}

/// Replays a trace from a ring into a [`FrameSink`].
#[derive(Debug)]
pub struct ReplayEngine<M: TraceMeta, S: FrameSink, P: Pacer> {
    consumer: Consumer,
    config: ReplayConfig<M>,
    sink: S,
    pacer: P,
    stats: Arc<EngineStats>,
    state: ReplayState,
    scratch: Vec<u8>,
}

impl<M: TraceMeta, S: FrameSink, P: Pacer> ReplayEngine<M, S, P> {
    /// Create a new idle [`ReplayEngine`] reading from `consumer`.
    pub fn new(consumer: Consumer, config: ReplayConfig<M>, sink: S, pacer: P) -> Self {
        Self {
            consumer,
            config,
            sink,
            pacer,
            stats: Arc::new(EngineStats::new("replay")),
            state: ReplayState::Idle,
            scratch: Vec::new(),
        }
    }

    /// The engine counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    /// What the engine is doing.
    #[must_use]
    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// The registers of the ring the engine reads.
    #[must_use]
    pub fn registers(&self) -> &Registers {
        self.consumer.registers()
    }

    /// The frame sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Give back the ring end and the sink.
    pub fn into_parts(self) -> (Consumer, S) {
        (self.consumer, self.sink)
    }

    /// Replay one trace of the configured size.
    ///
    /// `STATUS_ACTIVE` is set for the duration of the run and `STATUS_PKT_CNT` counts the frames
    /// transmitted.  The engine returns to [`ReplayState::Idle`] whatever the outcome.
    ///
    /// # Errors
    ///
    /// * [`ReplayError::Malformed`] on the first record which does not decode.
    /// * [`ReplayError::Aborted`] if an abort was requested while waiting for the ring.
    /// * [`ReplayError::Sink`] if the sink refuses a frame.
    /// * [`ReplayError::Ring`] if the ring is misconfigured.
    #[tracing::instrument(level = "info", skip_all, fields(layout = M::NAME, size = self.config.trace_size))]
    pub fn run(&mut self, waiter: &Waiter) -> Result<ReplaySummary, ReplayError> {
        let registers = self.consumer.registers().clone();
        registers.clear_packets()?;
        registers.set_active(true)?;
        self.state = ReplayState::Draining;
        self.pacer.start();
        let result = self.drain(waiter);
        self.state = ReplayState::Idle;
        registers.set_active(false)?;
        match &result {
            Ok(summary) => info!("replayed {} frames ({} bytes)", summary.frames, summary.bytes),
            Err(e) => error!("replay failed: {e}"),
        }
        result
    }

    fn drain(&mut self, waiter: &Waiter) -> Result<ReplaySummary, ReplayError> {
        let mut summary = ReplaySummary::default();
        let mut offset = 0;
        let mut index = 0;
        while offset < self.config.trace_size {
            let word = self.next_word(waiter)?;
            if word == SENTINEL {
                offset = self.skip_padding(offset, index, waiter)?;
                continue;
            }
            let malformed = |source| ReplayError::Malformed {
                index,
                offset,
                source,
            };
            let meta = M::from_word(word, self.config.param).map_err(malformed)?;
            let needed = record_len(meta.snap_len().as_usize());
            let available = self.config.trace_size - offset;
            if needed > available {
                return Err(malformed(CodecError::TruncatedRecord {
                    offset,
                    needed,
                    available,
                }));
            }
            self.consume(needed, waiter)?;
            let record = TraceRecord::new(meta, &self.scratch[META_LEN..]).map_err(malformed)?;
            let gap = if index == 0 { 0 } else { u64::from(record.delta_t()) };
            let at = self.pacer.wait(gap);
            let frame = ReplayedFrame {
                gap,
                at,
                data: record.frame(),
            };
            trace!("record #{index} at {offset}: {meta:?}, departs at {at}");
            self.sink
                .transmit(frame)
                .map_err(|e| ReplayError::Sink(Box::new(e)))?;
            self.consumer.registers().increment_packets()?;
            self.stats.record_frame(needed as u64);
            offset += needed;
            index += 1;
            summary.frames += 1;
            summary.ticks = at;
        }
        summary.bytes = offset as u64;
        Ok(summary)
    }

    /// Skip the sentinel words from `offset` up to the next bus width boundary.
    fn skip_padding(&mut self, mut offset: usize, index: usize, waiter: &Waiter) -> Result<usize, ReplayError> {
        let end = padding_end(offset).min(self.config.trace_size);
        trace!("padding from {offset} to {end}");
        while offset < end {
            let word = self.next_word(waiter)?;
            if word != SENTINEL {
                return Err(ReplayError::Malformed {
                    index,
                    offset,
                    source: CodecError::InvalidMeta { word },
                });
            }
            #[allow(clippy::cast_possible_truncation)] // a meta word
            let word_len = META_LEN as u32;
            self.consumer.wait_skip(word_len, waiter)?;
            self.stats.record_padding(META_LEN as u64);
            offset += META_LEN;
        }
        Ok(offset)
    }

    fn next_word(&mut self, waiter: &Waiter) -> Result<u64, ReplayError> {
        let Self { consumer, stats, .. } = self;
        Ok(waiter.wait_until(|| {
            let word = consumer.try_peek_word()?;
            if word.is_none() {
                stats.record_stalls(1);
            }
            Ok(word)
        })?)
    }

    fn consume(&mut self, len: usize, waiter: &Waiter) -> Result<(), ReplayError> {
        let Self {
            consumer,
            stats,
            scratch,
            ..
        } = self;
        scratch.resize(len, 0);
        Ok(waiter.wait_until(|| {
            let done = consumer.try_consume(scratch.as_mut_slice())?;
            if !done {
                stats.record_stalls(1);
            }
            Ok(done.then_some(()))
        })?)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod test {
    use crate::engine::{ReplayConfig, ReplayEngine, ReplayState};
    use crate::error::ReplayError;
    use crate::pacer::VirtualPacer;
    use crate::sink::VecSink;
    use pretty_assertions::assert_eq;
    use ring::{Arc, Control, Memory, Registers, Ring, RingGeometry, Waiter};
    use trace::{CodecError, FrameLen, ReplayMeta, TraceWriter};
    use tracing_test::traced_test;

    fn len(n: u16) -> FrameLen {
        FrameLen::new(n).unwrap()
    }

    /// Load `trace` into a ring big enough for all of it and replay it.
    fn replay(trace: &[u8]) -> (Result<crate::ReplaySummary, ReplayError>, VecSink, Registers) {
        let size = u32::try_from(trace.len()).unwrap() + 64;
        let memory = Arc::new(Memory::new(size as usize));
        let geometry = RingGeometry::new(size, 64).unwrap();
        let registers = Registers::replay();
        let (mut producer, consumer) = Ring::new(memory, 0, geometry, registers.clone()).unwrap();
        for step in trace.chunks(64) {
            assert!(producer.try_write(step).unwrap());
        }
        let config = ReplayConfig::<ReplayMeta>::new(trace.len() as u64, ()).unwrap();
        let mut engine = ReplayEngine::new(consumer, config, VecSink::default(), VirtualPacer::new());
        let waiter = Waiter::new(Arc::new(Control::new()), Waiter::DEFAULT_POLL);
        let result = engine.run(&waiter);
        assert_eq!(engine.state(), ReplayState::Idle);
        let (_, sink) = engine.into_parts();
        (result, sink, registers)
    }

    #[test]
    fn trace_sizes_are_bus_aligned() {
        assert!(matches!(
            ReplayConfig::<ReplayMeta>::new(0, ()),
            Err(ReplayError::TraceSize(0))
        ));
        assert!(matches!(
            ReplayConfig::<ReplayMeta>::new(100, ()),
            Err(ReplayError::TraceSize(100))
        ));
        let registers = Registers::replay();
        registers.set_trace_size(128).unwrap();
        let config = ReplayConfig::<ReplayMeta>::from_registers(&registers, ()).unwrap();
        assert_eq!(config.trace_size(), 128);
    }

    #[test]
    #[traced_test]
    fn frames_leave_with_their_gaps() {
        let mut writer = TraceWriter::new();
        writer.push(&ReplayMeta::new(len(60), len(60), 999).unwrap(), &[1; 60]).unwrap();
        writer.push(&ReplayMeta::new(len(64), len(64), 10).unwrap(), &[2; 64]).unwrap();
        writer.push(&ReplayMeta::new(len(64), len(64), 20).unwrap(), &[3; 64]).unwrap();
        let trace = writer.finish();
        let (result, sink, registers) = replay(&trace);
        let summary = result.unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.bytes, trace.len() as u64);
        assert_eq!(summary.ticks, 30);
        let gaps: Vec<_> = sink.frames.iter().map(|f| (f.gap, f.at)).collect();
        // the first record's delta_t is ignored
        assert_eq!(gaps, vec![(0, 0), (10, 10), (20, 30)]);
        assert_eq!(registers.packets(), Ok(3));
        assert_eq!(registers.active(), Ok(false));
        assert!(logs_contain("replayed 3 frames"));
    }

    #[test]
    fn short_snaps_are_zero_extended() {
        let mut writer = TraceWriter::new();
        let payload: Vec<u8> = (1..=20).collect();
        writer.push(&ReplayMeta::new(len(64), len(20), 0).unwrap(), &payload).unwrap();
        let (result, sink, _) = replay(&writer.finish());
        result.unwrap();
        let frame = &sink.frames[0].data;
        assert_eq!(frame.len(), 64);
        assert_eq!(&frame[..20], payload.as_slice());
        assert!(frame[20..].iter().all(|b| *b == 0));
    }

    #[test]
    fn concatenated_traces_replay_every_copy() {
        let mut writer = TraceWriter::new();
        for i in 0..5u8 {
            writer
                .push(&ReplayMeta::new(len(40), len(40), 7).unwrap(), &[i; 40])
                .unwrap();
        }
        let once = writer.finish();
        // 5 records of 48 bytes, then two sentinel words
        assert_eq!(once.len(), 256);
        let (result, sink, _) = replay(&once.repeat(3));
        let summary = result.unwrap();
        assert_eq!(summary.frames, 15);
        let tags: Vec<u8> = sink.frames.iter().map(|f| f.data[0]).collect();
        assert_eq!(tags, [0, 1, 2, 3, 4].repeat(3));
    }

    #[test]
    fn malformed_records_stop_the_run() {
        let mut writer = TraceWriter::new();
        writer.push(&ReplayMeta::new(len(56), len(56), 0).unwrap(), &[1; 56]).unwrap();
        let mut trace = writer.finish();
        assert_eq!(trace.len(), 64);
        // a reserved bit set in the second record
        let word: u64 = (1 << 63) | (8 << 48) | (8 << 32);
        trace.extend_from_slice(&word.to_le_bytes());
        trace.extend_from_slice(&[0; 56]);
        let (result, sink, registers) = replay(&trace);
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(registers.active(), Ok(false));
        match result {
            Err(ReplayError::Malformed { index, offset, source }) => {
                assert_eq!(index, 1);
                assert_eq!(offset, 64);
                assert_eq!(source, CodecError::InvalidMeta { word });
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbage_inside_padding_is_malformed() {
        let mut writer = TraceWriter::new();
        writer.push(&ReplayMeta::new(len(20), len(20), 0).unwrap(), &[1; 20]).unwrap();
        let mut trace = writer.finish();
        trace[48..56].copy_from_slice(&[0; 8]);
        let (result, _, _) = replay(&trace);
        assert!(matches!(
            result,
            Err(ReplayError::Malformed {
                index: 1,
                offset: 48,
                source: CodecError::InvalidMeta { word: 0 }
            })
        ));
    }
}
