// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The capture engine.
//!
//! The engine is the producer of a ring the host drains.  Every arriving frame becomes one
//! [`CaptureMeta`] record which is committed to the ring in one piece.  Stopping the engine
//! pads the captured data with sentinel words to a multiple of the bus width.

use crate::config::{CaptureConfig, OverflowPolicy};
use crate::error::CaptureError;
use ring::{ErrorFlags, Producer, Registers, RingError, Waiter};
use static_assertions::const_assert_eq;
use stats::EngineStats;
use std::sync::Arc;
use trace::{
    BUS_WIDTH, CaptureMeta, CodecError, Field, FrameLen, META_LEN, SENTINEL, encode_record, record_len,
};

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

const_assert_eq!(ring::BUS_WIDTH as usize, BUS_WIDTH);

/// A frame arriving from the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrivingFrame {
    /// The whole frame.
    pub data: Vec<u8>,
    /// Arrival time in clock ticks.
    pub arrival: u64,
    /// Latency measurement, if the frame carried one.
    pub latency: Option<u32>,
}

/// What the engine is doing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CaptureState {
    /// Not running.
    Idle,
    /// Recording arriving frames.
    Capturing,
    /// Padding the trace before going idle.
    Flushing,
}

/// Fate of a single frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Captured {
    /// The record was committed to the ring.
    Stored {
        /// Size of the record in bytes.
        bytes: usize,
    },
    /// The ring was full and the frame was dropped.
    Dropped,
}

/// Totals of a capture run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Frames stored.
    pub frames: u64,
    /// Frames dropped on overflow.
    pub dropped: u64,
    /// Frames which could not be encoded.
    pub rejected: u64,
    /// Bytes committed to the ring, padding included.  Always a multiple of the bus width.
    pub bytes: u64,
}

/// Records arriving frames into a ring.
#[derive(Debug)]
pub struct CaptureEngine {
    producer: Producer,
    config: CaptureConfig,
    stats: Arc<EngineStats>,
    state: CaptureState,
    previous: Option<u64>,
    summary: CaptureSummary,
    scratch: Vec<u8>,
}

impl CaptureEngine {
    /// Create a new idle [`CaptureEngine`] writing to `producer`.
    ///
    /// The snap limit is programmed into `CTRL_MAX_LEN_CAPTURE`.
    ///
    /// # Errors
    ///
    /// * [`CaptureError::Ring`] with [`RingError::BufferTooSmall`] if the largest record does not
    ///   fit the ring.
    /// * [`CaptureError::Ring`] if the register map has no snap limit register.
    pub fn new(producer: Producer, config: CaptureConfig) -> Result<Self, CaptureError> {
        let geometry = producer.geometry();
        let largest = record_len(config.max_capture_len.as_usize()) as u64;
        if largest >= u64::from(geometry.size()) {
            return Err(CaptureError::Ring(RingError::BufferTooSmall {
                size: u64::from(geometry.size()),
                max_transfer: largest,
            }));
        }
        producer
            .registers()
            .set_max_capture_len(config.max_capture_len.get())?;
        debug!("capture engine: {config:?}, largest record {largest} bytes");
        Ok(Self {
            producer,
            config,
            stats: Arc::new(EngineStats::new("capture")),
            state: CaptureState::Idle,
            previous: None,
            summary: CaptureSummary::default(),
            scratch: Vec::with_capacity(record_len(FrameLen::MAX.as_usize())),
        })
    }

    /// The engine counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    /// What the engine is doing.
    #[must_use]
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// The registers of the ring the engine writes.
    #[must_use]
    pub fn registers(&self) -> &Registers {
        self.producer.registers()
    }

    /// The sticky error flags.
    ///
    /// # Errors
    ///
    /// Fails if the register map has no error register.
    pub fn errors(&self) -> Result<ErrorFlags, CaptureError> {
        Ok(self.registers().errors()?)
    }

    /// Clear the sticky error flags.
    ///
    /// # Errors
    ///
    /// Fails if the register map has no error register.
    pub fn clear_errors(&self) -> Result<(), CaptureError> {
        Ok(self.registers().clear_errors()?)
    }

    /// Start recording.  Sets `STATUS_ACTIVE` and clears `STATUS_PKT_CNT`.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::State`] unless the engine is idle.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.state != CaptureState::Idle {
            return Err(CaptureError::State(self.state));
        }
        let registers = self.producer.registers();
        registers.clear_packets()?;
        registers.set_active(true)?;
        self.previous = None;
        self.summary = CaptureSummary::default();
        self.state = CaptureState::Capturing;
        info!("capture started, max capture length {}", self.config.max_capture_len);
        Ok(())
    }

    fn wire_len(data: &[u8]) -> Result<FrameLen, CodecError> {
        FrameLen::try_from(data.len()).map_err(|e| CodecError::FieldOverflow {
            field: Field::WireLen,
            value: e.0 as u64,
            max: u64::from(FrameLen::MAX.get()),
        })
    }

    /// Gap to the previously stored frame, saturated to the width of the field.  The flag tells
    /// whether it saturated.
    fn delta_t(&self, arrival: u64) -> (u32, bool) {
        let gap = self.previous.map_or(0, |previous| arrival.saturating_sub(previous));
        match u32::try_from(gap) {
            Ok(gap) if gap <= CaptureMeta::MAX_DELTA_T => (gap, false),
            _ => (CaptureMeta::MAX_DELTA_T, true),
        }
    }

    /// Encode `frame` into the scratch record.  Returns whether its gap saturated.
    fn encode(&mut self, frame: &ArrivingFrame) -> Result<bool, CaptureError> {
        let wire_len = Self::wire_len(&frame.data)?;
        let (delta_t, saturated) = self.delta_t(frame.arrival);
        let meta = CaptureMeta::new(wire_len, self.config.max_capture_len, delta_t, frame.latency)?;
        self.scratch.clear();
        encode_record(&meta, &frame.data, &mut self.scratch)?;
        Ok(saturated)
    }

    /// Record one frame.
    ///
    /// # Errors
    ///
    /// * [`CaptureError::State`] unless the engine is capturing.
    /// * [`CaptureError::Rejected`] if the frame cannot be encoded; nothing is stored.
    /// * [`CaptureError::Aborted`] if an abort was requested while waiting for room.
    pub fn capture(&mut self, frame: &ArrivingFrame, waiter: &Waiter) -> Result<Captured, CaptureError> {
        if self.state != CaptureState::Capturing {
            return Err(CaptureError::State(self.state));
        }
        let saturated = match self.encode(frame) {
            Ok(saturated) => saturated,
            Err(e) => {
                if matches!(e, CaptureError::Rejected(_)) {
                    warn!("{e}");
                    self.stats.record_reject();
                    self.summary.rejected += 1;
                }
                return Err(e);
            }
        };
        let stored = match self.config.overflow {
            OverflowPolicy::Backpressure => {
                self.commit_blocking(waiter)?;
                true
            }
            OverflowPolicy::Drop => self.producer.try_commit(&self.scratch)?,
        };
        if !stored {
            debug!("ring full, dropped a {} byte frame", frame.data.len());
            self.registers().raise(ErrorFlags::OVERFLOW)?;
            self.stats.record_drop();
            self.summary.dropped += 1;
            return Ok(Captured::Dropped);
        }
        if saturated {
            debug!("gap before a {} byte frame saturated", frame.data.len());
            self.registers().raise(ErrorFlags::DELTA_SATURATED)?;
        }
        let bytes = self.scratch.len();
        self.previous = Some(frame.arrival);
        self.registers().increment_packets()?;
        self.stats.record_frame(bytes as u64);
        self.summary.frames += 1;
        self.summary.bytes += bytes as u64;
        trace!("stored {bytes} byte record, wr = {}", self.producer.write_pointer());
        Ok(Captured::Stored { bytes })
    }

    fn commit_blocking(&mut self, waiter: &Waiter) -> Result<(), RingError> {
        let Self {
            producer,
            stats,
            scratch,
            ..
        } = self;
        waiter.wait_until(|| {
            let done = producer.try_commit(scratch)?;
            if !done {
                stats.record_stalls(1);
            }
            Ok(done.then_some(()))
        })
    }

    /// Stop recording.
    ///
    /// Sentinel words bring the captured length to a multiple of the bus width; the padding is
    /// committed even under [`OverflowPolicy::Drop`].  Clears `STATUS_ACTIVE`.
    ///
    /// # Errors
    ///
    /// * [`CaptureError::State`] unless the engine is capturing.
    /// * [`CaptureError::Aborted`] if an abort was requested while waiting for room.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn stop(&mut self, waiter: &Waiter) -> Result<CaptureSummary, CaptureError> {
        if self.state != CaptureState::Capturing {
            return Err(CaptureError::State(self.state));
        }
        self.state = CaptureState::Flushing;
        let result = self.flush(waiter);
        self.state = CaptureState::Idle;
        self.registers().set_active(false)?;
        result?;
        info!("capture stopped: {:?}", self.summary);
        Ok(self.summary)
    }

    fn flush(&mut self, waiter: &Waiter) -> Result<(), CaptureError> {
        #[allow(clippy::cast_possible_truncation)] // below the bus width
        let tail = (self.summary.bytes % BUS_WIDTH as u64) as usize;
        if tail == 0 {
            return Ok(());
        }
        let padding: Vec<u8> = SENTINEL
            .to_le_bytes()
            .into_iter()
            .cycle()
            .take(BUS_WIDTH - tail)
            .collect();
        debug_assert_eq!(padding.len() % META_LEN, 0);
        self.producer.wait_commit(&padding, waiter)?;
        self.stats.record_padding(padding.len() as u64);
        self.summary.bytes += padding.len() as u64;
        Ok(())
    }

    /// Record `frames` until they run out or a stop is requested, then [`stop`](Self::stop).
    ///
    /// Rejected frames are counted and skipped.
    ///
    /// # Errors
    ///
    /// As [`CaptureEngine::start`], [`CaptureEngine::capture`] and [`CaptureEngine::stop`].
    #[tracing::instrument(level = "info", skip_all)]
    pub fn run(
        &mut self,
        frames: impl IntoIterator<Item = ArrivingFrame>,
        waiter: &Waiter,
    ) -> Result<CaptureSummary, CaptureError> {
        self.start()?;
        for frame in frames {
            if waiter.control().stop_requested() {
                debug!("stop requested");
                break;
            }
            match self.capture(&frame, waiter) {
                Ok(_) | Err(CaptureError::Rejected(_)) => {}
                Err(e) => {
                    self.state = CaptureState::Idle;
                    self.registers().set_active(false)?;
                    return Err(e);
                }
            }
        }
        self.stop(waiter)
    }
}
