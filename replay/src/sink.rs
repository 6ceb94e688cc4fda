// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Where replayed frames go.

use core::convert::Infallible;

/// A frame leaving the replay engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayedFrame {
    /// Ticks since the previous frame started (zero for the first frame).
    pub gap: u64,
    /// Departure tick, counted from the start of the run.
    pub at: u64,
    /// The frame, zero extended to its wire length.
    pub data: Vec<u8>,
}

/// Consumer of replayed frames (the transmit side of the MAC).
pub trait FrameSink {
    /// Why a frame could not be taken.
    type Error: core::error::Error + Send + Sync + 'static;

    /// Hand over one frame.
    ///
    /// # Errors
    ///
    /// Implementation specific; the replay run stops on error.
    fn transmit(&mut self, frame: ReplayedFrame) -> Result<(), Self::Error>;
}

/// Collects frames in memory.
#[derive(Clone, Debug, Default)]
pub struct VecSink {
    /// Frames in transmit order.
    pub frames: Vec<ReplayedFrame>,
}

impl FrameSink for VecSink {
    type Error = Infallible;

    fn transmit(&mut self, frame: ReplayedFrame) -> Result<(), Infallible> {
        self.frames.push(frame);
        Ok(())
    }
}

/// Forwards frames to another thread over a bounded channel.
///
/// A full channel blocks the engine, just like a busy MAC would.
#[derive(Clone)]
pub struct ChannelSink {
    tx: kanal::Sender<ReplayedFrame>,
}

impl core::fmt::Debug for ChannelSink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelSink").finish_non_exhaustive()
    }
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, kanal::Receiver<ReplayedFrame>) {
        let (tx, rx) = kanal::bounded(capacity);
        (ChannelSink { tx }, rx)
    }
}

impl FrameSink for ChannelSink {
    type Error = kanal::SendError;

    fn transmit(&mut self, frame: ReplayedFrame) -> Result<(), kanal::SendError> {
        self.tx.send(frame)
    }
}
