// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per engine counters.
//!
//! Engines bump an [`EngineStats`] from their own thread; anybody may take a [`StatsSnapshot`]
//! or [`publish`](EngineStats::publish) the counters to the installed `metrics` recorder.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

use metrics::{Unit, counter, describe_counter};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Frames moved by an engine.
pub const ENGINE_FRAMES: &str = "wiretrace_engine_frames";
/// Trace bytes moved by an engine.
pub const ENGINE_BYTES: &str = "wiretrace_engine_octets";
/// Frames dropped because the ring was full.
pub const ENGINE_DROPPED: &str = "wiretrace_engine_dropped_frames";
/// Frames rejected because they could not be encoded.
pub const ENGINE_REJECTED: &str = "wiretrace_engine_rejected_frames";
/// Attempts which found the ring not ready.
pub const ENGINE_STALLS: &str = "wiretrace_engine_stalls";

/// Describe the engine metrics to the installed recorder.
pub fn describe() {
    describe_counter!(ENGINE_FRAMES, Unit::Count, "Frames replayed or captured");
    describe_counter!(ENGINE_BYTES, Unit::Bytes, "Trace octets consumed or produced");
    describe_counter!(ENGINE_DROPPED, Unit::Count, "Frames dropped on ring overflow");
    describe_counter!(ENGINE_REJECTED, Unit::Count, "Frames which could not be encoded");
    describe_counter!(ENGINE_STALLS, Unit::Count, "Attempts which found the ring not ready");
}

/// Counters of one engine.
#[derive(Debug)]
pub struct EngineStats {
    name: &'static str,
    frames: AtomicU64,
    bytes: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    stalls: AtomicU64,
}

/// Point in time copy of an [`EngineStats`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Frames moved.
    pub frames: u64,
    /// Trace bytes moved.
    pub bytes: u64,
    /// Frames dropped on overflow.
    pub dropped: u64,
    /// Frames which could not be encoded.
    pub rejected: u64,
    /// Attempts which found the ring not ready.
    pub stalls: u64,
}

impl EngineStats {
    /// Zeroed counters for the engine called `name`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            frames: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            stalls: AtomicU64::new(0),
        }
    }

    /// Name of the engine, used as the `engine` label.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Count one frame occupying `bytes` trace bytes.
    pub fn record_frame(&self, bytes: u64) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Count trace bytes which belong to no frame (sentinel padding).
    pub fn record_padding(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Count one dropped frame.
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one rejected frame.
    pub fn record_reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Count `stalls` attempts which found the ring not ready.
    pub fn record_stalls(&self, stalls: u64) {
        self.stalls.fetch_add(stalls, Ordering::Relaxed);
    }

    /// Copy the counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            stalls: self.stalls.load(Ordering::Relaxed),
        }
    }

    /// Zero all counters.
    pub fn reset(&self) {
        for counter in [
            &self.frames,
            &self.bytes,
            &self.dropped,
            &self.rejected,
            &self.stalls,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Push the current values to the installed `metrics` recorder.
    pub fn publish(&self) {
        let snapshot = self.snapshot();
        let engine = self.name;
        counter!(ENGINE_FRAMES, "engine" => engine).absolute(snapshot.frames);
        counter!(ENGINE_BYTES, "engine" => engine).absolute(snapshot.bytes);
        counter!(ENGINE_DROPPED, "engine" => engine).absolute(snapshot.dropped);
        counter!(ENGINE_REJECTED, "engine" => engine).absolute(snapshot.rejected);
        counter!(ENGINE_STALLS, "engine" => engine).absolute(snapshot.stalls);
        trace!("{engine}: published {snapshot:?}");
    }
}

#[cfg(test)]
mod test {
    use crate::{EngineStats, StatsSnapshot};
    use pretty_assertions::assert_eq;

    #[test]
    fn counters_accumulate_until_reset() {
        let stats = EngineStats::new("capture");
        stats.record_frame(72);
        stats.record_frame(136);
        stats.record_padding(48);
        stats.record_drop();
        stats.record_reject();
        stats.record_stalls(5);
        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                frames: 2,
                bytes: 256,
                dropped: 1,
                rejected: 1,
                stalls: 5,
            }
        );
        // no recorder installed: a no-op which must not panic
        stats.publish();
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn snapshots_serialize_as_a_summary() {
        let stats = EngineStats::new("replay");
        stats.record_frame(64);
        let yaml = serde_yaml_ng::to_string(&stats.snapshot()).unwrap();
        assert!(yaml.contains("frames: 1"));
        assert!(yaml.contains("bytes: 64"));
    }
}
