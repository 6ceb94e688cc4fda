// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The replay direction.
//!
//! A [`ReplayEngine`] drains a trace from a ring, paces the frames by their recorded gaps and
//! hands them to a [`FrameSink`].

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod engine;
pub mod error;
pub mod pacer;
pub mod sink;

pub use engine::{ReplayConfig, ReplayEngine, ReplayState, ReplaySummary};
pub use error::ReplayError;
pub use pacer::{Pacer, VirtualPacer, WallClockPacer};
pub use sink::{ChannelSink, FrameSink, ReplayedFrame, VecSink};
