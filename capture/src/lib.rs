// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The capture direction.
//!
//! A [`CaptureEngine`] turns arriving frames into capture records and commits them to a ring
//! the host drains.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod config;
pub mod engine;
pub mod error;

pub use config::{CaptureConfig, OverflowPolicy};
pub use engine::{ArrivingFrame, CaptureEngine, CaptureState, CaptureSummary, Captured};
pub use error::CaptureError;
