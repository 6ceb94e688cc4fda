// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Capture configuration.

use ring::Registers;
use trace::{CodecError, Field, FrameLen};

use crate::error::CaptureError;

/// What to do with a frame whose record does not fit the ring.
///
/// Has no default; callers always pick one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait until the host made room.
    Backpressure,
    /// Drop the frame and raise the sticky `OVERFLOW` flag.
    Drop,
}

/// Static configuration of the capture engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Frames longer than this are truncated in the trace.
    pub max_capture_len: FrameLen,
    /// Behaviour on a full ring.
    pub overflow: OverflowPolicy,
}

impl CaptureConfig {
    /// Take the snap limit from `CTRL_MAX_LEN_CAPTURE`.
    ///
    /// # Errors
    ///
    /// Fails if the register is not mapped or holds more than 11 bits.
    pub fn from_registers(registers: &Registers, overflow: OverflowPolicy) -> Result<Self, CaptureError> {
        let raw = registers.max_capture_len()?;
        let max_capture_len = u16::try_from(raw)
            .ok()
            .and_then(|len| FrameLen::new(len).ok())
            .ok_or(CodecError::FieldOverflow {
                field: Field::SnapLen,
                value: u64::from(raw),
                max: u64::from(FrameLen::MAX.get()),
            })?;
        Ok(CaptureConfig {
            max_capture_len,
            overflow,
        })
    }
}
