// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Capture errors.

use crate::engine::CaptureState;
use ring::{RegisterError, RingError};
use trace::CodecError;

/// Errors of the capture engine.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The frame could not be encoded and was not stored.  The run may continue.
    #[error("frame rejected: {0}")]
    Rejected(#[from] CodecError),
    /// The operation is not valid in the current state.
    #[error("capture engine is {0:?}")]
    State(CaptureState),
    /// The host asked the engine to give up.
    #[error("capture aborted")]
    Aborted,
    /// The ring failed or cannot hold the largest record.
    #[error(transparent)]
    Ring(RingError),
}

impl From<RingError> for CaptureError {
    fn from(value: RingError) -> Self {
        match value {
            RingError::Aborted => CaptureError::Aborted,
            other => CaptureError::Ring(other),
        }
    }
}

impl From<RegisterError> for CaptureError {
    fn from(value: RegisterError) -> Self {
        CaptureError::Ring(RingError::Register(value))
    }
}
