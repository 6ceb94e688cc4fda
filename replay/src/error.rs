// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Replay errors.

use ring::{RegisterError, RingError};
use trace::CodecError;

/// Errors which stop a replay run.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// A record of the trace could not be decoded.  Fatal, never retried.
    #[error("malformed record #{index} at trace offset {offset}: {source}")]
    Malformed {
        /// Zero based index of the failing record.
        index: usize,
        /// Byte offset of the failing record in the trace.
        offset: usize,
        /// What went wrong.
        #[source]
        source: CodecError,
    },
    /// The configured trace size is not usable.
    #[error("trace size {0} is not a non-zero multiple of the bus width")]
    TraceSize(u64),
    /// The host asked the engine to give up.
    #[error("replay aborted")]
    Aborted,
    /// The ring failed.
    #[error(transparent)]
    Ring(RingError),
    /// The frame sink failed.
    #[error("frame sink failed: {0}")]
    Sink(#[source] Box<dyn core::error::Error + Send + Sync>),
}

impl From<RingError> for ReplayError {
    fn from(value: RingError) -> Self {
        match value {
            RingError::Aborted => ReplayError::Aborted,
            other => ReplayError::Ring(other),
        }
    }
}

impl From<RegisterError> for ReplayError {
    fn from(value: RegisterError) -> Self {
        ReplayError::Ring(RingError::Register(value))
    }
}
