// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The wiretrace trace format.
//!
//! A trace is a flat byte sequence of self describing records.  Each record starts with an
//! 8-byte little endian meta word followed by the captured payload, zero padded to a multiple of
//! 8 bytes.  A complete trace is padded with all-ones [`SENTINEL`] words to a multiple of the
//! [`BUS_WIDTH`].
//!
//! Two meta word layouts exist: [`ReplayMeta`] for traces fed to the replay direction and
//! [`CaptureMeta`] for traces written by the capture direction.  Both implement [`TraceMeta`],
//! and everything else in this crate is generic over it.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod clock;
pub mod codec;
pub mod error;
pub mod generate;
pub mod layout;
pub mod len;
pub mod pcap;
pub mod reader;
pub mod record;
pub mod writer;

pub use clock::{ClockRate, CycleCounter};
pub use codec::{Decoded, decode, decode_with, encode, encode_record, pad_trace, padded_len, record_len};
pub use error::{CodecError, Field, RecordError};
pub use layout::{BUS_WIDTH, CaptureMeta, META_LEN, ReplayMeta, SENTINEL, TraceMeta};
pub use len::{FrameLen, InvalidFrameLen};
pub use reader::TraceReader;
pub use record::TraceRecord;
pub use writer::TraceWriter;
