// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Single producer / single consumer ring buffer over a window of shared memory.
//!
//! The ring is controlled by a read/write pointer pair.  Each side only ever stores its own
//! pointer and only ever touches bytes which the transfer policy of [`RingGeometry`] has
//! approved, so the producer and consumer can run on different threads without further
//! synchronization.
//!
//! The pointer pair lives in the engine's [`RegisterFile`], mirroring the control surface of
//! the hardware this models.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod agent;
pub mod error;
pub mod geometry;
pub mod memory;
pub mod regs;
pub mod shared;
mod sync;

pub use agent::{TransferReport, drain, fill};
pub use error::{AgentError, RegisterError, RingError};
pub use geometry::RingGeometry;
pub use memory::{Memory, Window};
pub use regs::{ErrorFlags, RegisterFile, RegisterMap, Registers};
pub use shared::{Consumer, Control, Producer, Ring, Waiter, reset};

/// Width in bytes of the memory bus.  Ring sizes are a multiple of this.
pub const BUS_WIDTH: u32 = 64;

/// Shared ownership handle used by the ring (loom's `Arc` under the `loom` feature).
pub use sync::Arc;
