// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bit layouts of the meta word.

use crate::error::{CodecError, Field};
use crate::len::FrameLen;
use core::fmt::Debug;
use static_assertions::const_assert_eq;

/// Size in bytes of the meta word which starts every record.
pub const META_LEN: usize = size_of::<u64>();

/// Width in bytes of the memory bus.  Complete traces are a multiple of this length.
pub const BUS_WIDTH: usize = 64;

/// All-ones word which pads a trace to a multiple of [`BUS_WIDTH`].
pub const SENTINEL: u64 = u64::MAX;

const_assert_eq!(BUS_WIDTH % META_LEN, 0);

/// A meta word layout.
///
/// Implementations are always validated on construction, so [`TraceMeta::to_word`] cannot fail
/// and never yields the [`SENTINEL`].
pub trait TraceMeta: Copy + Debug + PartialEq + Eq + Send + Sync + 'static {
    /// Out of band information required to interpret a meta word.
    type Param: Copy + Debug + Send + Sync + 'static;

    /// Human readable name of the layout.
    const NAME: &'static str;

    /// Interpret a raw (non-sentinel) meta word.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidMeta`] if the word violates the layout.
    fn from_word(word: u64, param: Self::Param) -> Result<Self, CodecError>;

    /// Encode as a raw meta word.
    fn to_word(&self) -> u64;

    /// Gap to the previous record in clock ticks.
    fn delta_t(&self) -> u32;

    /// Length of the frame on the wire.
    fn wire_len(&self) -> FrameLen;

    /// Number of payload bytes stored in the record.
    fn snap_len(&self) -> FrameLen;
}

/// Meta word of the replay direction.
///
/// | bits  | field    |
/// |-------|----------|
/// | 31:0  | delta_t  |
/// | 42:32 | snap_len |
/// | 47:43 | reserved |
/// | 58:48 | wire_len |
/// | 63:59 | reserved |
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReplayMeta {
    delta_t: u32,
    snap_len: FrameLen,
    wire_len: FrameLen,
}

impl ReplayMeta {
    /// Offset of the `delta_t` field.
    pub const DELTA_T_SHIFT: u32 = 0;
    /// Mask of the `delta_t` field, aligned to bit 0.
    pub const DELTA_T_MASK: u64 = 0xFFFF_FFFF;
    /// Offset of the `snap_len` field.
    pub const SNAP_LEN_SHIFT: u32 = 32;
    /// Offset of the `wire_len` field.
    pub const WIRE_LEN_SHIFT: u32 = 48;
    /// Bits which must be zero.
    pub const RESERVED_MASK: u64 = !((Self::DELTA_T_MASK << Self::DELTA_T_SHIFT)
        | (FrameLen::MASK << Self::SNAP_LEN_SHIFT)
        | (FrameLen::MASK << Self::WIRE_LEN_SHIFT));

    /// Create a new [`ReplayMeta`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::FieldOverflow`] if `snap_len` exceeds `wire_len`.
    pub fn new(wire_len: FrameLen, snap_len: FrameLen, delta_t: u32) -> Result<Self, CodecError> {
        if snap_len > wire_len {
            return Err(CodecError::overflow(
                Field::SnapLen,
                snap_len.get(),
                wire_len.get(),
            ));
        }
        Ok(ReplayMeta {
            delta_t,
            snap_len,
            wire_len,
        })
    }
}

const_assert_eq!(ReplayMeta::RESERVED_MASK, 0xF800_F800_0000_0000);

impl TraceMeta for ReplayMeta {
    type Param = ();
    const NAME: &'static str = "replay";

    fn from_word(word: u64, (): ()) -> Result<Self, CodecError> {
        if word & Self::RESERVED_MASK != 0 {
            return Err(CodecError::InvalidMeta { word });
        }
        let snap_len = FrameLen::from_field(word, Self::SNAP_LEN_SHIFT);
        let wire_len = FrameLen::from_field(word, Self::WIRE_LEN_SHIFT);
        #[allow(clippy::cast_possible_truncation)] // masked to 32 bits
        let delta_t = ((word >> Self::DELTA_T_SHIFT) & Self::DELTA_T_MASK) as u32;
        ReplayMeta::new(wire_len, snap_len, delta_t).map_err(|_| CodecError::InvalidMeta { word })
    }

    fn to_word(&self) -> u64 {
        (u64::from(self.delta_t) << Self::DELTA_T_SHIFT)
            | (u64::from(self.snap_len.get()) << Self::SNAP_LEN_SHIFT)
            | (u64::from(self.wire_len.get()) << Self::WIRE_LEN_SHIFT)
    }

    fn delta_t(&self) -> u32 {
        self.delta_t
    }

    fn wire_len(&self) -> FrameLen {
        self.wire_len
    }

    fn snap_len(&self) -> FrameLen {
        self.snap_len
    }
}

/// Meta word of the capture direction.
///
/// | bits  | field         |
/// |-------|---------------|
/// | 23:0  | latency       |
/// | 24    | latency valid |
/// | 52:25 | delta_t       |
/// | 63:53 | wire_len      |
///
/// The snap length is not stored.  It is implied by the capture configuration as
/// `min(wire_len, max_capture_len)`, which is why decoding takes `max_capture_len` as its
/// parameter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CaptureMeta {
    latency: Option<u32>,
    delta_t: u32,
    wire_len: FrameLen,
    snap_len: FrameLen,
}

impl CaptureMeta {
    /// Offset of the `latency` field.
    pub const LATENCY_SHIFT: u32 = 0;
    /// Mask of the `latency` field, aligned to bit 0.
    pub const LATENCY_MASK: u64 = 0x00FF_FFFF;
    /// Bit set when the `latency` field holds a measurement.
    pub const LATENCY_VALID_BIT: u32 = 24;
    /// Offset of the `delta_t` field.
    pub const DELTA_T_SHIFT: u32 = 25;
    /// Mask of the `delta_t` field, aligned to bit 0.
    pub const DELTA_T_MASK: u64 = 0x0FFF_FFFF;
    /// Offset of the `wire_len` field.
    pub const WIRE_LEN_SHIFT: u32 = 53;

    /// Largest representable `delta_t`.
    #[allow(clippy::cast_possible_truncation)] // 28 bits
    pub const MAX_DELTA_T: u32 = Self::DELTA_T_MASK as u32;
    /// Largest representable latency.
    #[allow(clippy::cast_possible_truncation)] // 24 bits
    pub const MAX_LATENCY: u32 = Self::LATENCY_MASK as u32;

    /// Create a new [`CaptureMeta`] for a frame of `wire_len` bytes captured with a snap limit
    /// of `max_capture_len`.
    ///
    /// # Errors
    ///
    /// * [`CodecError::FieldOverflow`] if `delta_t` or `latency` do not fit their fields.
    /// * [`CodecError::SentinelCollision`] if the encoded word would equal the [`SENTINEL`].
    pub fn new(
        wire_len: FrameLen,
        max_capture_len: FrameLen,
        delta_t: u32,
        latency: Option<u32>,
    ) -> Result<Self, CodecError> {
        if delta_t > Self::MAX_DELTA_T {
            return Err(CodecError::overflow(Field::DeltaT, delta_t, Self::MAX_DELTA_T));
        }
        if let Some(latency) = latency
            && latency > Self::MAX_LATENCY
        {
            return Err(CodecError::overflow(Field::Latency, latency, Self::MAX_LATENCY));
        }
        let meta = CaptureMeta {
            latency,
            delta_t,
            wire_len,
            snap_len: wire_len.min(max_capture_len),
        };
        if meta.to_word() == SENTINEL {
            return Err(CodecError::SentinelCollision);
        }
        Ok(meta)
    }

    /// Latency measurement, if the frame carried one.
    #[must_use]
    pub fn latency(&self) -> Option<u32> {
        self.latency
    }
}

const_assert_eq!(CaptureMeta::WIRE_LEN_SHIFT + FrameLen::BITS, u64::BITS);
const_assert_eq!(CaptureMeta::DELTA_T_SHIFT + 28, CaptureMeta::WIRE_LEN_SHIFT);

impl TraceMeta for CaptureMeta {
    type Param = FrameLen;
    const NAME: &'static str = "capture";

    fn from_word(word: u64, max_capture_len: FrameLen) -> Result<Self, CodecError> {
        if word == SENTINEL {
            return Err(CodecError::InvalidMeta { word });
        }
        let latency = if word & (1 << Self::LATENCY_VALID_BIT) == 0 {
            None
        } else {
            #[allow(clippy::cast_possible_truncation)] // masked to 24 bits
            Some(((word >> Self::LATENCY_SHIFT) & Self::LATENCY_MASK) as u32)
        };
        #[allow(clippy::cast_possible_truncation)] // masked to 28 bits
        let delta_t = ((word >> Self::DELTA_T_SHIFT) & Self::DELTA_T_MASK) as u32;
        let wire_len = FrameLen::from_field(word, Self::WIRE_LEN_SHIFT);
        Ok(CaptureMeta {
            latency,
            delta_t,
            wire_len,
            snap_len: wire_len.min(max_capture_len),
        })
    }

    fn to_word(&self) -> u64 {
        let latency = match self.latency {
            None => 0,
            Some(latency) => (u64::from(latency) << Self::LATENCY_SHIFT) | (1 << Self::LATENCY_VALID_BIT),
        };
        latency
            | (u64::from(self.delta_t) << Self::DELTA_T_SHIFT)
            | (u64::from(self.wire_len.get()) << Self::WIRE_LEN_SHIFT)
    }

    fn delta_t(&self) -> u32 {
        self.delta_t
    }

    fn wire_len(&self) -> FrameLen {
        self.wire_len
    }

    fn snap_len(&self) -> FrameLen {
        self.snap_len
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::layout::{CaptureMeta, ReplayMeta};
    use crate::len::FrameLen;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for ReplayMeta {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let wire_len: FrameLen = driver.produce()?;
            let snap_len = FrameLen::new(driver.produce::<u16>()? % (wire_len.get() + 1))
                .unwrap_or_else(|_| unreachable!());
            Some(
                ReplayMeta::new(wire_len, snap_len, driver.produce()?)
                    .unwrap_or_else(|_| unreachable!()),
            )
        }
    }

    impl TypeGenerator for CaptureMeta {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let wire_len: FrameLen = driver.produce()?;
            let max_capture_len: FrameLen = driver.produce()?;
            let delta_t = driver.produce::<u32>()? & CaptureMeta::MAX_DELTA_T;
            // keep clear of the single sentinel colliding combination
            let latency = driver
                .produce::<Option<u32>>()?
                .map(|latency| latency & (CaptureMeta::MAX_LATENCY >> 1));
            Some(
                CaptureMeta::new(wire_len, max_capture_len, delta_t, latency)
                    .unwrap_or_else(|_| unreachable!()),
            )
        }
    }
}

#[cfg(test)]
mod test {
    use crate::error::{CodecError, Field};
    use crate::layout::{CaptureMeta, ReplayMeta, SENTINEL, TraceMeta};
    use crate::len::FrameLen;

    fn len(raw: u16) -> FrameLen {
        FrameLen::new(raw).unwrap()
    }

    #[test]
    fn replay_word_layout() {
        let meta = ReplayMeta::new(len(1514), len(64), 0x1234_5678).unwrap();
        assert_eq!(meta.to_word(), 0x05EA_0040_1234_5678);
        assert_eq!(ReplayMeta::from_word(meta.to_word(), ()).unwrap(), meta);
    }

    #[test]
    fn replay_word_round_trips() {
        bolero::check!().with_type().cloned().for_each(|meta: ReplayMeta| {
            let word = meta.to_word();
            assert_eq!(word & ReplayMeta::RESERVED_MASK, 0);
            assert_eq!(ReplayMeta::from_word(word, ()).unwrap(), meta);
        });
    }

    #[test]
    fn replay_rejects_reserved_bits() {
        let word = ReplayMeta::new(len(60), len(60), 7).unwrap().to_word();
        for bit in [43, 47, 59, 63] {
            let bad = word | (1 << bit);
            assert_eq!(
                ReplayMeta::from_word(bad, ()),
                Err(CodecError::InvalidMeta { word: bad })
            );
        }
    }

    #[test]
    fn replay_rejects_snap_beyond_wire() {
        assert_eq!(
            ReplayMeta::new(len(60), len(61), 0),
            Err(CodecError::FieldOverflow {
                field: Field::SnapLen,
                value: 61,
                max: 60
            })
        );
        let word = (61 << ReplayMeta::SNAP_LEN_SHIFT) | (60 << ReplayMeta::WIRE_LEN_SHIFT);
        assert_eq!(
            ReplayMeta::from_word(word, ()),
            Err(CodecError::InvalidMeta { word })
        );
    }

    #[test]
    fn capture_word_layout() {
        let meta = CaptureMeta::new(len(1514), len(128), 3, Some(0x00AB_CDEF)).unwrap();
        let expected = 0x00AB_CDEF | (1 << 24) | (3 << 25) | (1514 << 53);
        assert_eq!(meta.to_word(), expected);
        assert_eq!(meta.snap_len(), len(128));
        assert_eq!(meta.latency(), Some(0x00AB_CDEF));
        assert_eq!(CaptureMeta::from_word(expected, len(128)).unwrap(), meta);
    }

    #[test]
    fn capture_snap_is_implied_by_the_capture_limit() {
        let meta = CaptureMeta::new(len(60), len(128), 0, None).unwrap();
        assert_eq!(meta.snap_len(), len(60));
        let decoded = CaptureMeta::from_word(meta.to_word(), len(32)).unwrap();
        assert_eq!(decoded.snap_len(), len(32));
        assert_eq!(decoded.wire_len(), len(60));
    }

    #[test]
    fn capture_word_round_trips() {
        bolero::check!().with_type().cloned().for_each(|meta: CaptureMeta| {
            let word = meta.to_word();
            assert_ne!(word, SENTINEL);
            let max_capture_len = meta.snap_len();
            assert_eq!(CaptureMeta::from_word(word, max_capture_len).unwrap(), meta);
        });
    }

    #[test]
    fn capture_rejects_overflowing_fields() {
        assert_eq!(
            CaptureMeta::new(len(60), len(60), CaptureMeta::MAX_DELTA_T + 1, None),
            Err(CodecError::FieldOverflow {
                field: Field::DeltaT,
                value: u64::from(CaptureMeta::MAX_DELTA_T) + 1,
                max: u64::from(CaptureMeta::MAX_DELTA_T),
            })
        );
        assert!(matches!(
            CaptureMeta::new(len(60), len(60), 0, Some(1 << 24)),
            Err(CodecError::FieldOverflow {
                field: Field::Latency,
                ..
            })
        ));
    }

    #[test]
    fn capture_rejects_sentinel_collision() {
        assert_eq!(
            CaptureMeta::new(
                FrameLen::MAX,
                FrameLen::MAX,
                CaptureMeta::MAX_DELTA_T,
                Some(CaptureMeta::MAX_LATENCY)
            ),
            Err(CodecError::SentinelCollision)
        );
        // one bit short of the sentinel is fine
        assert!(
            CaptureMeta::new(
                FrameLen::MAX,
                FrameLen::MAX,
                CaptureMeta::MAX_DELTA_T - 1,
                Some(CaptureMeta::MAX_LATENCY)
            )
            .is_ok()
        );
    }
}
