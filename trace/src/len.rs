// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Validated frame lengths.

/// A frame length which fits the 11-bit length fields of a meta word.
///
/// This type is marked `#[repr(transparent)]` and has the same memory layout as a `u16`.
/// The only overhead of using it over a raw `u16` is the range check on construction, which
/// every encoder has to perform anyway.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameLen(u16);

/// Error returned when a length does not fit in a [`FrameLen`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0} is too large to be a legal frame length ({MAX} is max legal value)", MAX = FrameLen::MAX.get())]
pub struct InvalidFrameLen(pub usize);

impl FrameLen {
    /// Width of a length field in a meta word.
    pub const BITS: u32 = 11;

    /// Mask of a length field, aligned to bit 0.
    pub const MASK: u64 = (1 << Self::BITS) - 1;

    /// The zero length.
    pub const ZERO: FrameLen = FrameLen(0);

    /// The maximum representable length (2047).
    #[allow(clippy::cast_possible_truncation)] // 11 bits always fit a u16
    pub const MAX: FrameLen = FrameLen(Self::MASK as u16);

    /// Create a new [`FrameLen`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidFrameLen`] if `len` exceeds [`FrameLen::MAX`].
    pub const fn new(len: u16) -> Result<FrameLen, InvalidFrameLen> {
        if len > Self::MAX.0 {
            return Err(InvalidFrameLen(len as usize));
        }
        Ok(FrameLen(len))
    }

    /// Extract a length field of a meta word.
    #[allow(clippy::cast_possible_truncation)] // masked to 11 bits
    pub(crate) const fn from_field(word: u64, shift: u32) -> FrameLen {
        FrameLen(((word >> shift) & Self::MASK) as u16)
    }

    /// The length as a `u16`.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// The length as a `usize`.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<FrameLen> for u16 {
    fn from(value: FrameLen) -> Self {
        value.get()
    }
}

impl From<FrameLen> for usize {
    fn from(value: FrameLen) -> Self {
        value.as_usize()
    }
}

impl TryFrom<u16> for FrameLen {
    type Error = InvalidFrameLen;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        FrameLen::new(value)
    }
}

impl TryFrom<usize> for FrameLen {
    type Error = InvalidFrameLen;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match u16::try_from(value) {
            Ok(len) => FrameLen::new(len),
            Err(_) => Err(InvalidFrameLen(value)),
        }
    }
}

impl core::fmt::Display for FrameLen {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::len::FrameLen;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for FrameLen {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            Some(FrameLen(driver.produce::<u16>()? & FrameLen::MAX.0))
        }
    }
}

#[cfg(test)]
mod test {
    use crate::len::{FrameLen, InvalidFrameLen};

    #[test]
    fn new_respects_bounds() {
        bolero::check!().with_type().cloned().for_each(|raw: u16| {
            match FrameLen::new(raw) {
                Ok(len) => {
                    assert_eq!(len.get(), raw);
                    assert!(len <= FrameLen::MAX);
                }
                Err(InvalidFrameLen(x)) => {
                    assert_eq!(x, usize::from(raw));
                    assert!(raw > FrameLen::MAX.get());
                }
            }
        });
    }

    #[test]
    fn usize_conversion_rejects_large_values() {
        assert_eq!(FrameLen::try_from(2047usize).map(FrameLen::get), Ok(2047));
        assert_eq!(FrameLen::try_from(2048usize), Err(InvalidFrameLen(2048)));
        assert_eq!(FrameLen::try_from(70_000usize), Err(InvalidFrameLen(70_000)));
    }
}
