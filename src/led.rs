//! LED output abstraction.
//!
//! The ring is driven through an explicitly passed [`LedSink`]. Writes are
//! batched: a step sets every LED it targets and then flushes exactly once,
//! so the ring never shows a half-applied step.

use palette::Srgb;

/// Number of addressable LEDs on the ring.
pub const LED_COUNT: usize = 12;

// Every ring index must fit in a `LedMask`.
const _: () = assert!(LED_COUNT <= LedMask::MAX_INDEX + 1);

/// Trait for abstracting an addressable LED ring.
///
/// Implement this for your driver (WS2812 over SPI, RMT, a simulator, ...).
/// `set` only stages a color; nothing is visible until `flush`.
pub trait LedSink {
    /// Stages `color` for the LED at `index` (0-based ring position).
    ///
    /// Indices at or beyond the ring size should be ignored.
    fn set(&mut self, index: usize, color: Srgb);

    /// Commits all staged colors to the hardware.
    fn flush(&mut self);
}

/// A set of ring LED indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LedMask(u32);

impl LedMask {
    /// Largest index a mask can hold.
    pub const MAX_INDEX: usize = 31;

    /// The empty set.
    pub const fn empty() -> Self {
        LedMask(0)
    }

    /// Every LED in a ring of `count` LEDs.
    pub const fn all(count: usize) -> Self {
        if count > Self::MAX_INDEX {
            LedMask(u32::MAX)
        } else {
            LedMask((1u32 << count) - 1)
        }
    }

    /// A single LED. Indices above [`LedMask::MAX_INDEX`] yield the empty set.
    pub const fn single(index: usize) -> Self {
        if index > Self::MAX_INDEX {
            LedMask(0)
        } else {
            LedMask(1u32 << index)
        }
    }

    /// Returns a copy of this mask with `index` added.
    pub const fn with(self, index: usize) -> Self {
        LedMask(self.0 | Self::single(index).0)
    }

    pub const fn contains(&self, index: usize) -> bool {
        index <= Self::MAX_INDEX && self.0 & (1u32 << index) != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates over the contained indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..=Self::MAX_INDEX).filter(move |&i| self.contains(i))
    }

    /// Returns the only index when the mask holds exactly one LED.
    pub fn as_single(&self) -> Option<usize> {
        if self.len() == 1 {
            Some(self.0.trailing_zeros() as usize)
        } else {
            None
        }
    }
}
