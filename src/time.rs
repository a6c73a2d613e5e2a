//! Time abstraction traits for platform-agnostic timing.
//!
//! The engine never sleeps. It samples a monotonic clock once per tick and
//! compares instants, so the only things a platform has to provide are an
//! instant type with a wraparound-safe difference and a way to read "now".

/// Trait for abstracting time sources.
pub trait TimeSource<I: TimeInstant> {
    /// Returns the current time instant.
    fn now(&self) -> I;
}

/// Trait abstraction for duration types.
pub trait TimeDuration: Copy + PartialEq + core::fmt::Debug {
    /// Converts duration to milliseconds.
    fn as_millis(&self) -> u64;

    /// Creates duration from milliseconds.
    fn from_millis(millis: u64) -> Self;
}

/// Trait abstraction for instant types.
pub trait TimeInstant: Copy + core::fmt::Debug {
    /// Duration type for this instant.
    type Duration: TimeDuration;

    /// Calculates duration since an earlier instant.
    ///
    /// Implementations backed by a free-running counter must handle the
    /// counter wrapping between `earlier` and `self`.
    fn duration_since(&self, earlier: Self) -> Self::Duration;
}

/// Milliseconds, as measured by [`WrappingMillis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Millis(pub u32);

impl TimeDuration for Millis {
    fn as_millis(&self) -> u64 {
        self.0 as u64
    }

    fn from_millis(millis: u64) -> Self {
        Millis(millis.min(u32::MAX as u64) as u32)
    }
}

/// Reading of a free-running 32-bit millisecond counter.
///
/// Differences are computed with wrapping arithmetic, so intervals stay
/// correct across the ~49.7 day rollover as long as no single interval
/// exceeds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WrappingMillis(pub u32);

impl TimeInstant for WrappingMillis {
    type Duration = Millis;

    fn duration_since(&self, earlier: Self) -> Millis {
        Millis(self.0.wrapping_sub(earlier.0))
    }
}
