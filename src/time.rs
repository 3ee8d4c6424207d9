//! Relative time used by every scheduling call.
//!
//! Callers only ever express *offsets* from the current anchor. Absolute timer readings are an
//! [`Instant`] and stay between the scheduler and the transceiver.

use core::ops::{Add, Neg, Sub};

use fugit::MicrosDurationU32;

/// A reading of the free running microsecond hardware timer. Wraps after roughly 71 minutes;
/// comparisons between instants are wrap-aware as long as they are less than half that apart.
pub type Instant = fugit::Instant<u32, 1, 1_000_000>;

/// Inter frame space of the link layer. No receive window is ever opened closer than this to the
/// end of a preceding transmission.
pub const T_IFS: DeltaTime = DeltaTime::micros(150);

/// Smallest positive delta that can be represented.
pub const MIN_DELTA: DeltaTime = DeltaTime::micros(1);

/// Signed duration with microsecond resolution, relative to the current anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeltaTime(i32);

impl DeltaTime {
    /// Creation from a number of microseconds.
    pub const fn micros(micros: i32) -> Self {
        Self(micros)
    }

    /// Creation from a number of milliseconds, saturating at the representable range.
    pub const fn millis(millis: i32) -> Self {
        Self(millis.saturating_mul(1000))
    }

    /// The empty delta.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Number of microseconds.
    pub const fn as_micros(self) -> i32 {
        self.0
    }

    /// True for deltas that point strictly into the future.
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Magnitude of the delta.
    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// Signed distance from `from` to `to`, taking timer wrap-around into account.
    pub fn between(from: Instant, to: Instant) -> Self {
        Self(to.ticks().wrapping_sub(from.ticks()) as i32)
    }
}

impl Add for DeltaTime {
    type Output = DeltaTime;

    fn add(self, rhs: DeltaTime) -> DeltaTime {
        DeltaTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for DeltaTime {
    type Output = DeltaTime;

    fn sub(self, rhs: DeltaTime) -> DeltaTime {
        DeltaTime(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for DeltaTime {
    type Output = DeltaTime;

    fn neg(self) -> DeltaTime {
        DeltaTime(self.0.saturating_neg())
    }
}

impl Add<DeltaTime> for Instant {
    type Output = Instant;

    fn add(self, rhs: DeltaTime) -> Instant {
        Instant::from_ticks(self.ticks().wrapping_add(rhs.0 as u32))
    }
}

impl Sub<DeltaTime> for Instant {
    type Output = Instant;

    fn sub(self, rhs: DeltaTime) -> Instant {
        Instant::from_ticks(self.ticks().wrapping_sub(rhs.0 as u32))
    }
}

/// Negative deltas have no unsigned counterpart.
impl TryFrom<DeltaTime> for MicrosDurationU32 {
    type Error = ();

    fn try_from(delta: DeltaTime) -> Result<Self, Self::Error> {
        u32::try_from(delta.0).map(MicrosDurationU32::from_ticks).map_err(|_| ())
    }
}

impl From<MicrosDurationU32> for DeltaTime {
    fn from(duration: MicrosDurationU32) -> Self {
        DeltaTime(i32::try_from(duration.ticks()).unwrap_or(i32::MAX))
    }
}
