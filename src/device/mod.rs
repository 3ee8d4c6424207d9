//! Wrapper for all hardware functionality implemented by calling code.

pub mod types;

use core::fmt::Debug;

use crate::time::{DeltaTime, Instant, T_IFS};
use types::{Channel, Event};

/// The physical transceiver and its timer, provided by the calling code.
///
/// Every `arm_*` call arms exactly one primitive, and for each armed primitive `pending_event`
/// must eventually yield exactly one [`Event`]. All instants are readings of the same free running
/// microsecond timer that `init` returned the epoch of.
pub trait Transceiver {
    #[cfg(feature = "defmt")]
    type Error: Debug + defmt::Format;

    #[cfg(not(feature = "defmt"))]
    type Error: Debug;

    /// Power up the hardware and return the current timer reading.
    fn init(&mut self) -> Result<Instant, Self::Error>;

    /// Start sending `data` on `channel` so that the first bit goes out at `at`.
    ///
    /// The scheduler keeps `data` borrowed and unmodified until the matching
    /// [`Event::Transmitted`] has been read.
    fn arm_transmit(&mut self, channel: Channel, data: &[u8], at: Instant)
        -> Result<(), Self::Error>;

    /// Listen on `channel` from `opens` on. If no frame start is seen before `closes`, complete
    /// with [`Event::Timeout`].
    fn arm_receive(&mut self, channel: Channel, opens: Instant, closes: Instant)
        -> Result<(), Self::Error>;

    /// Read and clear the completion of the armed primitive, if it has completed.
    fn pending_event(&mut self) -> Option<Event>;

    /// Move the last received frame into `into`. Returns the number of bytes written, at most
    /// `into.len()`.
    fn read_frame(&mut self, into: &mut [u8]) -> usize;
}

/// Timing and size limits of the physical layer, selected at compile time.
pub trait RadioSpecs {
    /// Largest frame (PDU header and payload) accepted for transmission.
    fn max_frame_size() -> usize {
        2 + 251
    }

    /// Gap between the end of a transmission and the opening of the following receive window.
    /// Values below [`T_IFS`] are raised to it.
    fn inter_frame_space() -> DeltaTime {
        T_IFS
    }

    /// Largest deviation of a hardware event from its target before it is reported.
    fn jitter() -> DeltaTime {
        DeltaTime::micros(2)
    }

    /// Time on air of a frame of `len` bytes, including preamble, access address and CRC.
    fn air_time(len: usize) -> DeltaTime;
}

/// LE 1M PHY.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ble1M;

impl RadioSpecs for Ble1M {
    fn air_time(len: usize) -> DeltaTime {
        DeltaTime::micros((1 + 4 + len as i32 + 3) * 8)
    }
}

/// LE 2M PHY.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ble2M;

impl RadioSpecs for Ble2M {
    fn air_time(len: usize) -> DeltaTime {
        DeltaTime::micros((2 + 4 + len as i32 + 3) * 4)
    }
}
