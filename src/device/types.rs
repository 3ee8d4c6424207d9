use crate::time::Instant;

/// Number of RF channels of the link layer.
pub const CHANNEL_COUNT: u8 = 40;

/// A link layer channel index.
///
/// Indices 0..=36 are data channels, 37..=39 the advertising channels. Scheduling calls take the
/// raw index and validate it into a `Channel` before anything is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct Channel(u8);

impl Channel {
    /// Creation, `None` for indices outside of the channel map.
    pub fn new(index: u8) -> Option<Self> {
        (index < CHANNEL_COUNT).then_some(Self(index))
    }

    /// The raw channel index.
    pub fn index(self) -> u8 {
        self.0
    }

    /// Channels 37, 38 and 39 carry advertising traffic.
    pub fn is_advertising(self) -> bool {
        self.0 >= 37
    }

    /// RF channel this index maps to. RF channels 0, 12 and 39 are used for advertising.
    pub fn rf_channel(self) -> u8 {
        match self.0 {
            37 => 0,
            38 => 12,
            39 => 39,
            index @ 0..=10 => index + 1,
            index => index + 2,
        }
    }

    /// Center frequency in MHz.
    pub fn frequency_mhz(self) -> u16 {
        2402 + u16::from(self.rf_channel()) * 2
    }

    /// Initial value of the data whitening LFSR (polynomial `x^7 + x^4 + 1`).
    pub fn whitening_iv(self) -> u8 {
        0b0100_0000 | self.0
    }
}

impl TryFrom<u8> for Channel {
    type Error = u8;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::new(index).ok_or(index)
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> Self {
        channel.0
    }
}

/// Completion of an armed transceiver primitive, as read from the hardware in interrupt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The frame went out. `started` is the instant the first bit was sent.
    Transmitted {
        /// First bit on air.
        started: Instant,
        /// Last bit on air.
        ended: Instant,
    },
    /// A frame start was detected inside the receive window and the frame has ended.
    Received {
        /// Start of the received frame.
        started: Instant,
        /// End of the received frame.
        ended: Instant,
        /// Result of the integrity check (CRC, length) done by the hardware.
        valid: bool,
    },
    /// The receive window closed without a frame start.
    Timeout {
        /// Instant the window was closed.
        at: Instant,
    },
}
