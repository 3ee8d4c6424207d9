#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod fmt;

pub mod buffer;
pub mod device;
pub mod radio;
#[cfg(feature = "sim")]
pub mod sim;
pub mod time;

pub use buffer::{ReadBuffer, WriteBuffer};
pub use device::types::{Channel, Event};
pub use device::{Ble1M, Ble2M, RadioSpecs, Transceiver};
pub use radio::{Callbacks, ScheduledRadio, Scheduler};
pub use time::{DeltaTime, Instant};

/// Errors returned by the scheduling calls and the completion handler.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<T>
where
    T: Transceiver,
{
    /// The transceiver failed, e.g. to arm at the requested instant.
    Transceiver(T::Error),
    /// A precondition of a scheduling call was violated.
    Radio(radio::Error),
}
