//! Loopback simulation of the physical layer.
//!
//! An [`Ether`] is a shared medium with a manually advanced clock. Every [`SimTransceiver`] taken
//! from it implements [`Transceiver`]: transmissions are put on the medium when armed, and a
//! receive window on the same channel picks up the first frame that starts inside it. Nothing
//! happens on its own; a test driver advances the clock to [`SimTransceiver::next_deadline`] and
//! calls the completion handler.

use core::cell::RefCell;
use core::marker::PhantomData;

use heapless::Vec;

use crate::device::types::{Channel, Event};
use crate::device::{Ble1M, RadioSpecs, Transceiver};
use crate::time::{DeltaTime, Instant};

/// Largest frame the medium carries.
pub const MAX_FRAME: usize = 256;

const IN_FLIGHT: usize = 8;
const ARMINGS: usize = 32;

/// Hardware faults of the simulated transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SimError {
    /// Target instant already passed.
    TooLate,
    /// Frame does not fit into [`MAX_FRAME`].
    FrameTooLarge,
    /// A primitive is still armed.
    Busy,
    /// Failure requested by [`Ether::fail_next_arm`].
    Injected,
}

/// A primitive as it was armed, recorded for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Arming {
    /// `arm_transmit` was called.
    Transmit {
        /// Channel to send on.
        channel: Channel,
        /// First bit on air.
        at: Instant,
        /// Frame length.
        len: usize,
    },
    /// `arm_receive` was called.
    Receive {
        /// Channel to listen on.
        channel: Channel,
        /// Window start.
        opens: Instant,
        /// Window end.
        closes: Instant,
    },
}

#[derive(Debug)]
struct Transmission {
    origin: u8,
    channel: Channel,
    started: Instant,
    ended: Instant,
    valid: bool,
    frame: Vec<u8, MAX_FRAME>,
}

#[derive(Debug)]
struct Medium {
    now: Instant,
    in_flight: Vec<Transmission, IN_FLIGHT>,
    attached: u8,
    corrupt_next: bool,
    fail_next_arm: bool,
}

/// Shared simulated medium and clock.
#[derive(Debug)]
pub struct Ether<S = Ble1M>
where
    S: RadioSpecs,
{
    medium: RefCell<Medium>,
    specs: PhantomData<S>,
}

impl<S> Default for Ether<S>
where
    S: RadioSpecs,
{
    fn default() -> Self {
        Self::new(Instant::from_ticks(0))
    }
}

impl<S> Ether<S>
where
    S: RadioSpecs,
{
    /// Creation with the clock at `epoch`.
    pub fn new(epoch: Instant) -> Self {
        Self {
            medium: RefCell::new(Medium {
                now: epoch,
                in_flight: Vec::new(),
                attached: 0,
                corrupt_next: false,
                fail_next_arm: false,
            }),
            specs: PhantomData,
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> Instant {
        self.medium.borrow().now
    }

    /// Move the clock forward. Negative deltas are ignored.
    pub fn advance(&self, delta: DeltaTime) {
        if delta.is_positive() {
            let mut medium = self.medium.borrow_mut();
            medium.now = medium.now + delta;
        }
    }

    /// Move the clock forward to `instant`, if it lies ahead.
    pub fn advance_to(&self, instant: Instant) {
        let mut medium = self.medium.borrow_mut();
        if instant > medium.now {
            medium.now = instant;
        }
    }

    /// The next frame put on the medium fails the integrity check at every receiver.
    pub fn corrupt_next_transmission(&self) {
        self.medium.borrow_mut().corrupt_next = true;
    }

    /// The next `arm_*` call of any transceiver fails with [`SimError::Injected`].
    pub fn fail_next_arm(&self) {
        self.medium.borrow_mut().fail_next_arm = true;
    }

    /// Attach a new transceiver to the medium.
    pub fn transceiver(&self) -> SimTransceiver<'_, S> {
        let mut medium = self.medium.borrow_mut();
        medium.attached += 1;
        SimTransceiver {
            ether: self,
            id: medium.attached,
            armed: None,
            frame: Vec::new(),
            armings: Vec::new(),
        }
    }

    fn check_arm(&self, at: Instant) -> Result<(), SimError> {
        let mut medium = self.medium.borrow_mut();
        if medium.fail_next_arm {
            medium.fail_next_arm = false;
            return Err(SimError::Injected);
        }
        if at < medium.now {
            return Err(SimError::TooLate);
        }
        Ok(())
    }

    fn send(
        &self,
        origin: u8,
        channel: Channel,
        data: &[u8],
        started: Instant,
    ) -> Result<Instant, SimError> {
        let frame = Vec::from_slice(data).map_err(|_| SimError::FrameTooLarge)?;
        let ended = started + S::air_time(data.len());
        let mut medium = self.medium.borrow_mut();
        let valid = !medium.corrupt_next;
        medium.corrupt_next = false;
        if medium.in_flight.is_full() {
            medium.in_flight.remove(0);
        }
        let transmission = Transmission { origin, channel, started, ended, valid, frame };
        if medium.in_flight.push(transmission).is_err() {
            return Err(SimError::Busy);
        }
        Ok(ended)
    }

    /// First frame of another transceiver starting inside `opens..=closes` on `channel`.
    fn with_first_frame<R>(
        &self,
        listener: u8,
        channel: Channel,
        opens: Instant,
        closes: Instant,
        f: impl FnOnce(&Transmission) -> R,
    ) -> Option<R> {
        let medium = self.medium.borrow();
        medium
            .in_flight
            .iter()
            .filter(|tx| tx.origin != listener && tx.channel == channel)
            .filter(|tx| tx.started >= opens && tx.started <= closes)
            .min_by_key(|tx| tx.started)
            .map(f)
    }
}

#[derive(Debug, Clone, Copy)]
enum Armed {
    Transmit { started: Instant, ended: Instant },
    Receive { channel: Channel, opens: Instant, closes: Instant },
}

/// A transceiver on an [`Ether`].
#[derive(Debug)]
pub struct SimTransceiver<'e, S = Ble1M>
where
    S: RadioSpecs,
{
    ether: &'e Ether<S>,
    id: u8,
    armed: Option<Armed>,
    frame: Vec<u8, MAX_FRAME>,
    armings: Vec<Arming, ARMINGS>,
}

impl<S> SimTransceiver<'_, S>
where
    S: RadioSpecs,
{
    /// Primitives armed so far, oldest first. Only the latest entries are kept.
    pub fn armings(&self) -> &[Arming] {
        &self.armings
    }

    /// The most recently armed primitive.
    pub fn last_arming(&self) -> Option<Arming> {
        self.armings.last().copied()
    }

    /// True while a primitive waits for its completion.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Instant the armed primitive completes, given the frames currently on the medium.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.armed? {
            Armed::Transmit { ended, .. } => Some(ended),
            Armed::Receive { channel, opens, closes } => Some(
                self.ether
                    .with_first_frame(self.id, channel, opens, closes, |tx| tx.ended)
                    .unwrap_or(closes),
            ),
        }
    }

    fn record(&mut self, arming: Arming) {
        if self.armings.is_full() {
            self.armings.remove(0);
        }
        // room was made above
        let _ = self.armings.push(arming);
    }

    fn ensure_disarmed(&self) -> Result<(), SimError> {
        if self.armed.is_some() {
            Err(SimError::Busy)
        } else {
            Ok(())
        }
    }
}

impl<S> Transceiver for SimTransceiver<'_, S>
where
    S: RadioSpecs,
{
    type Error = SimError;

    fn init(&mut self) -> Result<Instant, Self::Error> {
        self.armed = None;
        Ok(self.ether.now())
    }

    fn arm_transmit(
        &mut self,
        channel: Channel,
        data: &[u8],
        at: Instant,
    ) -> Result<(), Self::Error> {
        self.ensure_disarmed()?;
        self.ether.check_arm(at)?;
        let ended = self.ether.send(self.id, channel, data, at)?;
        self.armed = Some(Armed::Transmit { started: at, ended });
        self.record(Arming::Transmit { channel, at, len: data.len() });
        Ok(())
    }

    fn arm_receive(
        &mut self,
        channel: Channel,
        opens: Instant,
        closes: Instant,
    ) -> Result<(), Self::Error> {
        self.ensure_disarmed()?;
        self.ether.check_arm(opens)?;
        self.armed = Some(Armed::Receive { channel, opens, closes });
        self.record(Arming::Receive { channel, opens, closes });
        Ok(())
    }

    fn pending_event(&mut self) -> Option<Event> {
        let now = self.ether.now();
        let event = match self.armed? {
            Armed::Transmit { started, ended } => {
                (now >= ended).then_some(Event::Transmitted { started, ended })?
            }
            Armed::Receive { channel, opens, closes } => {
                let mut frame = Vec::new();
                let heard = self.ether.with_first_frame(self.id, channel, opens, closes, |tx| {
                    frame.clone_from(&tx.frame);
                    (tx.started, tx.ended, tx.valid)
                });
                match heard {
                    Some((started, ended, valid)) if now >= ended => {
                        self.frame = frame;
                        Event::Received { started, ended, valid }
                    }
                    Some(_) => return None,
                    None if now >= closes => Event::Timeout { at: closes },
                    None => return None,
                }
            }
        };
        self.armed = None;
        Some(event)
    }

    fn read_frame(&mut self, into: &mut [u8]) -> usize {
        let length = self.frame.len().min(into.len());
        into[..length].copy_from_slice(&self.frame[..length]);
        length
    }
}
