//! Anchor-relative scheduling of transmit and receive operations on a half-duplex radio.
//!
//! Every scheduling call takes its instant as a [`DeltaTime`] relative to the current anchor.
//! The anchor is defined when the radio comes up and redefined by every completed operation:
//!
//! | operation              | outcome            | new anchor                  |
//! |------------------------|--------------------|-----------------------------|
//! | transmit               | transmitted        | first bit of the frame      |
//! | receive                | frame received     | start of the received frame |
//! | receive                | timeout / invalid  | close of the receive window |
//! | transmit and receive   | any                | first bit of the frame sent |
//!
//! At most one operation is pending. A new one can be scheduled from the completion callback or
//! any time after it ran, but never aimed at an instant before the previous operation released
//! the hardware.

mod state;

use core::cmp::max;
use core::marker::PhantomData;
use core::mem;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::device::types::{Channel, Event};
use crate::device::{Ble1M, RadioSpecs, Transceiver};
use crate::time::{DeltaTime, Instant, T_IFS};
use state::{Completion, State};

/// Violated preconditions of a scheduling call, or an event that does not fit the armed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Channel index outside of the channel map.
    InvalidChannel(u8),
    /// A `when` or `timeout` that is zero or negative.
    NonPositiveDelta,
    /// Frame longer than the physical layer allows.
    FrameTooLarge(usize),
    /// An operation is still pending.
    Busy,
    /// The requested instant lies before the previous operation released the radio.
    Overlapping,
    /// The transceiver reported a completion the scheduler was not waiting for.
    UnexpectedEvent,
}

impl<T> From<Error> for crate::Error<T>
where
    T: Transceiver,
{
    fn from(value: Error) -> Self {
        Self::Radio(value)
    }
}

/// Completion handlers, invoked from [`ScheduledRadio::on_interrupt`].
///
/// Exactly one handler runs per accepted scheduling call. Handlers run in interrupt context; they
/// may schedule the next operation through `radio` right away, or record the outcome for later.
pub trait Callbacks<'a, T, S = Ble1M>
where
    T: Transceiver,
    S: RadioSpecs,
{
    /// A transmit-only operation went out.
    fn on_transmit(&mut self, _radio: &mut Scheduler<'a, T, S>, _transmitted: WriteBuffer<'a>) {
        // default do nothing
    }

    /// A valid frame of `length` bytes was received into `buffer`.
    fn on_receive(&mut self, radio: &mut Scheduler<'a, T, S>, buffer: ReadBuffer<'a>, length: usize);

    /// The receive window closed without a valid frame. `buffer` content is unspecified.
    fn on_timeout(&mut self, radio: &mut Scheduler<'a, T, S>, buffer: ReadBuffer<'a>);
}

/// Owner of the transceiver, the anchor and the pending operation.
pub struct Scheduler<'a, T, S = Ble1M>
where
    T: Transceiver,
    S: RadioSpecs,
{
    transceiver: T,
    anchor: Instant,
    released: Instant,
    state: State<'a>,
    specs: PhantomData<S>,
}

impl<'a, T, S> Scheduler<'a, T, S>
where
    T: Transceiver,
    S: RadioSpecs,
{
    fn new(mut transceiver: T) -> Result<Self, crate::Error<T>> {
        let epoch = transceiver.init().map_err(crate::Error::Transceiver)?;
        info!("radio up, anchor {}", epoch.ticks());
        Ok(Self {
            transceiver,
            anchor: epoch,
            released: epoch,
            state: State::Idle,
            specs: PhantomData,
        })
    }

    /// The instant the next scheduling call is relative to.
    pub fn anchor(&self) -> Instant {
        self.anchor
    }

    /// True if no operation is pending.
    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    /// Get the transceiver.
    pub fn transceiver(&self) -> &T {
        &self.transceiver
    }

    /// Get the transceiver mutably.
    pub fn transceiver_mut(&mut self) -> &mut T {
        &mut self.transceiver
    }

    /// Send `transmit` on `channel`, first bit at `when` after the anchor.
    pub fn schedule_transmit(
        &mut self,
        channel: u8,
        transmit: WriteBuffer<'a>,
        when: DeltaTime,
    ) -> Result<(), crate::Error<T>> {
        self.ensure_idle()?;
        let channel = Self::channel(channel)?;
        Self::positive(when)?;
        Self::fits(&transmit)?;
        let start = self.target(when)?;

        self.transceiver
            .arm_transmit(channel, transmit.as_slice(), start)
            .map_err(Self::arm_failed)?;
        debug!("tx armed ch {} at {} len {}", channel.index(), start.ticks(), transmit.len());
        self.state = State::ArmedTransmit { start, transmit };
        Ok(())
    }

    /// Listen on `channel` from `when` after the anchor for at most `timeout`.
    pub fn schedule_receive(
        &mut self,
        channel: u8,
        when: DeltaTime,
        receive: ReadBuffer<'a>,
        timeout: DeltaTime,
    ) -> Result<(), crate::Error<T>> {
        self.ensure_idle()?;
        let channel = Self::channel(channel)?;
        Self::positive(when)?;
        Self::positive(timeout)?;
        let opens = self.target(when)?;
        let closes = opens + timeout;

        self.transceiver
            .arm_receive(channel, opens, closes)
            .map_err(Self::arm_failed)?;
        debug!("rx armed ch {} from {} to {}", channel.index(), opens.ticks(), closes.ticks());
        self.state = State::ArmedReceive { opens, closes, receive };
        Ok(())
    }

    /// Send `transmit` on `channel` at `when` after the anchor, then listen for a response.
    ///
    /// The receive window opens one inter frame space after the end of the transmission and stays
    /// open for `timeout`. Both phases are validated here; the receive phase is armed by the
    /// completion handler without another scheduling call.
    pub fn schedule_transmit_and_receive(
        &mut self,
        channel: u8,
        transmit: WriteBuffer<'a>,
        when: DeltaTime,
        receive: ReadBuffer<'a>,
        timeout: DeltaTime,
    ) -> Result<(), crate::Error<T>> {
        self.ensure_idle()?;
        let channel = Self::channel(channel)?;
        Self::positive(when)?;
        Self::positive(timeout)?;
        Self::fits(&transmit)?;
        let start = self.target(when)?;

        self.transceiver
            .arm_transmit(channel, transmit.as_slice(), start)
            .map_err(Self::arm_failed)?;
        debug!("tx/rx armed ch {} at {} len {}", channel.index(), start.ticks(), transmit.len());
        self.state = State::AwaitingGuardInterval { channel, start, transmit, receive, timeout };
        Ok(())
    }

    /// Gap between the end of a transmission and the following receive window.
    pub fn guard_interval() -> DeltaTime {
        max(S::inter_frame_space(), T_IFS)
    }

    fn ensure_idle(&self) -> Result<(), Error> {
        match self.state.target() {
            None => Ok(()),
            Some(pending) => {
                warn!("rejected, operation pending at {}", pending.ticks());
                Err(Error::Busy)
            }
        }
    }

    fn channel(index: u8) -> Result<Channel, Error> {
        Channel::new(index).ok_or(Error::InvalidChannel(index))
    }

    fn positive(delta: DeltaTime) -> Result<(), Error> {
        if delta.is_positive() {
            Ok(())
        } else {
            Err(Error::NonPositiveDelta)
        }
    }

    fn fits(transmit: &WriteBuffer<'_>) -> Result<(), Error> {
        if transmit.len() > S::max_frame_size() {
            Err(Error::FrameTooLarge(transmit.len()))
        } else {
            Ok(())
        }
    }

    fn target(&self, when: DeltaTime) -> Result<Instant, Error> {
        let at = self.anchor + when;
        if at < self.released {
            Err(Error::Overlapping)
        } else {
            Ok(at)
        }
    }

    fn arm_failed(err: T::Error) -> crate::Error<T> {
        error!("arming failed: {:?}", err);
        crate::Error::Transceiver(err)
    }

    fn redefine(&mut self, anchor: Instant, released: Instant) {
        trace!("anchor {} -> {}, released at {}", self.anchor.ticks(), anchor.ticks(), released.ticks());
        self.anchor = anchor;
        self.released = released;
    }

    fn check_timing(target: Instant, actual: Instant) {
        let deviation = DeltaTime::between(target, actual);
        if deviation.abs() > S::jitter() {
            warn!("event off by {}us (target {})", deviation.as_micros(), target.ticks());
        }
    }

    fn read_into(&mut self, receive: &mut ReadBuffer<'_>) -> usize {
        let length = self.transceiver.read_frame(receive.as_mut_slice());
        length.min(receive.capacity())
    }

    /// Advance the state machine with `event`. `None` when the operation continues.
    fn complete(&mut self, event: Event) -> Result<Option<Completion<'a, T::Error>>, Error> {
        match (mem::replace(&mut self.state, State::Idle), event) {
            (State::ArmedTransmit { start, transmit }, Event::Transmitted { started, ended }) => {
                Self::check_timing(start, started);
                self.redefine(started, ended);
                Ok(Some(Completion::Transmitted(transmit)))
            }
            (
                State::ArmedReceive { opens, closes, mut receive },
                Event::Received { started, ended, valid },
            ) => {
                if started < opens {
                    Self::check_timing(opens, started);
                }
                if valid {
                    self.redefine(started, ended);
                    let length = self.read_into(&mut receive);
                    Ok(Some(Completion::Received(receive, length)))
                } else {
                    trace!("invalid frame, reported as timeout");
                    self.redefine(closes, max(ended, closes));
                    Ok(Some(Completion::TimedOut(receive)))
                }
            }
            (State::ArmedReceive { closes, receive, .. }, Event::Timeout { at }) => {
                Self::check_timing(closes, at);
                self.redefine(at, at);
                Ok(Some(Completion::TimedOut(receive)))
            }
            (
                State::AwaitingGuardInterval { channel, start, receive, timeout, .. },
                Event::Transmitted { started, ended },
            ) => {
                Self::check_timing(start, started);
                let opens = ended + Self::guard_interval();
                let closes = opens + timeout;
                match self.transceiver.arm_receive(channel, opens, closes) {
                    Ok(()) => {
                        trace!("rx after tx from {} to {}", opens.ticks(), closes.ticks());
                        self.state = State::ArmedReceiveAfterTransmit {
                            transmitted: started,
                            opens,
                            closes,
                            receive,
                        };
                        Ok(None)
                    }
                    Err(err) => {
                        error!("arming rx after tx failed: {:?}", err);
                        self.redefine(started, ended);
                        Ok(Some(Completion::Aborted(receive, err)))
                    }
                }
            }
            (
                State::ArmedReceiveAfterTransmit { transmitted, opens, closes, mut receive },
                Event::Received { started, ended, valid },
            ) => {
                if started < opens {
                    Self::check_timing(opens, started);
                }
                if valid {
                    self.redefine(transmitted, ended);
                    let length = self.read_into(&mut receive);
                    Ok(Some(Completion::Received(receive, length)))
                } else {
                    trace!("invalid frame, reported as timeout");
                    self.redefine(transmitted, max(ended, closes));
                    Ok(Some(Completion::TimedOut(receive)))
                }
            }
            (
                State::ArmedReceiveAfterTransmit { transmitted, closes, receive, .. },
                Event::Timeout { at },
            ) => {
                Self::check_timing(closes, at);
                self.redefine(transmitted, at);
                Ok(Some(Completion::TimedOut(receive)))
            }
            (state, _) => {
                warn!("unexpected event");
                self.state = state;
                Err(Error::UnexpectedEvent)
            }
        }
    }
}

/// A radio scheduling engine: the [`Scheduler`] together with the caller's [`Callbacks`].
///
/// Creating it is the one-time initialization of the radio. Hook [`on_interrupt`] to the radio
/// and timer interrupts of the transceiver.
///
/// [`on_interrupt`]: ScheduledRadio::on_interrupt
pub struct ScheduledRadio<'a, T, C, S = Ble1M>
where
    T: Transceiver,
    C: Callbacks<'a, T, S>,
    S: RadioSpecs,
{
    scheduler: Scheduler<'a, T, S>,
    callbacks: C,
}

impl<'a, T, C, S> ScheduledRadio<'a, T, C, S>
where
    T: Transceiver,
    C: Callbacks<'a, T, S>,
    S: RadioSpecs,
{
    /// Bring up the transceiver. Its current timer reading becomes the first anchor.
    pub fn new(transceiver: T, callbacks: C) -> Result<Self, crate::Error<T>> {
        Ok(Self { scheduler: Scheduler::new(transceiver)?, callbacks })
    }

    /// See [`Scheduler::schedule_transmit`].
    pub fn schedule_transmit(
        &mut self,
        channel: u8,
        transmit: WriteBuffer<'a>,
        when: DeltaTime,
    ) -> Result<(), crate::Error<T>> {
        self.scheduler.schedule_transmit(channel, transmit, when)
    }

    /// See [`Scheduler::schedule_receive`].
    pub fn schedule_receive(
        &mut self,
        channel: u8,
        when: DeltaTime,
        receive: ReadBuffer<'a>,
        timeout: DeltaTime,
    ) -> Result<(), crate::Error<T>> {
        self.scheduler.schedule_receive(channel, when, receive, timeout)
    }

    /// See [`Scheduler::schedule_transmit_and_receive`].
    pub fn schedule_transmit_and_receive(
        &mut self,
        channel: u8,
        transmit: WriteBuffer<'a>,
        when: DeltaTime,
        receive: ReadBuffer<'a>,
        timeout: DeltaTime,
    ) -> Result<(), crate::Error<T>> {
        self.scheduler.schedule_transmit_and_receive(channel, transmit, when, receive, timeout)
    }

    /// Completion handler, to be called from the transceiver's interrupt.
    ///
    /// Reads one event from the transceiver. When it finishes the pending operation the anchor is
    /// redefined and exactly one callback runs. A receive phase that could not be armed after the
    /// transmission is reported through `on_timeout` and then returned as the hardware error.
    pub fn on_interrupt(&mut self) -> Result<(), crate::Error<T>> {
        let Some(event) = self.scheduler.transceiver.pending_event() else {
            return Ok(());
        };
        let Some(completion) = self.scheduler.complete(event)? else {
            return Ok(());
        };
        match completion {
            Completion::Transmitted(transmitted) => {
                self.callbacks.on_transmit(&mut self.scheduler, transmitted)
            }
            Completion::Received(buffer, length) => {
                self.callbacks.on_receive(&mut self.scheduler, buffer, length)
            }
            Completion::TimedOut(buffer) => self.callbacks.on_timeout(&mut self.scheduler, buffer),
            Completion::Aborted(buffer, err) => {
                self.callbacks.on_timeout(&mut self.scheduler, buffer);
                return Err(crate::Error::Transceiver(err));
            }
        }
        Ok(())
    }

    /// See [`Scheduler::anchor`].
    pub fn anchor(&self) -> Instant {
        self.scheduler.anchor()
    }

    /// See [`Scheduler::is_idle`].
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Get the scheduler, e.g. to schedule outside of a callback.
    pub fn scheduler(&mut self) -> &mut Scheduler<'a, T, S> {
        &mut self.scheduler
    }

    /// Get the caller-supplied callbacks.
    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    /// Get the caller-supplied callbacks mutably.
    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    /// Get the transceiver.
    pub fn transceiver(&self) -> &T {
        self.scheduler.transceiver()
    }

    /// Get the transceiver mutably.
    pub fn transceiver_mut(&mut self) -> &mut T {
        self.scheduler.transceiver_mut()
    }
}
