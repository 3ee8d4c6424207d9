//! Hidden state of the scheduler. Scheduling calls only enter it from `Idle`; every other
//! transition is taken by the completion handler.

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::device::types::Channel;
use crate::time::{DeltaTime, Instant};

#[derive(Debug)]
pub(crate) enum State<'a> {
    Idle,
    ArmedTransmit {
        start: Instant,
        transmit: WriteBuffer<'a>,
    },
    ArmedReceive {
        opens: Instant,
        closes: Instant,
        receive: ReadBuffer<'a>,
    },
    /// Transmit phase of a combined operation. The receive window is armed once the
    /// transmission has ended and its position relative to that end is known.
    AwaitingGuardInterval {
        channel: Channel,
        start: Instant,
        transmit: WriteBuffer<'a>,
        receive: ReadBuffer<'a>,
        timeout: DeltaTime,
    },
    ArmedReceiveAfterTransmit {
        transmitted: Instant,
        opens: Instant,
        closes: Instant,
        receive: ReadBuffer<'a>,
    },
}

impl State<'_> {
    pub(crate) fn is_idle(&self) -> bool {
        matches!(self, State::Idle)
    }

    /// Instant the pending operation was last aimed at, for diagnostics.
    pub(crate) fn target(&self) -> Option<Instant> {
        match self {
            State::Idle => None,
            State::ArmedTransmit { start, .. } | State::AwaitingGuardInterval { start, .. } => {
                Some(*start)
            }
            State::ArmedReceive { opens, .. } | State::ArmedReceiveAfterTransmit { opens, .. } => {
                Some(*opens)
            }
        }
    }
}

/// Outcome of a finished operation, handed to the callbacks.
pub(crate) enum Completion<'a, E> {
    Transmitted(WriteBuffer<'a>),
    Received(ReadBuffer<'a>, usize),
    TimedOut(ReadBuffer<'a>),
    /// Receive phase of a combined operation could not be armed.
    Aborted(ReadBuffer<'a>, E),
}
