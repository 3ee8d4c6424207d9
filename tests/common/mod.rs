#![allow(dead_code)]

use scheduled_radio::sim::{Ether, SimTransceiver};
use scheduled_radio::{
    Callbacks, DeltaTime, Instant, RadioSpecs, ReadBuffer, ScheduledRadio, Scheduler, Transceiver,
    WriteBuffer,
};

/// Callbacks that only record what happened.
#[derive(Default)]
pub struct Recorder<'a> {
    pub transmitted: Vec<usize>,
    pub received: Vec<Vec<u8>>,
    pub timeouts: usize,
    pub anchors: Vec<Instant>,
    pub buffer: Option<ReadBuffer<'a>>,
}

impl<'a> Recorder<'a> {
    pub fn completions(&self) -> usize {
        self.transmitted.len() + self.received.len() + self.timeouts
    }
}

impl<'a, T, S> Callbacks<'a, T, S> for Recorder<'a>
where
    T: Transceiver,
    S: RadioSpecs,
{
    fn on_transmit(&mut self, radio: &mut Scheduler<'a, T, S>, transmitted: WriteBuffer<'a>) {
        self.transmitted.push(transmitted.len());
        self.anchors.push(radio.anchor());
    }

    fn on_receive(&mut self, radio: &mut Scheduler<'a, T, S>, buffer: ReadBuffer<'a>, length: usize) {
        self.received.push(buffer.as_slice()[..length].to_vec());
        self.anchors.push(radio.anchor());
        self.buffer = Some(buffer);
    }

    fn on_timeout(&mut self, radio: &mut Scheduler<'a, T, S>, buffer: ReadBuffer<'a>) {
        self.timeouts += 1;
        self.anchors.push(radio.anchor());
        self.buffer = Some(buffer);
    }
}

pub type SimRadio<'a, 'e, C = Recorder<'a>> = ScheduledRadio<'a, SimTransceiver<'e>, C>;

pub fn radio<'a, 'e>(ether: &'e Ether) -> SimRadio<'a, 'e> {
    ScheduledRadio::new(ether.transceiver(), Recorder::default()).unwrap()
}

pub fn us(micros: i32) -> DeltaTime {
    DeltaTime::micros(micros)
}

pub fn at(ticks: u32) -> Instant {
    Instant::from_ticks(ticks)
}

/// Receive views over a pool of equally sized areas.
pub fn receive_buffers<const N: usize>(pool: &mut [[u8; N]]) -> impl Iterator<Item = ReadBuffer<'_>> {
    pool.iter_mut().map(|area| ReadBuffer::new(&mut area[..]))
}

/// Run the clock until the radio has nothing armed.
pub fn settle<'a, 'e, C>(ether: &'e Ether, radio: &mut SimRadio<'a, 'e, C>)
where
    C: Callbacks<'a, SimTransceiver<'e>>,
{
    while let Some(deadline) = radio.transceiver().next_deadline() {
        ether.advance_to(deadline);
        radio.on_interrupt().unwrap();
    }
}

/// Run the clock until neither radio has anything armed.
pub fn settle_pair<'a, 'b, 'e, A, B>(
    ether: &'e Ether,
    first: &mut SimRadio<'a, 'e, A>,
    second: &mut SimRadio<'b, 'e, B>,
) where
    A: Callbacks<'a, SimTransceiver<'e>>,
    B: Callbacks<'b, SimTransceiver<'e>>,
{
    loop {
        let next = [first.transceiver().next_deadline(), second.transceiver().next_deadline()]
            .into_iter()
            .flatten()
            .min();
        let Some(next) = next else {
            break;
        };
        ether.advance_to(next);
        first.on_interrupt().unwrap();
        second.on_interrupt().unwrap();
    }
}
