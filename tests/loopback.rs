mod common;

use common::*;
use scheduled_radio::sim::{Arming, Ether, SimTransceiver};
use scheduled_radio::time::T_IFS;
use scheduled_radio::{
    Ble1M, Callbacks, DeltaTime, Instant, RadioSpecs, ReadBuffer, ScheduledRadio, Scheduler,
    WriteBuffer,
};

fn hop(event: u8) -> u8 {
    ((u32::from(event) * 7 + 3) % 37) as u8
}

#[test]
fn frame_is_delivered_to_the_listener() {
    let frame: Vec<u8> = (1..=20).collect();
    let mut area = [0u8; 64];
    let ether: Ether = Ether::default();
    let mut sender = radio(&ether);
    let mut listener = radio(&ether);

    sender.schedule_transmit(12, WriteBuffer::new(&frame), us(2_000)).unwrap();
    listener.schedule_receive(12, us(1_500), ReadBuffer::new(&mut area), us(1_000)).unwrap();
    settle_pair(&ether, &mut sender, &mut listener);

    assert_eq!(listener.callbacks().received, [frame.clone()]);
    assert_eq!(listener.callbacks().timeouts, 0);
    // both sides agree on the anchor
    assert_eq!(listener.anchor(), at(2_000));
    assert_eq!(sender.anchor(), at(2_000));
    let buffer = listener.callbacks_mut().buffer.take().unwrap();
    assert_eq!(&buffer.into_inner()[..20], &frame[..]);
}

#[test]
fn frame_is_clipped_to_the_capacity() {
    let frame: Vec<u8> = (1..=20).collect();
    let mut area = [0u8; 8];
    let ether: Ether = Ether::default();
    let mut sender = radio(&ether);
    let mut listener = radio(&ether);

    sender.schedule_transmit(30, WriteBuffer::new(&frame), us(2_000)).unwrap();
    listener.schedule_receive(30, us(1_500), ReadBuffer::new(&mut area), us(1_000)).unwrap();
    settle_pair(&ether, &mut sender, &mut listener);

    assert_eq!(listener.callbacks().received, [frame[..8].to_vec()]);
}

#[test]
fn other_channel_or_late_frame_times_out() {
    let frame = [0x11u8; 4];
    let mut pool = [[0u8; 16]; 2];
    let mut buffers = receive_buffers(&mut pool);
    let ether: Ether = Ether::default();
    let mut sender = radio(&ether);
    let mut listener = radio(&ether);

    sender.schedule_transmit(8, WriteBuffer::new(&frame), us(1_000)).unwrap();
    listener.schedule_receive(9, us(900), buffers.next().unwrap(), us(500)).unwrap();
    settle_pair(&ether, &mut sender, &mut listener);
    assert_eq!(listener.callbacks().timeouts, 1);
    assert_eq!(listener.anchor(), at(1_400));

    // window closes before the frame starts
    sender.schedule_transmit(8, WriteBuffer::new(&frame), us(2_000)).unwrap();
    listener.schedule_receive(8, us(100), buffers.next().unwrap(), us(400)).unwrap();
    settle_pair(&ether, &mut sender, &mut listener);
    assert_eq!(listener.callbacks().timeouts, 2);
    assert!(listener.callbacks().received.is_empty());
}

#[test]
fn corrupted_frame_is_reported_as_timeout() {
    let frame = [0x42u8; 6];
    let mut area = [0u8; 16];
    let ether: Ether = Ether::default();
    let mut sender = radio(&ether);
    let mut listener = radio(&ether);

    ether.corrupt_next_transmission();
    sender.schedule_transmit(17, WriteBuffer::new(&frame), us(1_000)).unwrap();
    listener.schedule_receive(17, us(800), ReadBuffer::new(&mut area), us(400)).unwrap();
    settle_pair(&ether, &mut sender, &mut listener);

    assert!(listener.callbacks().received.is_empty());
    assert_eq!(listener.callbacks().timeouts, 1);
    assert_eq!(listener.anchor(), at(1_200));
}

/// Opens a connection event every `interval` and listens for the response.
struct Central<'a> {
    request: &'a [u8],
    interval: DeltaTime,
    timeout: DeltaTime,
    event: u8,
    events: u8,
    responses: Vec<Vec<u8>>,
    anchors: Vec<Instant>,
    timeouts: usize,
    parked: Option<ReadBuffer<'a>>,
}

impl<'a> Central<'a> {
    fn new(request: &'a [u8], interval: DeltaTime, events: u8) -> Self {
        Self {
            request,
            interval,
            timeout: us(200),
            event: 0,
            events,
            responses: Vec::new(),
            anchors: Vec::new(),
            timeouts: 0,
            parked: None,
        }
    }

    fn next(&mut self, radio: &mut Scheduler<'a, SimTransceiver<'_>>, buffer: ReadBuffer<'a>) {
        self.anchors.push(radio.anchor());
        self.event += 1;
        if self.event == self.events {
            self.parked = Some(buffer);
            return;
        }
        radio
            .schedule_transmit_and_receive(
                hop(self.event),
                WriteBuffer::new(self.request),
                self.interval,
                buffer,
                self.timeout,
            )
            .unwrap();
    }
}

impl<'a, 'e> Callbacks<'a, SimTransceiver<'e>> for Central<'a> {
    fn on_receive(&mut self, radio: &mut Scheduler<'a, SimTransceiver<'e>>, buffer: ReadBuffer<'a>, length: usize) {
        self.responses.push(buffer.as_slice()[..length].to_vec());
        self.next(radio, buffer);
    }

    fn on_timeout(&mut self, radio: &mut Scheduler<'a, SimTransceiver<'e>>, buffer: ReadBuffer<'a>) {
        self.timeouts += 1;
        self.next(radio, buffer);
    }
}

/// Follows the central: answers each request one inter frame space after it ended, then
/// listens for the next one with a small window around the expected anchor.
struct Peripheral<'a> {
    response: &'a [u8],
    interval: DeltaTime,
    widening: DeltaTime,
    event: u8,
    events: u8,
    request_air_time: DeltaTime,
    requests: Vec<Vec<u8>>,
    anchors: Vec<Instant>,
    timeouts: usize,
    buffer: Option<ReadBuffer<'a>>,
}

impl<'a, 'e> Callbacks<'a, SimTransceiver<'e>> for Peripheral<'a> {
    fn on_transmit(&mut self, radio: &mut Scheduler<'a, SimTransceiver<'e>>, _: WriteBuffer<'a>) {
        self.event += 1;
        if self.event == self.events {
            return;
        }
        // anchor is the start of our response
        let when = self.interval - self.request_air_time - T_IFS - self.widening;
        let buffer = self.buffer.take().unwrap();
        radio
            .schedule_receive(hop(self.event), when, buffer, self.widening + self.widening)
            .unwrap();
    }

    fn on_receive(&mut self, radio: &mut Scheduler<'a, SimTransceiver<'e>>, buffer: ReadBuffer<'a>, length: usize) {
        self.requests.push(buffer.as_slice()[..length].to_vec());
        self.anchors.push(radio.anchor());
        self.request_air_time = Ble1M::air_time(length);
        self.buffer = Some(buffer);
        radio
            .schedule_transmit(hop(self.event), WriteBuffer::new(self.response), self.request_air_time + T_IFS)
            .unwrap();
    }

    fn on_timeout(&mut self, _: &mut Scheduler<'a, SimTransceiver<'e>>, buffer: ReadBuffer<'a>) {
        self.timeouts += 1;
        self.buffer = Some(buffer);
    }
}

/// End of the time an armed primitive keeps the radio busy.
fn busy_until(arming: &Arming) -> Instant {
    match *arming {
        Arming::Transmit { at, len, .. } => at + Ble1M::air_time(len),
        Arming::Receive { closes, .. } => closes,
    }
}

#[test]
fn connection_events_chain_on_their_anchors() {
    const EVENTS: u8 = 10;
    let request = [0x0Eu8, 0x04, 0xDE, 0xAD, 0xBE, 0xEF];
    let response = [0x05u8, 0x00];
    let interval = DeltaTime::millis(7) + us(500);
    let mut central_area = [0u8; 32];
    let mut peripheral_area = [0u8; 32];
    let ether: Ether = Ether::default();

    let mut central: SimRadio<Central> =
        ScheduledRadio::new(ether.transceiver(), Central::new(&request, interval, EVENTS)).unwrap();
    let widening = us(50);
    let mut peripheral: SimRadio<Peripheral> = ScheduledRadio::new(
        ether.transceiver(),
        Peripheral {
            response: &response,
            interval,
            widening,
            event: 0,
            events: EVENTS,
            request_air_time: DeltaTime::zero(),
            requests: Vec::new(),
            anchors: Vec::new(),
            timeouts: 0,
            buffer: None,
        },
    )
    .unwrap();

    central
        .schedule_transmit_and_receive(
            hop(0),
            WriteBuffer::new(&request),
            interval,
            ReadBuffer::new(&mut central_area),
            us(200),
        )
        .unwrap();
    peripheral
        .schedule_receive(hop(0), interval - widening, ReadBuffer::new(&mut peripheral_area), widening + widening)
        .unwrap();
    settle_pair(&ether, &mut central, &mut peripheral);

    let c = central.callbacks();
    let p = peripheral.callbacks();
    assert_eq!(c.timeouts, 0);
    assert_eq!(p.timeouts, 0);
    assert_eq!(c.responses, vec![response.to_vec(); EVENTS as usize]);
    assert_eq!(p.requests, vec![request.to_vec(); EVENTS as usize]);
    assert!(c.parked.is_some());

    let expected: Vec<Instant> = (1..=EVENTS as u32)
        .map(|k| at(k * interval.as_micros() as u32))
        .collect();
    assert_eq!(c.anchors, expected);
    assert_eq!(p.anchors, expected);

    for armings in [central.transceiver().armings(), peripheral.transceiver().armings()] {
        assert_eq!(armings.len(), 2 * EVENTS as usize);
        for pair in armings.windows(2) {
            let (earlier, later) = (&pair[0], &pair[1]);
            let start = match *later {
                Arming::Transmit { at, .. } => at,
                Arming::Receive { opens, .. } => opens,
            };
            assert!(start >= busy_until(earlier), "{earlier:?} overlaps {later:?}");
        }
    }

    // the response starts exactly one inter frame space after the request ended
    let first_response = peripheral.transceiver().armings()[1];
    let Arming::Transmit { at: response_start, .. } = first_response else {
        panic!("expected a transmission, got {first_response:?}");
    };
    let request_end = at(interval.as_micros() as u32) + Ble1M::air_time(request.len());
    assert_eq!(DeltaTime::between(request_end, response_start), T_IFS);
}
