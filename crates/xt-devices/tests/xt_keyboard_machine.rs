use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use xt_audio::speaker::SPEAKER_LEVEL_FULL;
use xt_audio::{Mixer, PcSpeaker, SharedSpeaker, SoundTimeline, SpeakerOutput};
use xt_devices::{DeviceAttachError, DeviceTimer, XtKeyboardPorts};
use xt_devices_input::{
    FeedError, KeyDirection, KeyboardWiring, XtKeyboardConfig, POLL_INTERVAL_NS,
};
use xt_platform::{
    ChannelState, IoBusError, IoPortBus, IrqSink, PitChannels, PortIoDevice, TimerQueue,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

#[derive(Clone, Default)]
struct TestPic {
    irq1: Rc<RefCell<bool>>,
}

impl IrqSink for TestPic {
    fn raise_irq(&mut self, irq: u8) {
        if irq == 1 {
            *self.irq1.borrow_mut() = true;
        }
    }

    fn lower_irq(&mut self, irq: u8) {
        if irq == 1 {
            *self.irq1.borrow_mut() = false;
        }
    }
}

/// Channel 2 programmed for a square wave whose output is currently high.
#[derive(Default)]
struct TestPit {
    gate: Mutex<bool>,
}

impl PitChannels for TestPit {
    fn read_channel_state(&self, _channel: u8) -> ChannelState {
        ChannelState {
            mode: 3,
            counter: 0x0533,
            output: true,
            raw_level: 0,
        }
    }

    fn set_gate(&self, _channel: u8, level: bool) {
        *self.gate.lock().unwrap() = level;
    }
}

struct Machine {
    bus: Rc<RefCell<IoPortBus>>,
    timers: Rc<RefCell<TimerQueue<DeviceTimer>>>,
    pic: TestPic,
    pit: Arc<TestPit>,
    speaker: SharedSpeaker,
    timeline: SoundTimeline,
    now_ns: u64,
}

impl Machine {
    fn new() -> Self {
        Self {
            bus: Rc::new(RefCell::new(IoPortBus::new())),
            timers: Rc::new(RefCell::new(TimerQueue::new())),
            pic: TestPic::default(),
            pit: Arc::new(TestPit::default()),
            speaker: PcSpeaker::new().shared(),
            timeline: SoundTimeline::new(),
            now_ns: 0,
        }
    }

    fn with_timeline(timeline: SoundTimeline) -> Self {
        Self {
            timeline,
            ..Self::new()
        }
    }

    fn wiring(&self) -> KeyboardWiring {
        KeyboardWiring::new()
            .with_irq(Box::new(self.pic.clone()))
            .with_pit(self.pit.clone())
            .with_speaker(self.speaker.clone(), self.timeline.clone())
    }

    fn attach(&self, config: XtKeyboardConfig) -> Result<XtKeyboardPorts, DeviceAttachError> {
        XtKeyboardPorts::attach(
            config,
            self.wiring(),
            self.bus.clone(),
            self.timers.clone(),
            self.now_ns,
        )
    }

    /// Advances virtual time, delivering due timers and servicing IRQ 1 the way
    /// the BIOS INT 9 handler does. Returns the bytes the "guest" received.
    fn run_until(&mut self, kbd: &mut XtKeyboardPorts, until_ns: u64) -> Vec<u8> {
        let mut received = Vec::new();
        loop {
            let event = self.timers.borrow_mut().pop_due(until_ns);
            let Some(event) = event else { break };
            self.now_ns = event.deadline_ns;
            kbd.handle_timer_event(event.id, event.deadline_ns);

            if *self.pic.irq1.borrow() {
                let mut bus = self.bus.borrow_mut();
                received.push(bus.read_u8(0x60));
                let pb = bus.read_u8(0x61);
                bus.write_u8(0x61, pb | 0x80);
                bus.write_u8(0x61, pb);
            }
        }
        self.now_ns = until_ns;
        received
    }
}

#[test]
fn bios_sees_self_test_then_keys() {
    init_tracing();
    let mut m = Machine::new();
    let config: XtKeyboardConfig =
        serde_json::from_str(r#"{ "variant": "xt-1986", "floppy_drives": 2, "video": "mda" }"#)
            .unwrap();
    let mut kbd = m.attach(config).unwrap();

    // POST: clock low, then high again.
    m.bus.borrow_mut().write_u8(0x61, 0x0C);
    m.bus.borrow_mut().write_u8(0x61, 0x4C);
    assert_eq!(m.run_until(&mut kbd, 10 * POLL_INTERVAL_NS), vec![0xAA]);

    let mut feed = kbd.key_feed().unwrap();
    feed.feed(0x1C, KeyDirection::Make).unwrap();
    feed.feed(0x1C, KeyDirection::Break).unwrap();
    assert_eq!(m.run_until(&mut kbd, 20 * POLL_INTERVAL_NS), vec![0x1C, 0x9C]);

    // XT-1986, two drives, MDA, 640K.
    let mut bus = m.bus.borrow_mut();
    bus.write_u8(0x61, 0x48);
    assert_eq!(bus.read_u8(0x62) & 0x0F, 0x07);
    bus.write_u8(0x61, 0x40);
    assert_eq!(bus.read_u8(0x62) & 0x0F, 0x0D);
    assert_eq!(bus.read_u8(0x63), 0x7D);
}

#[test]
fn each_byte_takes_two_polls() {
    let mut m = Machine::new();
    let mut kbd = m.attach(XtKeyboardConfig::default()).unwrap();
    m.bus.borrow_mut().write_u8(0x61, 0x40);

    assert!(m.run_until(&mut kbd, POLL_INTERVAL_NS).is_empty());
    assert!(kbd.controller().borrow().want_irq());
    assert_eq!(m.run_until(&mut kbd, 2 * POLL_INTERVAL_NS), vec![0xAA]);
}

#[test]
fn overlapping_window_fails_attach_cleanly() {
    struct Stub;
    impl PortIoDevice for Stub {
        fn read(&mut self, _port: u16, _size: u8) -> u32 {
            0x12
        }
        fn write(&mut self, _port: u16, _size: u8, _value: u32) {}
    }

    let m = Machine::new();
    m.bus
        .borrow_mut()
        .register_range(0x62, 1, Box::new(Stub))
        .unwrap();

    let err = m.attach(XtKeyboardConfig::default()).err().unwrap();
    assert!(matches!(
        err,
        DeviceAttachError::Bus(IoBusError::Overlap { start: 0x60, .. })
    ));
    assert!(m.timers.borrow().is_empty());
    assert!(!m.bus.borrow().is_mapped(0x60));
    assert_eq!(m.bus.borrow_mut().read_u8(0x62), 0x12);
}

#[test]
fn missing_collaborator_fails_attach() {
    let m = Machine::new();
    let err = XtKeyboardPorts::attach(
        XtKeyboardConfig::default(),
        KeyboardWiring::new(),
        m.bus.clone(),
        m.timers.clone(),
        0,
    )
    .err()
    .unwrap();
    assert!(matches!(err, DeviceAttachError::Keyboard(_)));
    assert!(!m.bus.borrow().is_mapped(0x61));
}

#[test]
fn detach_releases_ports_and_timer() {
    let mut m = Machine::new();
    let mut kbd = m.attach(XtKeyboardConfig::default()).unwrap();
    let mut feed = kbd.key_feed().unwrap();
    assert!(m.bus.borrow().is_mapped(0x60));
    assert_eq!(m.timers.borrow().len(), 1);

    kbd.detach();
    kbd.detach();
    assert!(!kbd.is_attached());
    assert!(m.timers.borrow().is_empty());
    assert_eq!(m.bus.borrow_mut().read_u8(0x60), 0xFF);
    assert_eq!(m.bus.borrow_mut().read_u8(0x61), 0xFF);
    assert_eq!(feed.feed(0x1E, KeyDirection::Make), Err(FeedError::Detached));
    assert!(m.run_until(&mut kbd, 5 * POLL_INTERVAL_NS).is_empty());
}

#[test]
fn dropping_the_device_detaches() {
    let m = Machine::new();
    let kbd = m.attach(XtKeyboardConfig::default()).unwrap();
    drop(kbd);
    assert!(m.timers.borrow().is_empty());
    assert!(!m.bus.borrow().is_mapped(0x63));

    // The window is free for a fresh attach.
    let _kbd = m.attach(XtKeyboardConfig::default()).unwrap();
}

#[test]
fn poll_rearms_from_previous_deadline() {
    let m = Machine::new();
    let mut kbd = m.attach(XtKeyboardConfig::default()).unwrap();

    // Machine loop runs late: the event fires at 5 ms but was due at 1 ms.
    let event = m.timers.borrow_mut().pop_due(5 * POLL_INTERVAL_NS).unwrap();
    assert_eq!(event.deadline_ns, POLL_INTERVAL_NS);
    assert!(kbd.handle_timer_event(event.id, event.deadline_ns));
    assert_eq!(
        m.timers.borrow().next_deadline_ns(),
        Some(2 * POLL_INTERVAL_NS)
    );
    assert_eq!(kbd.poll_timer(), Some(m.timers.borrow_mut().pop_due(u64::MAX).unwrap().id));
}

#[test]
fn foreign_timers_are_ignored() {
    let m = Machine::new();
    let mut kbd = m.attach(XtKeyboardConfig::default()).unwrap();
    let other = m
        .timers
        .borrow_mut()
        .schedule(0, DeviceTimer::KeyboardPoll);
    assert!(!kbd.handle_timer_event(other, 0));
    assert_eq!(m.timers.borrow().len(), 2);
}

#[test]
fn bus_reset_resets_the_controller() {
    let mut m = Machine::new();
    let mut kbd = m.attach(XtKeyboardConfig::default()).unwrap();
    m.bus.borrow_mut().write_u8(0x61, 0x40);
    m.run_until(&mut kbd, POLL_INTERVAL_NS);
    assert!(kbd.controller().borrow().want_irq());

    m.bus.borrow_mut().reset();
    let ctrl = kbd.controller();
    let ctrl = ctrl.borrow();
    assert_eq!(ctrl.pb(), 0);
    assert!(!ctrl.want_irq());
    assert!(ctrl.queue_snapshot().is_empty());
}

#[test]
fn speaker_follows_port_b_mid_period() {
    let mut mixer = Mixer::new(960);
    let timeline = mixer.timeline();
    let m = Machine::with_timeline(timeline.clone());
    let _kbd = m.attach(XtKeyboardConfig::default()).unwrap();
    mixer.register_producer(Box::new(SpeakerOutput::new(
        m.speaker.clone(),
        m.pit.clone(),
        timeline.clone(),
    )));

    timeline.set_position(480);
    m.bus.borrow_mut().write_u8(0x61, 0x03);
    assert!(*m.pit.gate.lock().unwrap());

    let out = mixer.render_period();
    assert_eq!(out.len(), 960 * 2);
    assert!(out[..480 * 2].iter().all(|&s| s == 0));
    assert!(out[480 * 2..].iter().all(|&s| s == SPEAKER_LEVEL_FULL));

    // Gate and enable dropped at the start of the next period; the latch
    // carries the enable for exactly one more sample.
    m.bus.borrow_mut().write_u8(0x61, 0x00);
    assert!(!*m.pit.gate.lock().unwrap());
    let out = mixer.render_period();
    assert_eq!(&out[..2], &[SPEAKER_LEVEL_FULL, SPEAKER_LEVEL_FULL]);
    assert!(out[2..].iter().all(|&s| s == 0));
}

proptest! {
    #[test]
    fn one_poll_per_interval(steps in proptest::collection::vec(1u64..5_000_000, 1..40)) {
        let m = Machine::new();
        let mut kbd = m.attach(XtKeyboardConfig::default()).unwrap();
        let mut polls = 0u64;
        let mut now = 0u64;
        for step in steps {
            now += step;
            loop {
                let event = m.timers.borrow_mut().pop_due(now);
                let Some(event) = event else { break };
                prop_assert!(kbd.handle_timer_event(event.id, event.deadline_ns));
                polls += 1;
            }
        }
        prop_assert_eq!(polls, now / POLL_INTERVAL_NS);
        prop_assert_eq!(m.timers.borrow().len(), 1);
    }
}
