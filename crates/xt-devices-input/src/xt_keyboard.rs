//! PC/XT keyboard interface behind the 8255 PPI.
//!
//! The XT keyboard has no controller of its own: the keyboard's serial data is
//! shifted into PPI port A (I/O port 0x60) and the keyboard clock/clear lines
//! are driven from port B (0x61). Port B is shared with the PC speaker, and port
//! C (0x62) reads back the DIP switches, selected a nibble at a time by port B.
//!
//! Bytes travel one at a time:
//! 1. a poll pops the next queued byte and stages it (`want_irq`);
//! 2. the following poll latches it into port A and raises IRQ 1 (`blocked`);
//! 3. the guest reads port 0x60, then pulses port B bit 7, which clears port A,
//!    lowers the IRQ and lets the next byte through.

use std::sync::Arc;

use bitflags::bitflags;
use thiserror::Error;
use xt_audio::speaker::lock_speaker;
use xt_audio::{SharedSpeaker, SoundTimeline};
use xt_platform::pit::{PitChannels, SPEAKER_CHANNEL};
use xt_platform::IrqSink;

use crate::config::{XtKeyboardConfig, MAX_FLOPPY_DRIVES};
use crate::feed::KeyFeed;
use crate::queue::KeyChannel;
use crate::variant::{compute_dip, MachineVariant};

pub const KEYBOARD_IRQ: u8 = 1;

pub const PORT_DATA: u16 = 0x60;
pub const PORT_CONTROL: u16 = 0x61;
pub const PORT_SWITCHES: u16 = 0x62;
pub const PORT_SWITCHES_HIGH: u16 = 0x63;

/// First port of the PPI window and its length.
pub const PORT_BASE: u16 = PORT_DATA;
pub const PORT_COUNT: u16 = 4;

/// Virtual-time interval between keyboard polls.
pub const POLL_INTERVAL_NS: u64 = 1_000_000;

/// Sent by the keyboard after its clock line is re-enabled.
pub const SELF_TEST_PASSED: u8 = 0xAA;

const PORT_C_TIMER2_OUT: u8 = 0x20;
const PORT_C_EEPROM_DATA: u8 = 0x10;

bitflags! {
    /// PPI port B (0x61) as seen by the keyboard and speaker.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortB: u8 {
        const TIMER2_GATE = 0x01;
        const SPEAKER_DATA = 0x02;
        /// PC 1982 planar: low memory nibble on port C.
        const SW_SELECT_LOW = 0x04;
        /// XT: high switch nibble on port C.
        const SW_SELECT_HIGH = 0x08;
        const KBD_CLOCK_ENABLE = 0x40;
        const KBD_CLEAR = 0x80;
    }
}

/// Serial EEPROM of the Tandy 1000, read back on port C bit 4.
pub trait TandyEeprom {
    fn data_out(&mut self) -> bool;
}

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
    #[error("invalid keyboard configuration: {0}")]
    InvalidConfig(String),
}

/// Collaborators the controller is wired to at attach time.
#[derive(Default)]
pub struct KeyboardWiring {
    pub irq: Option<Box<dyn IrqSink>>,
    pub pit: Option<Arc<dyn PitChannels>>,
    pub speaker: Option<(SharedSpeaker, SoundTimeline)>,
    pub eeprom: Option<Box<dyn TandyEeprom>>,
}

impl KeyboardWiring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_irq(mut self, irq: Box<dyn IrqSink>) -> Self {
        self.irq = Some(irq);
        self
    }

    pub fn with_pit(mut self, pit: Arc<dyn PitChannels>) -> Self {
        self.pit = Some(pit);
        self
    }

    pub fn with_speaker(mut self, speaker: SharedSpeaker, timeline: SoundTimeline) -> Self {
        self.speaker = Some((speaker, timeline));
        self
    }

    pub fn with_eeprom(mut self, eeprom: Box<dyn TandyEeprom>) -> Self {
        self.eeprom = Some(eeprom);
        self
    }
}

pub struct XtKeyboard {
    config: XtKeyboardConfig,

    pa: u8,
    pb: u8,
    pd: u8,
    key_waiting: u8,
    want_irq: bool,
    blocked: bool,
    irq_level: bool,
    attached: bool,

    channel: Arc<KeyChannel>,
    irq: Box<dyn IrqSink>,
    pit: Arc<dyn PitChannels>,
    speaker: SharedSpeaker,
    timeline: SoundTimeline,
    eeprom: Option<Box<dyn TandyEeprom>>,
}

impl XtKeyboard {
    pub fn new(config: XtKeyboardConfig, wiring: KeyboardWiring) -> Result<Self, AttachError> {
        if config.floppy_drives > MAX_FLOPPY_DRIVES {
            return Err(AttachError::InvalidConfig(format!(
                "{} floppy drives, at most {MAX_FLOPPY_DRIVES} can be strapped",
                config.floppy_drives
            )));
        }

        let irq = wiring.irq.ok_or(AttachError::MissingCollaborator("IRQ sink"))?;
        let pit = wiring.pit.ok_or(AttachError::MissingCollaborator("PIT"))?;
        let (speaker, timeline) = wiring
            .speaker
            .ok_or(AttachError::MissingCollaborator("PC speaker"))?;
        let eeprom = wiring.eeprom;
        if config.variant.is_tandy() && eeprom.is_none() {
            return Err(AttachError::MissingCollaborator("Tandy EEPROM"));
        }

        let pd = if config.variant.has_dip_switches() {
            compute_dip(
                config.variant,
                config.floppy_drives,
                config.video,
                config.memory_kib,
            )
        } else {
            0
        };

        let mut kbd = Self {
            config,
            pa: 0,
            pb: 0,
            pd,
            key_waiting: 0,
            want_irq: false,
            blocked: false,
            irq_level: false,
            attached: true,
            channel: Arc::new(KeyChannel::new()),
            irq,
            pit,
            speaker,
            timeline,
            eeprom,
        };
        kbd.reset();

        tracing::debug!(
            variant = kbd.config.variant.name(),
            "XT keyboard: attached, pd={:02X}",
            kbd.pd
        );
        Ok(kbd)
    }

    pub fn config(&self) -> &XtKeyboardConfig {
        &self.config
    }

    pub fn variant(&self) -> MachineVariant {
        self.config.variant
    }

    pub fn pa(&self) -> u8 {
        self.pa
    }

    pub fn pb(&self) -> u8 {
        self.pb
    }

    pub fn pd(&self) -> u8 {
        self.pd
    }

    pub fn key_waiting(&self) -> u8 {
        self.key_waiting
    }

    pub fn want_irq(&self) -> bool {
        self.want_irq
    }

    pub fn blocked(&self) -> bool {
        self.blocked
    }

    /// Level this controller is currently driving on IRQ 1.
    pub fn irq_asserted(&self) -> bool {
        self.irq_level
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_scanning(&self) -> bool {
        self.channel.is_scanning()
    }

    pub fn speaker(&self) -> SharedSpeaker {
        self.speaker.clone()
    }

    /// Bytes waiting to be delivered, oldest first.
    pub fn queue_snapshot(&self) -> Vec<u8> {
        self.channel.lock().iter().collect()
    }

    /// Registers the host key feed. Returns `None` while another feed is live
    /// or after detach.
    pub fn connect_feed(&self) -> Option<KeyFeed> {
        if !self.attached || !self.channel.claim_feed() {
            return None;
        }
        Some(KeyFeed::new(
            self.channel.clone(),
            self.config.fake_shift_grey_keys,
        ))
    }

    pub fn feed_connected(&self) -> bool {
        self.channel.feed_registered()
    }

    pub fn reset(&mut self) {
        self.want_irq = false;
        self.set_blocked(false);
        self.pa = 0;
        self.pb = 0;
        if self.attached {
            self.channel.set_scanning(true);
        }
        self.channel.clear();
        lock_speaker(&self.speaker).reset();
        self.pit.set_gate(SPEAKER_CHANNEL, false);
        tracing::debug!("XT keyboard: reset");
    }

    /// Tears the controller down. Safe to call more than once.
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        self.channel.set_scanning(false);
        self.channel.set_connected(false);
        self.channel.clear();
        self.want_irq = false;
        self.set_blocked(false);
        tracing::debug!("XT keyboard: detached");
    }

    /// One keyboard clock tick: moves at most one byte along the handshake.
    pub fn poll(&mut self) {
        if !self.attached {
            return;
        }
        // The Tandy keyboard keeps clocking regardless of port B.
        if !self.port_b().contains(PortB::KBD_CLOCK_ENABLE) && !self.config.variant.is_tandy() {
            return;
        }

        if self.want_irq {
            self.want_irq = false;
            self.pa = self.key_waiting;
            self.set_blocked(true);
            tracing::trace!("XT keyboard: delivering {:02X} on IRQ 1", self.pa);
        } else if !self.blocked {
            if let Some(byte) = self.channel.pop() {
                self.key_waiting = byte;
                self.want_irq = true;
                tracing::trace!("XT keyboard: staged {byte:02X}");
            }
        }
    }

    pub fn read_port(&mut self, port: u16) -> u8 {
        match port {
            PORT_DATA => self.read_data(),
            PORT_CONTROL => self.pb,
            PORT_SWITCHES => self.read_switches(),
            PORT_SWITCHES_HIGH if self.config.variant.is_xt() => self.pd,
            _ => 0xFF,
        }
    }

    /// Only port B is writable; ports A and C are inputs.
    pub fn write_port(&mut self, port: u16, value: u8) {
        match port {
            PORT_CONTROL => self.write_control(value),
            _ => tracing::trace!("XT keyboard: ignoring write {value:02X} to port {port:#06x}"),
        }
    }

    fn port_b(&self) -> PortB {
        PortB::from_bits_retain(self.pb)
    }

    fn read_data(&self) -> u8 {
        if self.port_b().contains(PortB::KBD_CLEAR) {
            if self.config.variant.is_pc() {
                return self.pd;
            }
            if self.config.variant.is_xt() {
                return 0xFF;
            }
        }
        self.pa
    }

    fn read_switches(&mut self) -> u8 {
        let pb = self.port_b();
        let mem = i64::from(self.config.memory_kib);

        let mut ret = match self.config.variant.type_code() {
            0 => 0,
            1 => {
                let banks = (mem - 64) / 32;
                if pb.contains(PortB::SW_SELECT_LOW) {
                    (banks & 0x0F) as u8
                } else {
                    (banks >> 4) as u8
                }
            }
            5 => {
                if pb.contains(PortB::SW_SELECT_HIGH) {
                    self.pd >> 4
                } else if mem == 512 {
                    0x0D
                } else {
                    0x0C
                }
            }
            _ => {
                if pb.contains(PortB::SW_SELECT_HIGH) {
                    self.pd >> 4
                } else {
                    self.pd & 0x0F
                }
            }
        };

        if self.pit.read_channel_state(SPEAKER_CHANNEL).output {
            ret |= PORT_C_TIMER2_OUT;
        }
        if self.config.variant.is_tandy() {
            if let Some(eeprom) = self.eeprom.as_mut() {
                if eeprom.data_out() {
                    ret |= PORT_C_EEPROM_DATA;
                }
            }
        }
        ret
    }

    fn write_control(&mut self, value: u8) {
        let old = self.port_b();
        let new = PortB::from_bits_retain(value);

        if !old.contains(PortB::KBD_CLOCK_ENABLE) && new.contains(PortB::KBD_CLOCK_ENABLE) {
            self.want_irq = false;
            self.set_blocked(false);
            self.channel.restart_with(SELF_TEST_PASSED);
        }

        self.pb = value;

        let gate = new.contains(PortB::TIMER2_GATE);
        {
            let ch2 = self.pit.read_channel_state(SPEAKER_CHANNEL);
            let mut speaker = lock_speaker(&self.speaker);
            speaker.advance(self.timeline.position(), ch2);
            speaker.set_control(gate, new.contains(PortB::SPEAKER_DATA));
        }
        self.pit.set_gate(SPEAKER_CHANNEL, gate);

        if new.contains(PortB::KBD_CLEAR) {
            self.pa = 0;
            self.set_blocked(false);
        }
    }

    fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
        if blocked && !self.irq_level {
            self.irq.raise_irq(KEYBOARD_IRQ);
            self.irq_level = true;
        } else if !blocked && self.irq_level {
            self.irq.lower_irq(KEYBOARD_IRQ);
            self.irq_level = false;
        }
    }
}

impl Drop for XtKeyboard {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Mutex;

    use xt_audio::PcSpeaker;
    use xt_platform::ChannelState;

    use crate::feed::KeyDirection;
    use crate::variant::VideoAdapter;

    #[derive(Clone, Default)]
    struct IrqLog(Rc<RefCell<Vec<(u8, bool)>>>);

    impl IrqSink for IrqLog {
        fn raise_irq(&mut self, irq: u8) {
            self.0.borrow_mut().push((irq, true));
        }

        fn lower_irq(&mut self, irq: u8) {
            self.0.borrow_mut().push((irq, false));
        }
    }

    #[derive(Default)]
    struct StubPit {
        ch2: Mutex<ChannelState>,
        gate: Mutex<Option<bool>>,
    }

    impl PitChannels for StubPit {
        fn read_channel_state(&self, _channel: u8) -> ChannelState {
            *self.ch2.lock().unwrap()
        }

        fn set_gate(&self, _channel: u8, level: bool) {
            *self.gate.lock().unwrap() = Some(level);
        }
    }

    fn attach(config: XtKeyboardConfig) -> (XtKeyboard, IrqLog, Arc<StubPit>) {
        let irqs = IrqLog::default();
        let pit = Arc::new(StubPit::default());
        let kbd = XtKeyboard::new(
            config,
            KeyboardWiring::new()
                .with_irq(Box::new(irqs.clone()))
                .with_pit(pit.clone())
                .with_speaker(PcSpeaker::new().shared(), SoundTimeline::new()),
        )
        .unwrap();
        (kbd, irqs, pit)
    }

    #[test]
    fn missing_irq_sink_fails_attach() {
        let err = XtKeyboard::new(
            XtKeyboardConfig::default(),
            KeyboardWiring::new()
                .with_pit(Arc::new(StubPit::default()))
                .with_speaker(PcSpeaker::new().shared(), SoundTimeline::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AttachError::MissingCollaborator("IRQ sink")));
    }

    #[test]
    fn too_many_floppies_is_rejected() {
        let err = XtKeyboard::new(
            XtKeyboardConfig::default().with_floppy_drives(5),
            KeyboardWiring::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AttachError::InvalidConfig(_)));
    }

    #[test]
    fn tandy_requires_an_eeprom() {
        let err = XtKeyboard::new(
            XtKeyboardConfig::new(MachineVariant::Tandy1000),
            KeyboardWiring::new()
                .with_irq(Box::new(IrqLog::default()))
                .with_pit(Arc::new(StubPit::default()))
                .with_speaker(PcSpeaker::new().shared(), SoundTimeline::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AttachError::MissingCollaborator("Tandy EEPROM")));
    }

    #[test]
    fn handshake_delivers_one_byte_per_ack() {
        let (mut kbd, irqs, _pit) = attach(XtKeyboardConfig::default());
        kbd.write_port(PORT_CONTROL, 0x40);
        assert_eq!(kbd.queue_snapshot(), vec![SELF_TEST_PASSED]);

        kbd.poll();
        assert!(kbd.want_irq());
        assert!(irqs.0.borrow().is_empty());

        kbd.poll();
        assert!(kbd.blocked());
        assert_eq!(kbd.read_port(PORT_DATA), 0xAA);
        assert_eq!(&*irqs.0.borrow(), &[(1, true)]);

        let mut feed = kbd.connect_feed().unwrap();
        feed.feed(0x1E, KeyDirection::Make).unwrap();

        // Still blocked: the byte stays queued.
        kbd.poll();
        kbd.poll();
        assert_eq!(kbd.queue_snapshot(), vec![0x1E]);
        assert_eq!(kbd.read_port(PORT_DATA), 0xAA);

        kbd.write_port(PORT_CONTROL, 0xC0);
        kbd.write_port(PORT_CONTROL, 0x40);
        assert_eq!(kbd.pa(), 0);
        assert!(!kbd.blocked());
        assert_eq!(&*irqs.0.borrow(), &[(1, true), (1, false)]);

        kbd.poll();
        kbd.poll();
        assert_eq!(kbd.read_port(PORT_DATA), 0x1E);
    }

    #[test]
    fn clock_disabled_stops_polling() {
        let (mut kbd, _irqs, _pit) = attach(XtKeyboardConfig::default());
        let mut feed = kbd.connect_feed().unwrap();
        feed.feed(0x10, KeyDirection::Make).unwrap();
        for _ in 0..4 {
            kbd.poll();
        }
        assert!(!kbd.want_irq());
        assert_eq!(kbd.queue_snapshot(), vec![0x10]);
    }

    #[test]
    fn port_b_drives_timer_gate() {
        let (mut kbd, _irqs, pit) = attach(XtKeyboardConfig::default());
        kbd.write_port(PORT_CONTROL, 0x03);
        assert_eq!(*pit.gate.lock().unwrap(), Some(true));
        assert_eq!(kbd.read_port(PORT_CONTROL), 0x03);
        let speaker = kbd.speaker();
        assert!(lock_speaker(&speaker).gated());
        assert!(lock_speaker(&speaker).enabled());

        kbd.write_port(PORT_CONTROL, 0x02);
        assert_eq!(*pit.gate.lock().unwrap(), Some(false));
    }

    #[test]
    fn reset_silences_speaker_and_drops_timer_gate() {
        let (mut kbd, _irqs, pit) = attach(XtKeyboardConfig::default());
        kbd.write_port(PORT_CONTROL, 0x03);
        kbd.reset();

        assert_eq!(kbd.pb(), 0);
        assert_eq!(*pit.gate.lock().unwrap(), Some(false));
        let speaker = kbd.speaker();
        let speaker = lock_speaker(&speaker);
        assert!(!speaker.gated());
        assert!(!speaker.enabled());
        assert!(!speaker.was_enabled());
    }

    #[test]
    fn port_c_reflects_timer2_output() {
        let (mut kbd, _irqs, pit) = attach(
            XtKeyboardConfig::new(MachineVariant::Xt1986)
                .with_floppy_drives(0)
                .with_video(VideoAdapter::Mda),
        );
        assert_eq!(kbd.read_port(PORT_SWITCHES), 0x0D);
        pit.ch2.lock().unwrap().output = true;
        assert_eq!(kbd.read_port(PORT_SWITCHES), 0x2D);
    }

    #[test]
    fn second_feed_is_refused_until_first_drops() {
        let (kbd, _irqs, _pit) = attach(XtKeyboardConfig::default());
        let feed = kbd.connect_feed().unwrap();
        assert!(kbd.connect_feed().is_none());
        assert!(kbd.feed_connected());
        drop(feed);
        assert!(!kbd.feed_connected());
        assert!(kbd.connect_feed().is_some());
    }
}
