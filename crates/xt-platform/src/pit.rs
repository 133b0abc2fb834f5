//! View of the 8253/8254 programmable interval timer as seen by the PPI and
//! the PC speaker.
//!
//! Channel 2 drives the speaker. Its gate input is wired to PPI port B bit 0
//! and its output can be read back on PPI port C bit 5.

pub const PIT_INPUT_HZ: u64 = 1_193_182;

/// PIT channel used for the speaker tone.
pub const SPEAKER_CHANNEL: u8 = 2;

/// Snapshot of one PIT channel, taken at the moment of the call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelState {
    /// Programmed counter mode (0..=5).
    pub mode: u8,
    /// Reload value latched for the channel.
    pub counter: u16,
    /// Level of the channel's OUT pin.
    pub output: bool,
    /// Instantaneous level the timer reports for one-shot modes (0 and 4), where
    /// the output is used as a crude DAC rather than a square wave.
    pub raw_level: i32,
}

impl ChannelState {
    /// Modes 0 and 4 are one-shot; software uses them for PWM-style sample playback.
    pub fn is_one_shot(&self) -> bool {
        matches!(self.mode, 0 | 4)
    }
}

/// Interface to the interval timer consumed by the XT devices.
///
/// Methods take `&self` so that a single timer can be shared between the
/// emulation thread (gate writes from port 0x61) and an audio pull context.
pub trait PitChannels: Send + Sync {
    fn read_channel_state(&self, channel: u8) -> ChannelState;
    fn set_gate(&self, channel: u8, level: bool);
}
