//! PC speaker waveform generator.
//!
//! The speaker has two control inputs, both driven from PPI port B:
//! - bit 0 gates PIT channel 2 (the tone generator);
//! - bit 1 enables the speaker data line.
//!
//! Samples are generated lazily: whenever the control bits change, the speaker
//! is first brought up to the current [`SoundTimeline`] position using the old
//! state, so a mid-period write only affects the samples after it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use xt_platform::pit::{ChannelState, PitChannels, SPEAKER_CHANNEL};

use crate::sink::{AudioProducer, SoundTimeline};
use crate::SOUND_BUFFER_FRAMES;

pub const SPEAKER_LEVEL_FULL: i32 = 0x1400;
pub const SPEAKER_LEVEL_MID: i32 = 0x0A00;

/// Reload values below this are above the audible range; the speaker cone just
/// sits at its midpoint.
const ULTRASONIC_RELOAD: u16 = 0x40;

pub type SharedSpeaker = Arc<Mutex<PcSpeaker>>;

/// Locks a shared speaker, recovering the guard if a previous holder panicked.
///
/// Every mutation leaves the speaker consistent sample by sample, so the state
/// behind a poisoned lock is still usable.
pub fn lock_speaker(speaker: &SharedSpeaker) -> MutexGuard<'_, PcSpeaker> {
    speaker.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct PcSpeaker {
    gated: bool,
    enabled: bool,
    /// Set whenever the enable bit is written high; cleared one sample after the
    /// enable bit goes low. Keeps a short self-test beep audible even if the
    /// BIOS toggles the enable bit faster than one sample.
    was_enabled: bool,
    muted: bool,
    buffer: Vec<i32>,
    pos: usize,
}

impl PcSpeaker {
    pub fn new() -> Self {
        Self::with_buffer_frames(SOUND_BUFFER_FRAMES)
    }

    pub fn with_buffer_frames(frames: usize) -> Self {
        Self {
            gated: false,
            enabled: false,
            was_enabled: false,
            muted: false,
            buffer: vec![0; frames],
            pos: 0,
        }
    }

    pub fn shared(self) -> SharedSpeaker {
        Arc::new(Mutex::new(self))
    }

    /// Back to power-on state. Mute is a host preference and survives resets.
    pub fn reset(&mut self) {
        self.gated = false;
        self.enabled = false;
        self.was_enabled = false;
        self.buffer.fill(0);
        self.pos = 0;
    }

    pub fn gated(&self) -> bool {
        self.gated
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn was_enabled(&self) -> bool {
        self.was_enabled
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Number of samples already generated in the current period.
    pub fn cursor(&self) -> usize {
        self.pos
    }

    pub fn buffer_frames(&self) -> usize {
        self.buffer.len()
    }

    /// Applies new gate/enable inputs from PPI port B.
    pub fn set_control(&mut self, gated: bool, enabled: bool) {
        self.gated = gated;
        self.enabled = enabled;
        if enabled {
            self.was_enabled = true;
        }
    }

    /// Generates samples from the cursor up to `up_to` (exclusive, clamped to the buffer).
    pub fn advance(&mut self, up_to: usize, ch2: ChannelState) {
        let up_to = up_to.min(self.buffer.len());
        while self.pos < up_to {
            let val = if self.gated && self.was_enabled {
                if ch2.is_one_shot() {
                    ch2.raw_level
                } else if ch2.counter < ULTRASONIC_RELOAD {
                    SPEAKER_LEVEL_MID
                } else if ch2.output {
                    SPEAKER_LEVEL_FULL
                } else {
                    0
                }
            } else if self.was_enabled {
                SPEAKER_LEVEL_FULL
            } else {
                0
            };

            if !self.enabled {
                self.was_enabled = false;
            }

            self.buffer[self.pos] = val;
            self.pos += 1;
        }
    }

    /// Returns the first `count` samples of the period and rewinds the cursor.
    ///
    /// Samples past the cursor are whatever the previous period left there; callers
    /// are expected to [`advance`](Self::advance) to the end of the period first.
    pub fn drain(&mut self, count: usize) -> Vec<i32> {
        let count = count.min(self.buffer.len());
        self.pos = 0;
        if self.muted {
            return vec![0; count];
        }
        self.buffer[..count].to_vec()
    }
}

impl Default for PcSpeaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts a shared speaker into an [`AudioProducer`] for the mixer.
pub struct SpeakerOutput {
    speaker: SharedSpeaker,
    pit: Arc<dyn PitChannels>,
    timeline: SoundTimeline,
}

impl SpeakerOutput {
    pub fn new(speaker: SharedSpeaker, pit: Arc<dyn PitChannels>, timeline: SoundTimeline) -> Self {
        Self {
            speaker,
            pit,
            timeline,
        }
    }
}

impl AudioProducer for SpeakerOutput {
    fn mix_into(&mut self, out: &mut [i32]) {
        let frames = out.len() / 2;
        let ch2 = self.pit.read_channel_state(SPEAKER_CHANNEL);

        let samples = {
            let mut speaker = lock_speaker(&self.speaker);
            speaker.advance(self.timeline.position(), ch2);
            speaker.drain(frames)
        };

        for (frame, sample) in out.chunks_exact_mut(2).zip(samples) {
            frame[0] = frame[0].saturating_add(sample);
            frame[1] = frame[1].saturating_add(sample);
        }
    }
}
