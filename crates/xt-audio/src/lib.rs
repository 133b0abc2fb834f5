//! XT audio: the PC speaker and the small mixing stage that pulls it.
//!
//! Samples are produced once per sound period (1/50 s at 48 kHz). Producers
//! render mono internally and are mixed additively into an interleaved stereo
//! `i32` buffer.

#![forbid(unsafe_code)]

pub mod sink;
pub mod speaker;

pub use sink::{AudioProducer, Mixer, ProducerId, SoundTimeline};
pub use speaker::{PcSpeaker, SharedSpeaker, SpeakerOutput};

pub const SOUND_FREQ_HZ: usize = 48_000;

/// Frames in one sound period.
pub const SOUND_BUFFER_FRAMES: usize = SOUND_FREQ_HZ / 50;
