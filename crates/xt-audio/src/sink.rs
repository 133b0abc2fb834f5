use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Source of audio pulled once per sound period.
///
/// `out` holds interleaved stereo frames (L0, R0, L1, R1, ...). Producers add
/// into it rather than overwrite so several sources can share one buffer.
pub trait AudioProducer: Send {
    fn mix_into(&mut self, out: &mut [i32]);
}

/// Shared position inside the current sound period, in frames.
///
/// The emulation thread moves it forward as guest time passes; devices that
/// generate audio lazily (the speaker) catch up to it before changing state.
#[derive(Debug, Clone, Default)]
pub struct SoundTimeline {
    pos: Arc<AtomicUsize>,
}

impl SoundTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.pos.load(Ordering::Acquire)
    }

    pub fn set_position(&self, frames: usize) {
        self.pos.store(frames, Ordering::Release);
    }

    pub fn advance(&self, frames: usize) {
        self.pos.fetch_add(frames, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProducerId(u32);

/// Mixing stage: owns the timeline and the registered producers.
pub struct Mixer {
    frames_per_period: usize,
    timeline: SoundTimeline,
    producers: Vec<(ProducerId, Box<dyn AudioProducer>)>,
    next_id: u32,
}

impl Mixer {
    pub fn new(frames_per_period: usize) -> Self {
        Self {
            frames_per_period,
            timeline: SoundTimeline::new(),
            producers: Vec::new(),
            next_id: 0,
        }
    }

    pub fn frames_per_period(&self) -> usize {
        self.frames_per_period
    }

    pub fn timeline(&self) -> SoundTimeline {
        self.timeline.clone()
    }

    pub fn register_producer(&mut self, producer: Box<dyn AudioProducer>) -> ProducerId {
        let id = ProducerId(self.next_id);
        self.next_id += 1;
        self.producers.push((id, producer));
        id
    }

    pub fn unregister_producer(&mut self, id: ProducerId) -> bool {
        let before = self.producers.len();
        self.producers.retain(|(pid, _)| *pid != id);
        self.producers.len() != before
    }

    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Closes the current period and returns its interleaved stereo samples.
    ///
    /// The timeline is moved to the end of the period before producers run and
    /// rewound to zero afterwards.
    pub fn render_period(&mut self) -> Vec<i32> {
        self.timeline.set_position(self.frames_per_period);
        let mut out = vec![0i32; self.frames_per_period * 2];
        for (_, producer) in self.producers.iter_mut() {
            producer.mix_into(&mut out);
        }
        self.timeline.set_position(0);
        tracing::trace!(frames = self.frames_per_period, "rendered sound period");
        out
    }
}
