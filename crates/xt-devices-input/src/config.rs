use serde::{Deserialize, Serialize};

use crate::variant::{MachineVariant, VideoAdapter};

/// Highest floppy count the two drive switches can encode.
pub const MAX_FLOPPY_DRIVES: u8 = 4;

/// Machine configuration the keyboard controller straps itself from.
///
/// Usually deserialized from the machine profile:
///
/// ```json
/// { "variant": "xt-1982", "floppy_drives": 2, "video": "mda", "memory_kib": 256 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct XtKeyboardConfig {
    pub variant: MachineVariant,
    pub floppy_drives: u8,
    pub video: VideoAdapter,
    pub memory_kib: u32,
    /// Bracket grey navigation keys with synthetic shift events.
    pub fake_shift_grey_keys: bool,
}

impl Default for XtKeyboardConfig {
    fn default() -> Self {
        Self {
            variant: MachineVariant::default(),
            floppy_drives: 1,
            video: VideoAdapter::default(),
            memory_kib: 640,
            fake_shift_grey_keys: true,
        }
    }
}

impl XtKeyboardConfig {
    pub fn new(variant: MachineVariant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }

    pub fn with_floppy_drives(mut self, count: u8) -> Self {
        self.floppy_drives = count;
        self
    }

    pub fn with_video(mut self, video: VideoAdapter) -> Self {
        self.video = video;
        self
    }

    pub fn with_memory_kib(mut self, kib: u32) -> Self {
        self.memory_kib = kib;
        self
    }

    pub fn with_fake_shift_grey_keys(mut self, on: bool) -> Self {
        self.fake_shift_grey_keys = on;
        self
    }
}
