//! PC/XT keyboard input: scancode translation, the key queue shared with the
//! host input thread, and the PPI-attached keyboard controller.

#![forbid(unsafe_code)]

pub mod config;
pub mod feed;
pub mod queue;
pub mod scancode;
pub mod shift;
pub mod variant;
pub mod xt_keyboard;

pub use config::XtKeyboardConfig;
pub use feed::{FeedError, KeyDirection, KeyEvent, KeyFeed, ModifierState};
pub use queue::{KeyChannel, KeyQueue, KeyQueueError, KEY_QUEUE_CAPACITY};
pub use scancode::ScancodeEntry;
pub use shift::{SendCode, ShiftState};
pub use variant::{descriptor_by_name, DeviceDescriptor, MachineVariant, VideoAdapter, DESCRIPTORS};
pub use xt_keyboard::{
    AttachError, KeyboardWiring, PortB, TandyEeprom, XtKeyboard, KEYBOARD_IRQ, POLL_INTERVAL_NS,
};
