//! XT platform devices wired onto the port bus and timer queue.

#![forbid(unsafe_code)]

pub mod xt_keyboard;

pub use xt_keyboard::{DeviceAttachError, XtKeyboardPort, XtKeyboardPorts};

/// Payload of timers scheduled by devices in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceTimer {
    KeyboardPoll,
}
