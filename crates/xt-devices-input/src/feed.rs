//! Host-side key feed.
//!
//! A [`KeyFeed`] is the single registration slot through which the host input
//! layer delivers key events. It is `Send`, so the host event pump can own it on
//! its own thread while the controller drains the shared queue on the emulation
//! thread.

use std::sync::Arc;

use thiserror::Error;

use crate::queue::{KeyChannel, KeyQueueError};
use crate::scancode;
use crate::shift::{self, SendCode, ShiftState};

const LSHIFT_KEY: u16 = 0x2A;
const RSHIFT_KEY: u16 = 0x36;
const NUM_LOCK_KEY: u16 = 0x45;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Make,
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_id: u16,
    pub direction: KeyDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("keyboard controller has been detached")]
    Detached,
    #[error("keyboard scanning is disabled")]
    ScanningDisabled,
    #[error(transparent)]
    QueueFull(#[from] KeyQueueError),
}

/// Modifier state latched by the feed as key events pass through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    pub num_lock: bool,
    pub shift: ShiftState,
}

#[derive(Debug)]
pub struct KeyFeed {
    channel: Arc<KeyChannel>,
    modifiers: ModifierState,
    fake_shift_grey_keys: bool,
}

impl KeyFeed {
    /// Only called after the caller has claimed the channel's feed slot.
    pub(crate) fn new(channel: Arc<KeyChannel>, fake_shift_grey_keys: bool) -> Self {
        Self {
            channel,
            modifiers: ModifierState::default(),
            fake_shift_grey_keys,
        }
    }

    pub fn modifiers(&self) -> ModifierState {
        self.modifiers
    }

    /// Resynchronizes Num Lock with the host's lock state.
    pub fn set_num_lock(&mut self, on: bool) {
        self.modifiers.num_lock = on;
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn feed_event(&mut self, event: KeyEvent) -> Result<(), FeedError> {
        self.feed(event.key_id, event.direction)
    }

    /// Translates one host key event and queues its XT bytes.
    ///
    /// Unmapped keys are dropped silently. An event is queued whole or not at
    /// all: on [`FeedError::QueueFull`] nothing is queued and the tracked
    /// modifiers are left unchanged.
    pub fn feed(&mut self, key_id: u16, direction: KeyDirection) -> Result<(), FeedError> {
        self.check_link()?;

        let Some(entry) = scancode::lookup(key_id) else {
            tracing::trace!(key_id, "XT keyboard: no scancode, dropping key");
            return Ok(());
        };

        let bracket = self.fake_shift_grey_keys && scancode::is_grey_navigation_key(key_id);
        let (num_lock, held) = (self.modifiers.num_lock, self.modifiers.shift);

        let mut bytes = Vec::with_capacity(4);
        match direction {
            KeyDirection::Make => {
                if bracket {
                    bytes.extend_from_slice(
                        shift::synthesize(SendCode::FakeShiftOn, num_lock, held).as_slice(),
                    );
                }
                bytes.extend_from_slice(entry.make_bytes());
            }
            KeyDirection::Break => {
                bytes.extend_from_slice(entry.break_bytes());
                if bracket {
                    bytes.extend_from_slice(
                        shift::synthesize(SendCode::FakeShiftOff, num_lock, held).as_slice(),
                    );
                }
            }
        }

        self.channel.push_all(&bytes)?;
        self.track_modifiers(key_id, direction);
        Ok(())
    }

    /// Runs one send code through fake-shift synthesis into the queue.
    pub fn send(&mut self, code: SendCode) -> Result<(), FeedError> {
        self.check_link()?;
        let bytes = shift::synthesize(code, self.modifiers.num_lock, self.modifiers.shift);
        self.channel.push_all(bytes.as_slice())?;
        Ok(())
    }

    /// Gives up the feed slot, the same as dropping the feed. The controller
    /// can then hand out a new one.
    pub fn disconnect(self) {
        drop(self);
    }

    fn check_link(&self) -> Result<(), FeedError> {
        if !self.channel.is_connected() {
            return Err(FeedError::Detached);
        }
        if !self.channel.is_scanning() {
            return Err(FeedError::ScanningDisabled);
        }
        Ok(())
    }

    fn track_modifiers(&mut self, key_id: u16, direction: KeyDirection) {
        let pressed = direction == KeyDirection::Make;
        match key_id {
            LSHIFT_KEY => self.modifiers.shift.set(ShiftState::LSHIFT, pressed),
            RSHIFT_KEY => self.modifiers.shift.set(ShiftState::RSHIFT, pressed),
            NUM_LOCK_KEY if pressed => self.modifiers.num_lock = !self.modifiers.num_lock,
            _ => {}
        }
    }
}

impl Drop for KeyFeed {
    fn drop(&mut self) {
        self.channel.release_feed();
    }
}
