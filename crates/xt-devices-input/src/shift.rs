//! Fake-shift synthesis for grey navigation keys.
//!
//! With Num Lock on, the BIOS turns the keypad codes shared by the grey cursor
//! keys into digits unless a shift key is down. Keyboards that have separate
//! cursor keys therefore bracket them with a synthetic Left Shift press and
//! release; when the user is already holding a shift key (with Num Lock off),
//! the real shift is released around the key instead.

use bitflags::bitflags;

pub const LSHIFT_MAKE: u8 = 0x2A;
pub const LSHIFT_BREAK: u8 = 0xAA;
pub const RSHIFT_MAKE: u8 = 0x36;
pub const RSHIFT_BREAK: u8 = 0xB6;

bitflags! {
    /// Shift keys currently held down.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ShiftState: u8 {
        const LSHIFT = 0x01;
        const RSHIFT = 0x02;
    }
}

/// One unit sent towards the controller queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendCode {
    Byte(u8),
    FakeShiftOn,
    FakeShiftOff,
}

/// Bytes produced for one [`SendCode`]; at most one per shift key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Synthesized {
    bytes: [u8; 2],
    len: usize,
}

impl Synthesized {
    fn push(&mut self, byte: u8) {
        self.bytes[self.len] = byte;
        self.len += 1;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Expands a send code against the modifier state latched at this instant.
pub fn synthesize(code: SendCode, num_lock: bool, shift: ShiftState) -> Synthesized {
    let mut out = Synthesized::default();
    match code {
        SendCode::Byte(byte) => out.push(byte),
        SendCode::FakeShiftOn => {
            if num_lock {
                if shift.is_empty() {
                    out.push(LSHIFT_MAKE);
                }
            } else {
                if shift.contains(ShiftState::LSHIFT) {
                    out.push(LSHIFT_BREAK);
                }
                if shift.contains(ShiftState::RSHIFT) {
                    out.push(RSHIFT_BREAK);
                }
            }
        }
        SendCode::FakeShiftOff => {
            if num_lock {
                if shift.is_empty() {
                    out.push(LSHIFT_BREAK);
                }
            } else {
                if shift.contains(ShiftState::LSHIFT) {
                    out.push(LSHIFT_MAKE);
                }
                if shift.contains(ShiftState::RSHIFT) {
                    out.push(RSHIFT_MAKE);
                }
            }
        }
    }
    out
}
