//! Set-1 scancode table for the 83-key XT keyboard.
//!
//! Key identifiers are the host's normalized 9-bit key positions: `0x000..=0x0FF`
//! are the classic set-1 make codes and `0x100..=0x1FF` are the `E0`-prefixed
//! ("extended") keys of later keyboards. The XT protocol has no prefix bytes and
//! nothing above `0x53`, so extended keys that have an XT equivalent are folded
//! onto the legacy code by table construction; the rest are dropped.

/// Number of normalized key identifiers.
pub const KEY_ID_COUNT: usize = 512;

/// Highest make code the XT keyboard can send.
pub const XT_MAX_MAKE: u8 = 0x53;

/// Break codes are make codes with the top bit set.
pub const BREAK_BIT: u8 = 0x80;

/// Make/break sequence for one key position.
///
/// Sequences hold at most two bytes; every XT entry uses one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScancodeEntry {
    make: [u8; 2],
    brk: [u8; 2],
    len: u8,
}

impl ScancodeEntry {
    const fn single(make: u8) -> Self {
        Self {
            make: [make, 0],
            brk: [make | BREAK_BIT, 0],
            len: 1,
        }
    }

    pub fn make_bytes(&self) -> &[u8] {
        &self.make[..self.len as usize]
    }

    pub fn break_bytes(&self) -> &[u8] {
        &self.brk[..self.len as usize]
    }
}

/// Extended key positions that alias onto XT codes:
/// keypad Enter, right Ctrl, keypad `/`, Print Screen, right Alt, Break and the
/// grey navigation cluster.
const EXTENDED_ALIASES: [u16; 16] = [
    0x11C, 0x11D, 0x135, 0x137, 0x138, 0x146, 0x147, 0x148, 0x149, 0x14B, 0x14D, 0x14F, 0x150,
    0x151, 0x152, 0x153,
];

const fn build_xt_table() -> [u8; KEY_ID_COUNT] {
    // 0 marks an absent entry; no XT key sends make code 0.
    let mut table = [0u8; KEY_ID_COUNT];

    let mut code = 1;
    while code <= XT_MAX_MAKE as usize {
        table[code] = code as u8;
        code += 1;
    }

    let mut i = 0;
    while i < EXTENDED_ALIASES.len() {
        let key = EXTENDED_ALIASES[i] as usize;
        table[key] = (key & 0xFF) as u8;
        i += 1;
    }

    table
}

static XT_MAKE_CODES: [u8; KEY_ID_COUNT] = build_xt_table();

/// Looks up the XT make/break sequence for a normalized key id.
///
/// Returns `None` for unmapped positions and for ids outside `0..512`; such
/// events are dropped by the caller.
pub fn lookup(key_id: u16) -> Option<ScancodeEntry> {
    match XT_MAKE_CODES.get(key_id as usize) {
        Some(&make) if make != 0 => Some(ScancodeEntry::single(make)),
        _ => None,
    }
}

/// Grey navigation keys (Home, arrows, PgUp/PgDn, End, Ins, Del).
///
/// On an XT these share codes with the numeric keypad, so the host brackets them
/// with fake shift events to keep the BIOS from turning them into digits.
pub fn is_grey_navigation_key(key_id: u16) -> bool {
    (0x147..=0x153).contains(&key_id) && lookup(key_id).is_some()
}
