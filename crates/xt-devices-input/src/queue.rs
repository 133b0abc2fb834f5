//! Pending scancode bytes and the channel that carries them from the host
//! input thread to the emulation thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

pub const KEY_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyQueueError {
    #[error("key queue full, dropped byte {byte:#04x}")]
    Full { byte: u8 },
}

/// Fixed 16-byte ring buffer.
///
/// Occupancy is tracked explicitly so all 16 slots are usable and a full queue
/// is distinguishable from an empty one. Pushing into a full queue is rejected;
/// the byte is handed back in the error and nothing already queued is lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyQueue {
    buf: [u8; KEY_QUEUE_CAPACITY],
    head: usize,
    len: usize,
}

impl KeyQueue {
    pub const fn new() -> Self {
        Self {
            buf: [0; KEY_QUEUE_CAPACITY],
            head: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, byte: u8) -> Result<(), KeyQueueError> {
        if self.len == KEY_QUEUE_CAPACITY {
            return Err(KeyQueueError::Full { byte });
        }
        let tail = (self.head + self.len) % KEY_QUEUE_CAPACITY;
        self.buf[tail] = byte;
        self.len += 1;
        Ok(())
    }

    /// Queues `bytes` as a unit: either every byte fits or none is queued.
    pub fn push_all(&mut self, bytes: &[u8]) -> Result<(), KeyQueueError> {
        let Some(&first) = bytes.first() else {
            return Ok(());
        };
        if KEY_QUEUE_CAPACITY - self.len < bytes.len() {
            return Err(KeyQueueError::Full { byte: first });
        }
        for &byte in bytes {
            let tail = (self.head + self.len) % KEY_QUEUE_CAPACITY;
            self.buf[tail] = byte;
            self.len += 1;
        }
        Ok(())
    }

    /// Empties the queue and leaves `byte` as the only pending entry.
    pub fn restart_with(&mut self, byte: u8) {
        self.head = 0;
        self.buf[0] = byte;
        self.len = 1;
    }

    pub fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % KEY_QUEUE_CAPACITY;
        self.len -= 1;
        Some(byte)
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == KEY_QUEUE_CAPACITY
    }

    /// Pending bytes in delivery order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.len).map(move |i| self.buf[(self.head + i) % KEY_QUEUE_CAPACITY])
    }
}

impl Default for KeyQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-producer / single-consumer hand-off between host input and the controller.
///
/// The host side only pushes (through a [`crate::KeyFeed`]); the controller pops,
/// clears on reset, and injects its own self-test byte. A mutex gives both sides a
/// consistent view; each critical section is a handful of byte moves.
#[derive(Debug)]
pub struct KeyChannel {
    queue: Mutex<KeyQueue>,
    connected: AtomicBool,
    scanning: AtomicBool,
    feed_claimed: AtomicBool,
}

impl KeyChannel {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(KeyQueue::new()),
            connected: AtomicBool::new(true),
            scanning: AtomicBool::new(true),
            feed_claimed: AtomicBool::new(false),
        }
    }

    /// Every queue mutation is a single push/pop/reset, so a poisoned guard still
    /// holds a valid queue.
    pub fn lock(&self) -> MutexGuard<'_, KeyQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, byte: u8) -> Result<(), KeyQueueError> {
        let res = self.lock().push(byte);
        match res {
            Ok(()) => tracing::trace!("XT keyboard: {byte:02X} added to key queue"),
            Err(_) => tracing::warn!("XT keyboard: key queue full, dropping {byte:02X}"),
        }
        res
    }

    /// Queues one key event's bytes under a single lock, all or nothing.
    pub fn push_all(&self, bytes: &[u8]) -> Result<(), KeyQueueError> {
        let res = self.lock().push_all(bytes);
        match res {
            Ok(()) => tracing::trace!("XT keyboard: {bytes:02X?} added to key queue"),
            Err(_) => tracing::warn!("XT keyboard: key queue full, dropping {bytes:02X?}"),
        }
        res
    }

    /// Flushes pending keys and queues `byte` in the same critical section, so
    /// a concurrent feed can only land behind it.
    pub fn restart_with(&self, byte: u8) {
        self.lock().restart_with(byte);
    }

    pub fn pop(&self) -> Option<u8> {
        self.lock().pop()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    pub(crate) fn set_scanning(&self, scanning: bool) {
        self.scanning.store(scanning, Ordering::Release);
    }

    /// Claims the single feed slot. Returns `false` if a feed is already registered.
    pub(crate) fn claim_feed(&self) -> bool {
        self.feed_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release_feed(&self) {
        self.feed_claimed.store(false, Ordering::Release);
    }

    pub fn feed_registered(&self) -> bool {
        self.feed_claimed.load(Ordering::Acquire)
    }
}

impl Default for KeyChannel {
    fn default() -> Self {
        Self::new()
    }
}
