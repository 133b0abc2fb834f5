use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;
use xt_devices_input::xt_keyboard::{PORT_BASE, PORT_COUNT};
use xt_devices_input::{
    AttachError, KeyFeed, KeyboardWiring, XtKeyboard, XtKeyboardConfig, POLL_INTERVAL_NS,
};
use xt_platform::io::{IoBusError, IoPortBus, PortIoDevice};
use xt_platform::time::{TimerId, TimerQueue};

use crate::DeviceTimer;

#[derive(Debug, Error)]
pub enum DeviceAttachError {
    #[error(transparent)]
    Keyboard(#[from] AttachError),
    #[error("keyboard port window unavailable: {0}")]
    Bus(#[from] IoBusError),
}

/// XT keyboard/PPI attached to a machine.
///
/// Owns the 0x60..=0x63 bus window and the poll timer for as long as it lives;
/// [`detach`](Self::detach) (or drop) releases both.
pub struct XtKeyboardPorts {
    inner: Rc<RefCell<XtKeyboard>>,
    bus: Rc<RefCell<IoPortBus>>,
    timers: Rc<RefCell<TimerQueue<DeviceTimer>>>,
    poll_timer: Option<TimerId>,
    attached: bool,
}

impl XtKeyboardPorts {
    pub fn attach(
        config: XtKeyboardConfig,
        wiring: KeyboardWiring,
        bus: Rc<RefCell<IoPortBus>>,
        timers: Rc<RefCell<TimerQueue<DeviceTimer>>>,
        now_ns: u64,
    ) -> Result<Self, DeviceAttachError> {
        let inner = Rc::new(RefCell::new(XtKeyboard::new(config, wiring)?));

        // On failure `inner` is dropped here, which detaches the controller.
        bus.borrow_mut().register_range(
            PORT_BASE,
            PORT_COUNT,
            Box::new(XtKeyboardPort {
                inner: inner.clone(),
            }),
        )?;

        let poll_timer = timers
            .borrow_mut()
            .schedule(now_ns + POLL_INTERVAL_NS, DeviceTimer::KeyboardPoll);

        Ok(Self {
            inner,
            bus,
            timers,
            poll_timer: Some(poll_timer),
            attached: true,
        })
    }

    /// Returns a cloneable handle to the shared controller.
    pub fn controller(&self) -> Rc<RefCell<XtKeyboard>> {
        self.inner.clone()
    }

    /// Registers the host key feed; see [`XtKeyboard::connect_feed`].
    pub fn key_feed(&self) -> Option<KeyFeed> {
        self.inner.borrow().connect_feed()
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn poll_timer(&self) -> Option<TimerId> {
        self.poll_timer
    }

    pub fn reset(&mut self) {
        self.inner.borrow_mut().reset();
    }

    /// Handles a due timer. Returns `false` for timers this device does not own.
    ///
    /// The poll re-arms relative to the deadline that fired, not to "now", so a
    /// late machine loop catches up instead of drifting.
    pub fn handle_timer_event(&mut self, id: TimerId, deadline_ns: u64) -> bool {
        if !self.attached || self.poll_timer != Some(id) {
            return false;
        }

        self.inner.borrow_mut().poll();

        let next = self
            .timers
            .borrow_mut()
            .schedule(deadline_ns + POLL_INTERVAL_NS, DeviceTimer::KeyboardPoll);
        self.poll_timer = Some(next);
        true
    }

    /// Removes the port window, cancels the poll timer and disconnects the host
    /// feed. Safe to call more than once.
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;

        if self
            .bus
            .borrow_mut()
            .unregister_range_device(PORT_BASE, PORT_COUNT)
            .is_none()
        {
            tracing::warn!("XT keyboard: port window was already gone at detach");
        }
        if let Some(id) = self.poll_timer.take() {
            self.timers.borrow_mut().cancel(id);
        }
        self.inner.borrow_mut().detach();
    }
}

impl Drop for XtKeyboardPorts {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Bus handle for the PPI window; shares the controller with [`XtKeyboardPorts`].
#[derive(Clone)]
pub struct XtKeyboardPort {
    inner: Rc<RefCell<XtKeyboard>>,
}

impl PortIoDevice for XtKeyboardPort {
    fn read(&mut self, port: u16, size: u8) -> u32 {
        let byte = self.inner.borrow_mut().read_port(port);
        match size {
            2 => u16::from_le_bytes([byte, byte]) as u32,
            4 => u32::from_le_bytes([byte, byte, byte, byte]),
            _ => byte as u32,
        }
    }

    fn write(&mut self, port: u16, _size: u8, value: u32) {
        self.inner
            .borrow_mut()
            .write_port(port, (value & 0xFF) as u8);
    }

    fn reset(&mut self) {
        self.inner.borrow_mut().reset();
    }
}
