//! Platform seams shared by the XT-class device models.
//!
//! The keyboard controller and speaker never talk to the CPU, interrupt
//! controller or timer chip directly. They go through the small traits and
//! containers defined here so that a machine (or a unit test) can plug in
//! whatever implementation it has.

#![forbid(unsafe_code)]

pub mod interrupts;
pub mod io;
pub mod pit;
pub mod time;

pub use interrupts::IrqSink;
pub use io::{IoBusError, IoPortBus, PortIoDevice};
pub use pit::{ChannelState, PitChannels};
pub use time::{TimerEvent, TimerId, TimerQueue};
