//! Amiga input bridge core.
//!
//! Polls the keyboard matrix, the quadrature mouse counters and the lightpen
//! beam-position latch of an Amiga through a remote register channel and
//! turns the raw register state into host input events:
//! - Matrix scanning with per-key edge detection
//! - Mouse counter accumulation with clamped relative deltas
//! - Lightpen detection and absolute positioning
//! - A fixed-rate poller running all three on one worker thread

pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod keyboard;
pub mod lightpen;
pub mod mouse;
pub mod poller;
pub mod registers;

use std::fmt;

pub use bus::{MemoryBus, RegisterBus, Width};
pub use config::PollerConfig;
pub use error::{BusError, InputError, InputResult, SinkError};
pub use event::{
    AbsAxis, Button, Emitter, EventSink, InputEvent, JsonLinesSink, LogSink, RawEvent,
    RecordingSink, RelAxis,
};
pub use keyboard::{KeyboardScanner, MatrixSnapshot};
pub use lightpen::{LightpenDecoder, LightpenPhase, LightpenState};
pub use mouse::{MouseDecoder, MousePort, MouseState};
pub use poller::{InputSession, Poller, SessionStats};
pub use registers::{Chipset, RegisterMap};

/// The physical input devices scanned each tick, in scan order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Device {
    Keyboard,
    Mouse,
    Lightpen,
}

impl Device {
    pub const ALL: [Device; 3] = [Device::Keyboard, Device::Mouse, Device::Lightpen];

    pub fn name(self) -> &'static str {
        match self {
            Device::Keyboard => "keyboard",
            Device::Mouse => "mouse",
            Device::Lightpen => "lightpen",
        }
    }

    fn index(self) -> usize {
        match self {
            Device::Keyboard => 0,
            Device::Mouse => 1,
            Device::Lightpen => 2,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
