//! Host input events and their delivery.
//!
//! Decoders describe what changed through an [`Emitter`], which forwards
//! each event to the [`EventSink`] and closes the device's group with a
//! single [`InputEvent::Sync`]. Delivery is best effort: a failed send is
//! logged and counted, never retried.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use amiga_keymap::KeyCode;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::SinkError;
use crate::Device;

// Linux input event types (`linux/input-event-codes.h`)
pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;
pub const SYN_REPORT: u16 = 0;

/// Pointer and stylus buttons.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Button {
    Left,
    Right,
    Middle,
    /// Lightpen tip.
    Touch,
    /// Pen tool in proximity, sent alongside [`Button::Touch`].
    ToolPen,
}

impl Button {
    pub const fn code(self) -> u16 {
        match self {
            Button::Left => 0x110,
            Button::Right => 0x111,
            Button::Middle => 0x112,
            Button::Touch => 0x14A,
            Button::ToolPen => 0x140,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RelAxis {
    X,
    Y,
}

impl RelAxis {
    pub const fn code(self) -> u16 {
        match self {
            RelAxis::X => 0x00,
            RelAxis::Y => 0x01,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AbsAxis {
    X,
    Y,
    Pressure,
}

impl AbsAxis {
    pub const fn code(self) -> u16 {
        match self {
            AbsAxis::X => 0x00,
            AbsAxis::Y => 0x01,
            AbsAxis::Pressure => 0x18,
        }
    }
}

/// A normalized input event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InputEvent {
    KeyEdge { key: KeyCode, pressed: bool },
    ButtonEdge { button: Button, pressed: bool },
    RelativeMove { axis: RelAxis, delta: i32 },
    AbsoluteMove { axis: AbsAxis, value: i32 },
    /// End of an atomic group of changes.
    Sync,
}

impl InputEvent {
    /// The `(type, code, value)` triple of a Linux `input_event`.
    pub fn to_raw(self) -> RawEvent {
        let (ev_type, code, value) = match self {
            InputEvent::KeyEdge { key, pressed } => (EV_KEY, key.code(), i32::from(pressed)),
            InputEvent::ButtonEdge { button, pressed } => {
                (EV_KEY, button.code(), i32::from(pressed))
            }
            InputEvent::RelativeMove { axis, delta } => (EV_REL, axis.code(), delta),
            InputEvent::AbsoluteMove { axis, value } => (EV_ABS, axis.code(), value),
            InputEvent::Sync => (EV_SYN, SYN_REPORT, 0),
        };
        RawEvent {
            ev_type,
            code,
            value,
        }
    }

    pub fn is_sync(&self) -> bool {
        matches!(self, InputEvent::Sync)
    }
}

/// Wire form of an event as the host input subsystem sees it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub ev_type: u16,
    pub code: u16,
    pub value: i32,
}

/// Consumer of normalized events. Delivery is fire-and-forget.
pub trait EventSink {
    fn send(&mut self, event: InputEvent) -> Result<(), SinkError>;
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn send(&mut self, event: InputEvent) -> Result<(), SinkError> {
        (**self).send(event)
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn send(&mut self, event: InputEvent) -> Result<(), SinkError> {
        (**self).send(event)
    }
}

/// Events and drops produced by one device in one tick.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupSummary {
    /// Events accepted by the sink, including the closing sync.
    pub delivered: usize,
    /// Events the sink rejected.
    pub dropped: usize,
}

/// Per-device, per-tick event writer.
///
/// Every transition is forwarded immediately; [`Emitter::finish`] closes the
/// group with one sync marker if anything was emitted.
pub struct Emitter<'a> {
    sink: &'a mut dyn EventSink,
    device: Device,
    summary: GroupSummary,
}

impl<'a> Emitter<'a> {
    pub fn new(sink: &'a mut dyn EventSink, device: Device) -> Self {
        Self {
            sink,
            device,
            summary: GroupSummary::default(),
        }
    }

    pub fn key_edge(&mut self, key: KeyCode, pressed: bool) {
        self.emit(InputEvent::KeyEdge { key, pressed });
    }

    pub fn button_edge(&mut self, button: Button, pressed: bool) {
        self.emit(InputEvent::ButtonEdge { button, pressed });
    }

    pub fn relative(&mut self, axis: RelAxis, delta: i32) {
        self.emit(InputEvent::RelativeMove { axis, delta });
    }

    pub fn absolute(&mut self, axis: AbsAxis, value: i32) {
        self.emit(InputEvent::AbsoluteMove { axis, value });
    }

    /// True once any event of this group has been attempted.
    pub fn is_pending(&self) -> bool {
        self.summary.delivered + self.summary.dropped > 0
    }

    /// Close the group with a sync marker, if it is non-empty.
    pub fn finish(mut self) -> GroupSummary {
        if self.is_pending() {
            self.emit(InputEvent::Sync);
        }
        self.summary
    }

    fn emit(&mut self, event: InputEvent) {
        match self.sink.send(event) {
            Ok(()) => {
                debug!(device = %self.device, ?event, "event");
                self.summary.delivered += 1;
            }
            Err(e) => {
                warn!(device = %self.device, ?event, error = %e, "dropped input event");
                self.summary.dropped += 1;
            }
        }
    }
}

/// Sink that keeps every event in memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<InputEvent>>>,
    failures: Arc<Mutex<usize>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_events(&self) -> MutexGuard<'_, Vec<InputEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<InputEvent> {
        self.lock_events().clone()
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<InputEvent> {
        std::mem::take(&mut *self.lock_events())
    }

    /// Reject the next `count` events with [`SinkError::Closed`].
    pub fn fail_next(&self, count: usize) {
        *self.failures.lock().unwrap_or_else(|e| e.into_inner()) = count;
    }
}

impl EventSink for RecordingSink {
    fn send(&mut self, event: InputEvent) -> Result<(), SinkError> {
        {
            let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
            if *failures > 0 {
                *failures -= 1;
                return Err(SinkError::Closed);
            }
        }
        self.lock_events().push(event);
        Ok(())
    }
}

/// Sink that reports every event through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn send(&mut self, event: InputEvent) -> Result<(), SinkError> {
        match event {
            InputEvent::KeyEdge { key, pressed } => info!(
                key = key.display_name(),
                code = key.code(),
                pressed,
                "key"
            ),
            InputEvent::ButtonEdge { button, pressed } => {
                info!(?button, pressed, "button")
            }
            InputEvent::RelativeMove { axis, delta } => info!(?axis, delta, "move"),
            InputEvent::AbsoluteMove { axis, value } => info!(?axis, value, "position"),
            InputEvent::Sync => debug!("sync"),
        }
        Ok(())
    }
}

/// Sink writing one JSON object per event: `{"type":1,"code":30,"value":1}`.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn send(&mut self, event: InputEvent) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, &event.to_raw())?;
        self.writer.write_all(b"\n")?;
        if event.is_sync() {
            self.writer.flush()?;
        }
        Ok(())
    }
}
