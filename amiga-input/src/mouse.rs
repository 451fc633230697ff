//! Quadrature mouse decoding.
//!
//! Each game port has an 8-bit horizontal and an 8-bit vertical counter in
//! JOYxDAT (Y in the high byte, X in the low byte) that free-run as the
//! ball turns. Per tick the wrapping difference of each counter is added to
//! a running absolute position, and the distance since the last report is
//! sent as a clamped relative move. Only the report is clamped: the
//! position is not, so a large jump is spread over the following ticks.

use serde::Deserialize;
use tracing::debug;

use crate::bus::RegisterBus;
use crate::error::BusError;
use crate::event::{Button, Emitter, RelAxis};
use crate::registers::{
    RegisterMap, CIAA_FIRE0, CIAA_FIRE1, POTGOR_DATLX0, POTGOR_DATLX1, POTGOR_DATLY0,
    POTGOR_DATLY1,
};

/// Default bound on the magnitude of a reported delta per axis and tick.
pub const MAX_MOUSE_DELTA: i32 = 127;

// Button bitmask, active high
pub const BUTTON_LEFT: u8 = 0x01;
pub const BUTTON_RIGHT: u8 = 0x02;
pub const BUTTON_MIDDLE: u8 = 0x04;

const BUTTONS: [(u8, Button); 3] = [
    (BUTTON_LEFT, Button::Left),
    (BUTTON_RIGHT, Button::Right),
    (BUTTON_MIDDLE, Button::Middle),
];

/// Amiga game port a mouse is plugged into.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "u8")]
pub enum MousePort {
    Port0,
    Port1,
}

impl MousePort {
    pub fn index(self) -> u8 {
        match self {
            MousePort::Port0 => 0,
            MousePort::Port1 => 1,
        }
    }
}

impl TryFrom<u8> for MousePort {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MousePort::Port0),
            1 => Ok(MousePort::Port1),
            other => Err(format!("mouse port must be 0 or 1, got {other}")),
        }
    }
}

/// Register addresses and bits of one game port.
#[derive(Copy, Clone, Debug)]
struct PortRegisters {
    counters: u32,
    fire: u32,
    fire_mask: u8,
    pot: u32,
    right_mask: u16,
    middle_mask: u16,
}

impl PortRegisters {
    fn new(map: &RegisterMap, port: MousePort) -> Self {
        match port {
            MousePort::Port0 => Self {
                counters: map.joy0dat,
                fire: map.ciaa_pra,
                fire_mask: CIAA_FIRE0,
                pot: map.potgor,
                right_mask: POTGOR_DATLY0,
                middle_mask: POTGOR_DATLX0,
            },
            MousePort::Port1 => Self {
                counters: map.joy1dat,
                fire: map.ciaa_pra,
                fire_mask: CIAA_FIRE1,
                pot: map.potgor,
                right_mask: POTGOR_DATLY1,
                middle_mask: POTGOR_DATLX1,
            },
        }
    }
}

/// Position and button state of one mouse.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MouseState {
    /// Running absolute counters; wrap like the hardware counters do.
    pub x: i32,
    pub y: i32,
    /// Counter values covered by reports so far.
    pub reported_x: i32,
    pub reported_y: i32,
    /// Pressed buttons, `BUTTON_*` bits.
    pub buttons: u8,
    /// Last raw hardware counter bytes, `None` until the first read.
    raw: Option<(u8, u8)>,
}

impl MouseState {
    /// Add one tick's raw motion and return the delta to report per axis.
    ///
    /// The reported delta is clamped to `±max_delta`; whatever is clamped
    /// off stays pending and is reported on later ticks. A bound below 1 is
    /// treated as 1.
    pub fn accumulate(&mut self, dx: i32, dy: i32, max_delta: i32) -> (i32, i32) {
        let bound = max_delta.max(1);
        self.x = self.x.wrapping_add(dx);
        self.y = self.y.wrapping_add(dy);

        let rx = self.x.wrapping_sub(self.reported_x).clamp(-bound, bound);
        let ry = self.y.wrapping_sub(self.reported_y).clamp(-bound, bound);

        self.reported_x = self.reported_x.wrapping_add(rx);
        self.reported_y = self.reported_y.wrapping_add(ry);
        (rx, ry)
    }

    /// Store the new button mask and return the bits that changed.
    pub fn update_buttons(&mut self, current: u8) -> u8 {
        let changed = current ^ self.buttons;
        self.buttons = current;
        changed
    }

    /// Motion not yet reported, per axis.
    pub fn pending(&self) -> (i32, i32) {
        (
            self.x.wrapping_sub(self.reported_x),
            self.y.wrapping_sub(self.reported_y),
        )
    }
}

struct PortDecoder {
    port: MousePort,
    registers: PortRegisters,
    state: MouseState,
}

/// Decodes the mice on the enabled game ports.
pub struct MouseDecoder {
    registers: RegisterMap,
    ports: Vec<PortDecoder>,
    max_delta: i32,
}

impl MouseDecoder {
    pub fn new(map: &RegisterMap, ports: &[MousePort], max_delta: i32) -> Self {
        Self {
            ports: ports
                .iter()
                .map(|&port| PortDecoder {
                    port,
                    registers: PortRegisters::new(map, port),
                    state: MouseState::default(),
                })
                .collect(),
            registers: *map,
            max_delta: max_delta.max(1),
        }
    }

    /// Turn the fire-button lines of the enabled ports into inputs, leaving
    /// the other port A directions alone.
    pub fn init<B: RegisterBus + ?Sized>(&mut self, bus: &mut B) -> Result<(), BusError> {
        let fire_bits = self
            .ports
            .iter()
            .fold(0u8, |bits, p| bits | p.registers.fire_mask);
        let direction = bus.read_u8(self.registers.ciaa_ddra)?;
        bus.write_u8(self.registers.ciaa_ddra, direction & !fire_bits)?;
        Ok(())
    }

    pub fn ports(&self) -> impl Iterator<Item = MousePort> + '_ {
        self.ports.iter().map(|p| p.port)
    }

    pub fn state(&self, port: MousePort) -> Option<&MouseState> {
        self.ports.iter().find(|p| p.port == port).map(|p| &p.state)
    }

    fn port_mut(&mut self, port: MousePort) -> Option<&mut PortDecoder> {
        self.ports.iter_mut().find(|p| p.port == port)
    }

    /// Per-axis counter movement since the previous read of this port.
    ///
    /// The first read only latches the counters and reports no motion.
    /// Ports that are not enabled report no motion.
    pub fn read_counters<B: RegisterBus + ?Sized>(
        &mut self,
        bus: &mut B,
        port: MousePort,
    ) -> Result<(i8, i8), BusError> {
        let Some(decoder) = self.port_mut(port) else {
            return Ok((0, 0));
        };
        let value = bus.read_u16(decoder.registers.counters)?;
        let [y, x] = value.to_be_bytes();

        let delta = match decoder.state.raw {
            Some((last_x, last_y)) => (
                x.wrapping_sub(last_x) as i8,
                y.wrapping_sub(last_y) as i8,
            ),
            None => (0, 0),
        };
        decoder.state.raw = Some((x, y));
        Ok(delta)
    }

    /// Pressed buttons of a port as `BUTTON_*` bits (inputs are active low).
    pub fn read_buttons<B: RegisterBus + ?Sized>(
        &self,
        bus: &mut B,
        port: MousePort,
    ) -> Result<u8, BusError> {
        let regs = PortRegisters::new(&self.registers, port);
        let fire = bus.read_u8(regs.fire)?;
        let pot = bus.read_u16(regs.pot)?;

        let mut buttons = 0;
        if fire & regs.fire_mask == 0 {
            buttons |= BUTTON_LEFT;
        }
        if pot & regs.right_mask == 0 {
            buttons |= BUTTON_RIGHT;
        }
        if pot & regs.middle_mask == 0 {
            buttons |= BUTTON_MIDDLE;
        }
        Ok(buttons)
    }

    /// Decode every enabled port once.
    ///
    /// Motion and buttons are handled independently: a counter failure
    /// still lets buttons through and vice versa. The first failure of the
    /// tick is returned once all ports have been processed.
    pub fn poll<B: RegisterBus + ?Sized>(
        &mut self,
        bus: &mut B,
        emitter: &mut Emitter<'_>,
    ) -> Result<(), BusError> {
        let mut first_error = None;
        let ports: Vec<MousePort> = self.ports().collect();

        for port in ports {
            match self.read_counters(bus, port) {
                Ok((dx, dy)) => self.report_motion(port, dx, dy, emitter),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }

            match self.read_buttons(bus, port) {
                Ok(buttons) => self.report_buttons(port, buttons, emitter),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn report_motion(&mut self, port: MousePort, dx: i8, dy: i8, emitter: &mut Emitter<'_>) {
        let max_delta = self.max_delta;
        let Some(decoder) = self.port_mut(port) else {
            return;
        };
        let (rx, ry) = decoder
            .state
            .accumulate(i32::from(dx), i32::from(dy), max_delta);

        if rx != 0 {
            emitter.relative(RelAxis::X, rx);
        }
        if ry != 0 {
            emitter.relative(RelAxis::Y, ry);
        }
        if (rx, ry) != (0, 0) {
            let (px, py) = decoder.state.pending();
            if (px, py) != (0, 0) {
                debug!(port = port.index(), px, py, "mouse delta clamped");
            }
        }
    }

    fn report_buttons(&mut self, port: MousePort, buttons: u8, emitter: &mut Emitter<'_>) {
        let Some(decoder) = self.port_mut(port) else {
            return;
        };
        let changed = decoder.state.update_buttons(buttons);

        for (mask, button) in BUTTONS {
            if changed & mask != 0 {
                emitter.button_edge(button, buttons & mask != 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::event::{InputEvent, RecordingSink};
    use crate::Device;

    fn decoder(map: &RegisterMap) -> MouseDecoder {
        MouseDecoder::new(map, &[MousePort::Port0], MAX_MOUSE_DELTA)
    }

    /// Idle port: fire and pot lines high, counters at zero.
    fn idle_bus(map: &RegisterMap) -> MemoryBus {
        let bus = MemoryBus::new();
        bus.set(map.ciaa_pra, 0xFF);
        bus.set(map.potgor, 0xFF00);
        bus
    }

    fn poll(mouse: &mut MouseDecoder, bus: &mut MemoryBus, sink: &mut RecordingSink) {
        let mut emitter = Emitter::new(sink, Device::Mouse);
        mouse.poll(bus, &mut emitter).unwrap();
        emitter.finish();
    }

    #[test]
    fn small_deltas_are_reported_in_full() {
        let mut state = MouseState::default();
        let reported: Vec<i32> = (0..3)
            .map(|_| state.accumulate(5, 0, MAX_MOUSE_DELTA).0)
            .collect();
        assert_eq!(reported, vec![5, 5, 5]);
        assert_eq!(state.x, 15);
        assert_eq!(state.pending(), (0, 0));
    }

    #[test]
    fn clamped_motion_carries_over() {
        let mut state = MouseState::default();
        assert_eq!(state.accumulate(200, -300, 127), (127, -127));
        assert_eq!(state.pending(), (73, -173));
        assert_eq!(state.accumulate(0, 0, 127), (73, -127));
        assert_eq!(state.accumulate(0, 0, 127), (0, -46));
        assert_eq!(state.x, 200);
        assert_eq!(state.reported_y, -300);
    }

    #[test]
    fn accumulator_survives_wraparound() {
        let mut state = MouseState {
            x: i32::MAX - 1,
            reported_x: i32::MAX - 1,
            ..MouseState::default()
        };
        assert_eq!(state.accumulate(4, 0, 127), (4, 0));
        assert_eq!(state.x, i32::MIN + 2);
    }

    #[test]
    fn counters_are_differenced_with_wrap() {
        let map = RegisterMap::default();
        let mut bus = idle_bus(&map);
        bus.script(map.joy0dat, [0x10FE, 0x0F03]);
        let mut mouse = decoder(&map);

        assert_eq!(mouse.read_counters(&mut bus, MousePort::Port0).unwrap(), (0, 0));
        assert_eq!(
            mouse.read_counters(&mut bus, MousePort::Port0).unwrap(),
            (5, -1)
        );
    }

    #[test]
    fn buttons_are_active_low() {
        let map = RegisterMap::default();
        let mut bus = idle_bus(&map);
        let mouse = MouseDecoder::new(&map, &[MousePort::Port0, MousePort::Port1], 127);

        assert_eq!(mouse.read_buttons(&mut bus, MousePort::Port0).unwrap(), 0);

        bus.set(map.ciaa_pra, u16::from(0xFF & !CIAA_FIRE0));
        bus.set(map.potgor, 0xFF00 & !POTGOR_DATLX0);
        assert_eq!(
            mouse.read_buttons(&mut bus, MousePort::Port0).unwrap(),
            BUTTON_LEFT | BUTTON_MIDDLE
        );
        assert_eq!(mouse.read_buttons(&mut bus, MousePort::Port1).unwrap(), 0);

        bus.set(map.potgor, 0xFF00 & !POTGOR_DATLY1);
        assert_eq!(
            mouse.read_buttons(&mut bus, MousePort::Port1).unwrap(),
            BUTTON_RIGHT
        );
    }

    #[test]
    fn init_only_touches_fire_lines() {
        let map = RegisterMap::default();
        let mut bus = idle_bus(&map);
        bus.set(map.ciaa_ddra, 0xFF);
        decoder(&map).init(&mut bus).unwrap();
        assert_eq!(bus.get(map.ciaa_ddra), 0xBF);
    }

    #[test]
    fn motion_then_buttons_in_one_group() {
        let map = RegisterMap::default();
        let mut bus = idle_bus(&map);
        let mut sink = RecordingSink::new();
        let mut mouse = decoder(&map);

        poll(&mut mouse, &mut bus, &mut sink);
        assert!(sink.take().is_empty());

        bus.set(map.joy0dat, 0xFD07);
        bus.set(map.ciaa_pra, u16::from(0xFF & !CIAA_FIRE0));
        poll(&mut mouse, &mut bus, &mut sink);

        assert_eq!(
            sink.take(),
            vec![
                InputEvent::RelativeMove { axis: RelAxis::X, delta: 7 },
                InputEvent::RelativeMove { axis: RelAxis::Y, delta: -3 },
                InputEvent::ButtonEdge { button: Button::Left, pressed: true },
                InputEvent::Sync,
            ]
        );

        bus.set(map.ciaa_pra, 0xFF);
        poll(&mut mouse, &mut bus, &mut sink);
        assert_eq!(
            sink.take(),
            vec![
                InputEvent::ButtonEdge { button: Button::Left, pressed: false },
                InputEvent::Sync,
            ]
        );
    }

    #[test]
    fn nonpositive_bound_reports_one_count_per_tick() {
        let mut state = MouseState::default();
        assert_eq!(state.accumulate(3, -2, 0), (1, -1));
        assert_eq!(state.accumulate(0, 0, -5), (1, -1));

        let map = RegisterMap::default();
        let mut bus = idle_bus(&map);
        let mut sink = RecordingSink::new();
        let mut mouse = MouseDecoder::new(&map, &[MousePort::Port0], -1);

        bus.script(map.joy0dat, [0x0000, 0x0005]);
        poll(&mut mouse, &mut bus, &mut sink);
        poll(&mut mouse, &mut bus, &mut sink);
        assert_eq!(
            sink.take(),
            vec![
                InputEvent::RelativeMove { axis: RelAxis::X, delta: 1 },
                InputEvent::Sync,
            ]
        );
        assert_eq!(mouse.state(MousePort::Port0).map(|s| s.pending()), Some((4, 0)));
    }

    #[test]
    fn counter_failure_still_reports_buttons() {
        let map = RegisterMap::default();
        let mut bus = idle_bus(&map);
        let mut sink = RecordingSink::new();
        let mut mouse = decoder(&map);

        bus.fail_reads(map.joy0dat, 1);
        bus.set(map.potgor, 0xFF00 & !POTGOR_DATLY0);

        let mut emitter = Emitter::new(&mut sink, Device::Mouse);
        assert!(mouse.poll(&mut bus, &mut emitter).is_err());
        emitter.finish();

        assert_eq!(
            sink.events(),
            vec![
                InputEvent::ButtonEdge { button: Button::Right, pressed: true },
                InputEvent::Sync,
            ]
        );
        assert_eq!(
            mouse.state(MousePort::Port0).map(|s| s.buttons),
            Some(BUTTON_RIGHT)
        );
    }

    #[test]
    fn port_numbers_parse() {
        assert_eq!(MousePort::try_from(1), Ok(MousePort::Port1));
        assert!(MousePort::try_from(2).is_err());
    }
}
