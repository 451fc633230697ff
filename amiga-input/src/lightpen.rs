//! Lightpen decoding from the beam-position latch.
//!
//! With BPLCON0.LPEN set, the beam counters latch when the pen sees the
//! beam. While the pen is detected its position and a two-level pressure
//! are reported every tick, plus the tip and pen-tool buttons when the tip
//! changes. When it goes away both buttons are released once if the tip
//! was down, and nothing more is sent until it is seen again.

use tracing::{debug, info, warn};

use crate::bus::RegisterBus;
use crate::error::BusError;
use crate::event::{AbsAxis, Button, Emitter};
use crate::registers::{RegisterMap, BPLCON0_LPEN, JOY0DAT_LIGHTPEN_BUTTON, POTGOR_LIGHTPEN};

/// Horizontal range reported to the host (standard overscan width).
pub const LIGHTPEN_X_MAX: i32 = 752;
/// Vertical range reported to the host (standard PAL overscan height).
pub const LIGHTPEN_Y_MAX: i32 = 568;

/// Pressure reported while the tip is down.
pub const PRESSURE_TIP_DOWN: i32 = 255;
/// Pressure reported while the pen hovers with the tip up.
pub const PRESSURE_TIP_UP: i32 = 128;

/// Decode the latched beam position into pixel coordinates.
///
/// VHPOSR carries V7-V0 in its low byte and H8-H1 in its high byte; the
/// low seven bits of VPOSR supply the upper vertical bits.
pub fn decode_beam_position(vhposr: u16, vposr: u16) -> (u16, u16) {
    let x = ((vhposr & 0xFF00) >> 8) << 1;
    let y = (vhposr & 0x00FF) | ((vposr & 0x007F) << 8);
    (x, y)
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LightpenPhase {
    /// Pen not seen; nothing is reported.
    #[default]
    Idle,
    /// Pen seen on the last tick; position is reported every tick.
    Active,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LightpenState {
    pub phase: LightpenPhase,
    pub x: u16,
    pub y: u16,
    pub button: bool,
}

impl LightpenState {
    pub fn detected(&self) -> bool {
        self.phase == LightpenPhase::Active
    }
}

pub struct LightpenDecoder {
    potgor: u32,
    vposr: u32,
    vhposr: u32,
    joy0dat: u32,
    bplcon0: u32,
    state: LightpenState,
}

impl LightpenDecoder {
    pub fn new(map: &RegisterMap) -> Self {
        Self {
            potgor: map.potgor,
            vposr: map.vposr,
            vhposr: map.vhposr,
            joy0dat: map.joy0dat,
            bplcon0: map.bplcon0,
            state: LightpenState::default(),
        }
    }

    /// Set BPLCON0.LPEN so the beam counters latch on the pen.
    ///
    /// Best effort: the pen may still be usable if the display software
    /// enables the latch itself, so a failure is only logged. Returns
    /// whether the latch was enabled.
    pub fn init<B: RegisterBus + ?Sized>(&mut self, bus: &mut B) -> bool {
        let result = bus
            .read_u16(self.bplcon0)
            .and_then(|bplcon0| bus.write_u16(self.bplcon0, bplcon0 | BPLCON0_LPEN));

        match result {
            Ok(()) => {
                info!("lightpen latch enabled");
                true
            }
            Err(e) => {
                warn!(error = %e, "could not enable lightpen latch in BPLCON0");
                false
            }
        }
    }

    pub fn detect<B: RegisterBus + ?Sized>(&self, bus: &mut B) -> Result<bool, BusError> {
        Ok(bus.read_u16(self.potgor)? & POTGOR_LIGHTPEN != 0)
    }

    pub fn read_position<B: RegisterBus + ?Sized>(
        &self,
        bus: &mut B,
    ) -> Result<(u16, u16), BusError> {
        let vhposr = bus.read_u16(self.vhposr)?;
        let vposr = bus.read_u16(self.vposr)?;
        Ok(decode_beam_position(vhposr, vposr))
    }

    /// Tip button, shared with the game port 0 fire line (active low).
    pub fn read_button<B: RegisterBus + ?Sized>(&self, bus: &mut B) -> Result<bool, BusError> {
        Ok(bus.read_u16(self.joy0dat)? & JOY0DAT_LIGHTPEN_BUTTON == 0)
    }

    pub fn state(&self) -> &LightpenState {
        &self.state
    }

    /// Run the detection state machine for one tick.
    ///
    /// Any read failure leaves the state untouched and emits nothing.
    pub fn poll<B: RegisterBus + ?Sized>(
        &mut self,
        bus: &mut B,
        emitter: &mut Emitter<'_>,
    ) -> Result<(), BusError> {
        if self.detect(bus)? {
            let (x, y) = self.read_position(bus)?;
            let button = self.read_button(bus)?;

            if !self.state.detected() {
                debug!(x, y, "lightpen detected");
            }

            emitter.absolute(AbsAxis::X, i32::from(x));
            emitter.absolute(AbsAxis::Y, i32::from(y));
            emitter.absolute(AbsAxis::Pressure, pressure(button));
            if button != self.state.button {
                emitter.button_edge(Button::Touch, button);
                emitter.button_edge(Button::ToolPen, button);
            }

            self.state = LightpenState {
                phase: LightpenPhase::Active,
                x,
                y,
                button,
            };
        } else if self.state.detected() {
            if self.state.button {
                emitter.button_edge(Button::Touch, false);
                emitter.button_edge(Button::ToolPen, false);
            }
            debug!("lightpen lost");
            self.state = LightpenState {
                phase: LightpenPhase::Idle,
                button: false,
                ..self.state
            };
        }

        Ok(())
    }
}

fn pressure(tip_down: bool) -> i32 {
    if tip_down {
        PRESSURE_TIP_DOWN
    } else {
        PRESSURE_TIP_UP
    }
}
