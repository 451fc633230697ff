//! A simulated machine with nothing plugged in or pressed.

use amiga_input::registers::{CIAA_FIRE0, CIAA_FIRE1, JOY0DAT_LIGHTPEN_BUTTON};
use amiga_input::{MemoryBus, RegisterMap};

/// POTGOR with every pot pin pulled high and the lightpen bit low.
const POTGOR_IDLE: u16 = 0x5500;

/// Register file of an idle machine: all keys up, mouse still, buttons
/// released, no lightpen.
pub fn idle_machine(map: &RegisterMap) -> MemoryBus {
    let bus = MemoryBus::new();
    bus.multiplex(map.row_sense, map.column_select, 0xFF);
    bus.input_pins(map.ciaa_pra, u16::from(CIAA_FIRE0 | CIAA_FIRE1));
    bus.set(map.ciaa_pra, 0xFF);
    bus.set(map.potgor, POTGOR_IDLE);
    bus.set(map.joy0dat, JOY0DAT_LIGHTPEN_BUTTON);
    bus
}
