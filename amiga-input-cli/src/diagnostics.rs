//! One-shot device check: initialize every device, read it once, print what
//! was seen, exit.

use std::io::Write;

use amiga_input::lightpen::{LIGHTPEN_X_MAX, LIGHTPEN_Y_MAX};
use amiga_input::mouse::{BUTTON_LEFT, BUTTON_MIDDLE, BUTTON_RIGHT};
use amiga_input::{
    KeyboardScanner, LightpenDecoder, MouseDecoder, PollerConfig, RegisterBus, RegisterMap,
};
use amiga_keymap::{AMIGA_KEYMAP, COLS, ROWS};
use anyhow::{Context, Result};

/// Run the checks and return how many devices failed.
///
/// Only a bus that cannot connect is an error; device failures are printed
/// and counted.
pub fn run<B: RegisterBus + ?Sized>(
    bus: &mut B,
    config: &PollerConfig,
    out: &mut impl Write,
) -> Result<usize> {
    let map = RegisterMap::for_chipset(config.chipset);
    bus.connect().context("connecting to the register channel")?;
    writeln!(out, "chipset: {}", map.chipset)?;

    let mut failed = 0;

    if config.keyboard && !check_keyboard(bus, config, &map, out)? {
        failed += 1;
    }
    if config.mouse && !check_mouse(bus, config, &map, out)? {
        failed += 1;
    }
    if config.lightpen && !check_lightpen(bus, &map, out)? {
        failed += 1;
    }

    Ok(failed)
}

fn check_keyboard<B: RegisterBus + ?Sized>(
    bus: &mut B,
    config: &PollerConfig,
    map: &RegisterMap,
    out: &mut impl Write,
) -> Result<bool> {
    let mut keyboard = KeyboardScanner::new(map, &AMIGA_KEYMAP, config.settle());
    let snapshot = match keyboard.init(bus).and_then(|()| keyboard.scan(bus)) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            writeln!(out, "keyboard: FAILED ({e})")?;
            return Ok(false);
        }
    };

    writeln!(out, "keyboard: ok")?;
    for row in 0..ROWS {
        let held: Vec<&str> = (0..COLS)
            .filter(|&col| snapshot.is_pressed(row, col))
            .filter_map(|col| AMIGA_KEYMAP.get(row, col))
            .map(|key| key.display_name())
            .collect();
        writeln!(
            out,
            "  row {row}: {:0width$b}  {}",
            snapshot.row_bits(row),
            if held.is_empty() { "-".to_string() } else { held.join(" ") },
            width = COLS,
        )?;
    }
    Ok(true)
}

fn check_mouse<B: RegisterBus + ?Sized>(
    bus: &mut B,
    config: &PollerConfig,
    map: &RegisterMap,
    out: &mut impl Write,
) -> Result<bool> {
    let mut mouse = MouseDecoder::new(map, &config.mouse_ports, config.max_mouse_delta);
    if let Err(e) = mouse.init(bus) {
        writeln!(out, "mouse: FAILED ({e})")?;
        return Ok(false);
    }

    let mut ok = true;
    for port in config.mouse_ports.iter().copied() {
        let index = port.index();
        match mouse.read_buttons(bus, port) {
            Ok(buttons) => {
                writeln!(out, "mouse port {index}: ok, buttons {}", button_names(buttons))?
            }
            Err(e) => {
                writeln!(out, "mouse port {index}: FAILED ({e})")?;
                ok = false;
            }
        }
    }
    Ok(ok)
}

fn button_names(buttons: u8) -> String {
    let names: Vec<&str> = [
        (BUTTON_LEFT, "left"),
        (BUTTON_RIGHT, "right"),
        (BUTTON_MIDDLE, "middle"),
    ]
    .into_iter()
    .filter(|&(mask, _)| buttons & mask != 0)
    .map(|(_, name)| name)
    .collect();

    if names.is_empty() {
        "none".to_string()
    } else {
        names.join("+")
    }
}

fn check_lightpen<B: RegisterBus + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
    out: &mut impl Write,
) -> Result<bool> {
    let mut lightpen = LightpenDecoder::new(map);
    if !lightpen.init(bus) {
        writeln!(out, "lightpen: latch not enabled, continuing")?;
    }

    let detected = match lightpen.detect(bus) {
        Ok(detected) => detected,
        Err(e) => {
            writeln!(out, "lightpen: FAILED ({e})")?;
            return Ok(false);
        }
    };

    if !detected {
        writeln!(out, "lightpen: not detected")?;
        return Ok(true);
    }

    match lightpen
        .read_position(bus)
        .and_then(|pos| Ok((pos, lightpen.read_button(bus)?)))
    {
        Ok(((x, y), pressed)) => {
            let tip = if pressed { "down" } else { "up" };
            writeln!(
                out,
                "lightpen: detected at ({x}, {y}) of {LIGHTPEN_X_MAX}x{LIGHTPEN_Y_MAX}, tip {tip}"
            )?;
            Ok(true)
        }
        Err(e) => {
            writeln!(out, "lightpen: FAILED ({e})")?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::idle_machine;
    use amiga_input::registers::POTGOR_LIGHTPEN;

    fn report(bus: &mut amiga_input::MemoryBus, config: &PollerConfig) -> (usize, String) {
        let mut out = Vec::new();
        let failed = run(bus, config, &mut out).unwrap();
        (failed, String::from_utf8(out).unwrap())
    }

    #[test]
    fn idle_machine_passes() {
        let config = PollerConfig { settle_us: 0, ..PollerConfig::default() };
        let mut bus = idle_machine(&RegisterMap::default());
        let (failed, text) = report(&mut bus, &config);

        assert_eq!(failed, 0);
        assert!(text.contains("keyboard: ok"));
        assert!(text.contains("  row 3: 111111111  -"));
        assert!(text.contains("mouse port 0: ok, buttons none"));
        assert!(text.contains("lightpen: not detected"));
    }

    #[test]
    fn held_keys_and_pen_are_shown() {
        let config = PollerConfig { settle_us: 0, ..PollerConfig::default() };
        let map = RegisterMap::default();
        let mut bus = idle_machine(&map);
        bus.set_multiplexed(
            map.row_sense,
            amiga_input::keyboard::column_select_word(0),
            0xF7,
        );
        bus.set(map.potgor, 0x5500 | POTGOR_LIGHTPEN);
        bus.set(map.vhposr, 0x1020);

        let (failed, text) = report(&mut bus, &config);
        assert_eq!(failed, 0);
        assert!(text.contains("  row 3: 111111110  A"));
        assert!(text.contains("lightpen: detected at (32, 32) of 752x568, tip up"));
    }

    #[test]
    fn device_failures_are_counted_not_fatal() {
        let config = PollerConfig { settle_us: 0, ..PollerConfig::default() };
        let map = RegisterMap::default();
        let mut bus = idle_machine(&map);
        bus.fail_reads(map.row_sense, usize::MAX);
        bus.fail_reads(map.potgor, usize::MAX);

        let (failed, text) = report(&mut bus, &config);
        assert_eq!(failed, 3);
        assert!(text.contains("keyboard: FAILED"));
        assert!(text.contains("mouse port 0: FAILED"));
    }

    #[test]
    fn connect_failure_is_an_error() {
        let mut bus = idle_machine(&RegisterMap::default());
        bus.fail_connect("offline");
        let mut out = Vec::new();
        assert!(run(&mut bus, &PollerConfig::default(), &mut out).is_err());
    }
}
