//! Runtime register address table.
//!
//! Decoders never hard-code chip addresses; they receive a [`RegisterMap`]
//! selected once for the machine's chipset. Only the registers the input
//! devices touch are listed here.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// CIA-A base address (odd addresses, low byte of the data bus).
pub const CIAA_BASE: u32 = 0xBFE001;
/// Custom chip register base (Agnus, Denise, Paula).
pub const CUSTOM_BASE: u32 = 0xDFF000;

// CIA register offsets
pub const CIAPRA: u32 = 0x0000; // Port A data
pub const CIAPRB: u32 = 0x0100; // Port B data
pub const CIADDRA: u32 = 0x0200; // Port A direction
pub const CIADDRB: u32 = 0x0300; // Port B direction

// Custom chip register offsets
pub const VPOSR: u32 = 0x004; // Vertical MSB + frame flop
pub const VHPOSR: u32 = 0x006; // Vertical/horizontal beam position
pub const JOY0DAT: u32 = 0x00A; // Game port 0 counters
pub const JOY1DAT: u32 = 0x00C; // Game port 1 counters
pub const POTGOR: u32 = 0x016; // Pot pin data read
pub const BPLCON0: u32 = 0x100; // Bitplane control 0

/// CIA-A port A fire button, game port 0 (active low).
pub const CIAA_FIRE0: u8 = 0x40;
/// CIA-A port A fire button, game port 1 (active low).
pub const CIAA_FIRE1: u8 = 0x80;

/// POTGOR pin data bits for the second and third mouse buttons (active low).
pub const POTGOR_DATLX0: u16 = 1 << 8;
pub const POTGOR_DATLY0: u16 = 1 << 10;
pub const POTGOR_DATLX1: u16 = 1 << 12;
pub const POTGOR_DATLY1: u16 = 1 << 14;
/// POTGOR bit that reads high while the lightpen sees the beam.
pub const POTGOR_LIGHTPEN: u16 = 1 << 15;

/// BPLCON0 light pen enable.
pub const BPLCON0_LPEN: u16 = 0x0008;
/// Lightpen button bit in JOY0DAT (active low).
pub const JOY0DAT_LIGHTPEN_BUTTON: u16 = 0x0040;

/// Custom chipset generation of the attached machine.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chipset {
    #[default]
    Ocs,
    Ecs,
    Aga,
}

impl Chipset {
    pub fn name(self) -> &'static str {
        match self {
            Chipset::Ocs => "ocs",
            Chipset::Ecs => "ecs",
            Chipset::Aga => "aga",
        }
    }
}

impl fmt::Display for Chipset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Chipset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ocs" => Ok(Chipset::Ocs),
            "ecs" => Ok(Chipset::Ecs),
            "aga" => Ok(Chipset::Aga),
            other => Err(format!("unknown chipset '{other}' (expected ocs, ecs or aga)")),
        }
    }
}

/// Absolute addresses of every register the input devices use.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegisterMap {
    pub chipset: Chipset,
    pub ciaa_pra: u32,
    pub ciaa_prb: u32,
    pub ciaa_ddra: u32,
    pub ciaa_ddrb: u32,
    /// Keyboard column strobe, written as an active-low 16-bit word.
    ///
    /// Assumes a 9-line strobe wired across the whole word at CIA-A port A;
    /// the stock port is 8 bits wide and shares bits 6 and 7 with the fire
    /// buttons, so this is not the standard CIA layout.
    pub column_select: u32,
    /// Keyboard row-sense lines, one bit per row.
    pub row_sense: u32,
    pub joy0dat: u32,
    pub joy1dat: u32,
    pub potgor: u32,
    pub vposr: u32,
    pub vhposr: u32,
    pub bplcon0: u32,
}

impl RegisterMap {
    /// Address table for the given chipset.
    ///
    /// The input registers sit at the same addresses on all three
    /// generations; BPLCON0 is decoded by Denise on OCS and by Agnus on
    /// ECS/AGA, but through the same custom-chip slot.
    pub fn for_chipset(chipset: Chipset) -> Self {
        let ciaa_pra = CIAA_BASE + CIAPRA;
        let ciaa_prb = CIAA_BASE + CIAPRB;
        Self {
            chipset,
            ciaa_pra,
            ciaa_prb,
            ciaa_ddra: CIAA_BASE + CIADDRA,
            ciaa_ddrb: CIAA_BASE + CIADDRB,
            column_select: ciaa_pra,
            row_sense: ciaa_prb,
            joy0dat: CUSTOM_BASE + JOY0DAT,
            joy1dat: CUSTOM_BASE + JOY1DAT,
            potgor: CUSTOM_BASE + POTGOR,
            vposr: CUSTOM_BASE + VPOSR,
            vhposr: CUSTOM_BASE + VHPOSR,
            bplcon0: CUSTOM_BASE + BPLCON0,
        }
    }
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self::for_chipset(Chipset::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocs_addresses() {
        let map = RegisterMap::for_chipset(Chipset::Ocs);
        assert_eq!(map.ciaa_pra, 0xBFE001);
        assert_eq!(map.ciaa_prb, 0xBFE101);
        assert_eq!(map.ciaa_ddra, 0xBFE201);
        assert_eq!(map.ciaa_ddrb, 0xBFE301);
        assert_eq!(map.vhposr, 0xDFF006);
        assert_eq!(map.potgor, 0xDFF016);
        assert_eq!(map.bplcon0, 0xDFF100);
        assert_eq!(map.column_select, map.ciaa_pra);
        assert_eq!(map.row_sense, map.ciaa_prb);
    }

    #[test]
    fn chipset_parses_case_insensitively() {
        assert_eq!("AGA".parse::<Chipset>(), Ok(Chipset::Aga));
        assert_eq!("ecs".parse::<Chipset>(), Ok(Chipset::Ecs));
        assert!("saga".parse::<Chipset>().is_err());
    }

    #[test]
    fn map_remembers_chipset() {
        assert_eq!(RegisterMap::for_chipset(Chipset::Ecs).chipset, Chipset::Ecs);
        assert_eq!(RegisterMap::default().chipset, Chipset::Ocs);
    }
}
