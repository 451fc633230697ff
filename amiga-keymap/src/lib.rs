//! Amiga keyboard matrix geometry and the matrix-to-host key table.
//!
//! This crate is `no_std` so the table can be shared between the polling
//! core and the command-line tooling without pulling in anything else.

#![cfg_attr(not(test), no_std)]

/// Number of row-sense lines in the matrix.
pub const ROWS: usize = 6;
/// Number of column-select lines in the matrix.
pub const COLS: usize = 9;

/// Host key codes, numbered as the Linux input subsystem numbers them
/// (`linux/input-event-codes.h`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum KeyCode {
    Tab = 15,
    Enter = 28,
    Space = 57,

    // Number row
    N1 = 2,
    N2 = 3,
    N3 = 4,
    N4 = 5,
    N5 = 6,
    N6 = 7,
    N7 = 8,
    N8 = 9,
    N9 = 10,

    // Letters
    Q = 16,
    W = 17,
    E = 18,
    R = 19,
    T = 20,
    Y = 21,
    U = 22,
    I = 23,
    O = 24,
    A = 30,
    S = 31,
    D = 32,
    F = 33,
    G = 34,
    H = 35,
    J = 36,
    K = 37,
    L = 38,
    Z = 44,
    X = 45,
    C = 46,
    V = 47,
    B = 48,
    N = 49,
    M = 50,

    // Punctuation
    Backslash = 43,
    Comma = 51,
    Dot = 52,
    Slash = 53,

    // Function keys
    F1 = 59,
    F2 = 60,
    F3 = 61,
    F4 = 62,
    F5 = 63,
    F6 = 64,
    F7 = 65,
    F8 = 66,
    F9 = 67,

    // Modifiers
    LCtrl = 29,
    LShift = 42,
    RShift = 54,
    LAlt = 56,
}

impl KeyCode {
    /// Numeric host key code.
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Check if this key is a modifier (shift, control, alt).
    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            KeyCode::LCtrl | KeyCode::LShift | KeyCode::RShift | KeyCode::LAlt
        )
    }

    /// Short label used in keymap listings and renderings.
    pub fn display_name(self) -> &'static str {
        match self {
            KeyCode::Tab => "Tab",
            KeyCode::Enter => "Ent",
            KeyCode::Space => "Spc",
            KeyCode::N1 => "1",
            KeyCode::N2 => "2",
            KeyCode::N3 => "3",
            KeyCode::N4 => "4",
            KeyCode::N5 => "5",
            KeyCode::N6 => "6",
            KeyCode::N7 => "7",
            KeyCode::N8 => "8",
            KeyCode::N9 => "9",
            KeyCode::Q => "Q",
            KeyCode::W => "W",
            KeyCode::E => "E",
            KeyCode::R => "R",
            KeyCode::T => "T",
            KeyCode::Y => "Y",
            KeyCode::U => "U",
            KeyCode::I => "I",
            KeyCode::O => "O",
            KeyCode::A => "A",
            KeyCode::S => "S",
            KeyCode::D => "D",
            KeyCode::F => "F",
            KeyCode::G => "G",
            KeyCode::H => "H",
            KeyCode::J => "J",
            KeyCode::K => "K",
            KeyCode::L => "L",
            KeyCode::Z => "Z",
            KeyCode::X => "X",
            KeyCode::C => "C",
            KeyCode::V => "V",
            KeyCode::B => "B",
            KeyCode::N => "N",
            KeyCode::M => "M",
            KeyCode::Backslash => "\\",
            KeyCode::Comma => ",",
            KeyCode::Dot => ".",
            KeyCode::Slash => "/",
            KeyCode::F1 => "F1",
            KeyCode::F2 => "F2",
            KeyCode::F3 => "F3",
            KeyCode::F4 => "F4",
            KeyCode::F5 => "F5",
            KeyCode::F6 => "F6",
            KeyCode::F7 => "F7",
            KeyCode::F8 => "F8",
            KeyCode::F9 => "F9",
            KeyCode::LCtrl => "Ctrl",
            KeyCode::LShift => "Shft",
            KeyCode::RShift => "RSft",
            KeyCode::LAlt => "Alt",
        }
    }
}

/// Immutable (row, column) → key code table covering every matrix position.
#[derive(Debug, PartialEq, Eq)]
pub struct KeyMap {
    table: [[KeyCode; COLS]; ROWS],
}

impl KeyMap {
    pub const fn new(table: [[KeyCode; COLS]; ROWS]) -> Self {
        Self { table }
    }

    /// Key at a matrix position, or `None` outside the matrix.
    pub fn get(&self, row: usize, col: usize) -> Option<KeyCode> {
        self.table.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Iterate over `(row, col, key)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, KeyCode)> + '_ {
        self.table.iter().enumerate().flat_map(|(row, keys)| {
            keys.iter()
                .enumerate()
                .map(move |(col, &key)| (row, col, key))
        })
    }

    /// Find the matrix position of a key.
    pub fn position(&self, key: KeyCode) -> Option<(usize, usize)> {
        self.iter()
            .find(|&(_, _, k)| k == key)
            .map(|(row, col, _)| (row, col))
    }
}

/// Shorthand aliases for readability.
const TAB: KeyCode = KeyCode::Tab;
const ENT: KeyCode = KeyCode::Enter;
const SPC: KeyCode = KeyCode::Space;
const LCTL: KeyCode = KeyCode::LCtrl;
const LSFT: KeyCode = KeyCode::LShift;
const RSFT: KeyCode = KeyCode::RShift;
const LALT: KeyCode = KeyCode::LAlt;

/// The Amiga keyboard matrix as wired on the companion board.
///
/// Row 0 carries the function keys, rows 1-4 the main block and row 5 the
/// space bar, modifiers and the remaining punctuation.
pub static AMIGA_KEYMAP: KeyMap = KeyMap::new([
    // Row 0: F1 .. F9
    [KeyCode::F1, KeyCode::F2, KeyCode::F3, KeyCode::F4, KeyCode::F5,
     KeyCode::F6, KeyCode::F7, KeyCode::F8, KeyCode::F9],

    // Row 1: number row
    [KeyCode::N1, KeyCode::N2, KeyCode::N3, KeyCode::N4, KeyCode::N5,
     KeyCode::N6, KeyCode::N7, KeyCode::N8, KeyCode::N9],

    // Row 2: top letter row
    [KeyCode::Q, KeyCode::W, KeyCode::E, KeyCode::R, KeyCode::T,
     KeyCode::Y, KeyCode::U, KeyCode::I, KeyCode::O],

    // Row 3: home row
    [KeyCode::A, KeyCode::S, KeyCode::D, KeyCode::F, KeyCode::G,
     KeyCode::H, KeyCode::J, KeyCode::K, KeyCode::L],

    // Row 4: bottom letter row, Tab and Enter
    [KeyCode::Z, KeyCode::X, KeyCode::C, KeyCode::V, KeyCode::B,
     KeyCode::N, KeyCode::M, TAB, ENT],

    // Row 5: space, modifiers, punctuation
    [SPC, LSFT, RSFT, LCTL, LALT,
     KeyCode::Backslash, KeyCode::Comma, KeyCode::Dot, KeyCode::Slash],
]);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_position_is_mapped_once() {
        let keys: HashSet<KeyCode> = AMIGA_KEYMAP.iter().map(|(_, _, k)| k).collect();
        assert_eq!(keys.len(), ROWS * COLS);
    }

    #[test]
    fn lookup_outside_matrix_is_none() {
        assert_eq!(AMIGA_KEYMAP.get(ROWS, 0), None);
        assert_eq!(AMIGA_KEYMAP.get(0, COLS), None);
    }

    #[test]
    fn home_row_starts_with_a() {
        assert_eq!(AMIGA_KEYMAP.get(3, 0), Some(KeyCode::A));
        assert_eq!(KeyCode::A.code(), 30);
        assert_eq!(AMIGA_KEYMAP.position(KeyCode::Enter), Some((4, 8)));
    }

    #[test]
    fn modifiers_are_flagged() {
        assert!(KeyCode::LShift.is_modifier());
        assert!(!KeyCode::Space.is_modifier());
    }
}
