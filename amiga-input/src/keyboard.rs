//! Keyboard matrix scanning and edge detection.
//!
//! The Amiga keyboard matrix has 6 row-sense lines and 9 column-select
//! lines. A column is selected by driving its line low in the select word;
//! the row-sense register then reads one bit per row, low for a pressed
//! key. Each snapshot is compared with the previous one and every flipped
//! bit becomes exactly one key edge.

use std::thread;
use std::time::Duration;

use amiga_keymap::{KeyMap, COLS, ROWS};
use tracing::warn;

use crate::bus::RegisterBus;
use crate::error::BusError;
use crate::event::Emitter;
use crate::registers::RegisterMap;

/// Default settle time between selecting a column and reading its rows.
pub const DEFAULT_SETTLE: Duration = Duration::from_micros(100);

/// Select word with every column line inactive (high).
const DESELECT_ALL: u16 = 0xFFFF;

/// Active-low select word that drives only `col` low.
pub const fn column_select_word(col: usize) -> u16 {
    !(1u16 << col)
}

/// One complete read of the matrix.
///
/// Stored per column as the row-sense byte read for that column: bit `r`
/// is row `r`, `1` = released, `0` = pressed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MatrixSnapshot {
    columns: [u8; COLS],
}

impl MatrixSnapshot {
    /// Every key released.
    pub const fn released() -> Self {
        Self {
            columns: [0xFF; COLS],
        }
    }

    pub const fn from_columns(columns: [u8; COLS]) -> Self {
        Self { columns }
    }

    /// Row-sense byte of a column (active low).
    pub fn column(&self, col: usize) -> u8 {
        self.columns.get(col).copied().unwrap_or(0xFF)
    }

    pub fn is_pressed(&self, row: usize, col: usize) -> bool {
        row < ROWS && (self.column(col) >> row) & 1 == 0
    }

    /// Copy of this snapshot with one more key held down.
    pub fn with_pressed(mut self, row: usize, col: usize) -> Self {
        if let Some(bits) = self.columns.get_mut(col) {
            if row < ROWS {
                *bits &= !(1 << row);
            }
        }
        self
    }

    /// One matrix row as a column bitmask, bit `c` = column `c`
    /// (active low, like the hardware).
    pub fn row_bits(&self, row: usize) -> u16 {
        (0..COLS).fold(0u16, |bits, col| {
            if self.is_pressed(row, col) {
                bits
            } else {
                bits | (1 << col)
            }
        })
    }

    /// Positions of all pressed keys in row-major order.
    pub fn pressed_keys(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..ROWS)
            .flat_map(|row| (0..COLS).map(move |col| (row, col)))
            .filter(|&(row, col)| self.is_pressed(row, col))
    }

    /// Every position whose state differs from `previous`, in row-major
    /// order, with its new pressed state.
    pub fn changes<'a>(
        &'a self,
        previous: &'a MatrixSnapshot,
    ) -> impl Iterator<Item = (usize, usize, bool)> + 'a {
        (0..ROWS)
            .flat_map(|row| (0..COLS).map(move |col| (row, col)))
            .filter_map(move |(row, col)| {
                let pressed = self.is_pressed(row, col);
                (pressed != previous.is_pressed(row, col)).then_some((row, col, pressed))
            })
    }
}

impl Default for MatrixSnapshot {
    fn default() -> Self {
        Self::released()
    }
}

/// Scans the matrix and reports key edges.
pub struct KeyboardScanner {
    column_select: u32,
    row_sense: u32,
    select_direction: u32,
    sense_direction: u32,
    keymap: &'static KeyMap,
    settle: Duration,
    previous: MatrixSnapshot,
}

impl KeyboardScanner {
    pub fn new(registers: &RegisterMap, keymap: &'static KeyMap, settle: Duration) -> Self {
        Self {
            column_select: registers.column_select,
            row_sense: registers.row_sense,
            select_direction: registers.ciaa_ddra,
            sense_direction: registers.ciaa_ddrb,
            keymap,
            settle,
            previous: MatrixSnapshot::released(),
        }
    }

    /// Configure the select port as outputs and the sense port as inputs.
    pub fn init<B: RegisterBus + ?Sized>(&mut self, bus: &mut B) -> Result<(), BusError> {
        bus.write_u8(self.select_direction, 0xFF)?;
        bus.write_u8(self.sense_direction, 0x00)?;
        Ok(())
    }

    /// Read every column once.
    ///
    /// Fails on the first register error; nothing of a partial scan is kept.
    pub fn scan<B: RegisterBus + ?Sized>(&self, bus: &mut B) -> Result<MatrixSnapshot, BusError> {
        let mut columns = [0xFF; COLS];

        for (col, bits) in columns.iter_mut().enumerate() {
            bus.write_u16(self.column_select, column_select_word(col))?;
            if !self.settle.is_zero() {
                thread::sleep(self.settle);
            }
            *bits = bus.read_u8(self.row_sense)?;
        }

        bus.write_u16(self.column_select, DESELECT_ALL)?;

        Ok(MatrixSnapshot::from_columns(columns))
    }

    /// Emit one key edge per changed position and keep `snapshot` as the
    /// reference for the next tick. Returns the number of edges.
    pub fn process(&mut self, snapshot: MatrixSnapshot, emitter: &mut Emitter<'_>) -> usize {
        let mut edges = 0;

        for (row, col, pressed) in snapshot.changes(&self.previous) {
            match self.keymap.get(row, col) {
                Some(key) => {
                    emitter.key_edge(key, pressed);
                    edges += 1;
                }
                None => warn!(row, col, "matrix position has no key mapping"),
            }
        }

        self.previous = snapshot;
        edges
    }

    /// Scan, then process. On a scan failure nothing is emitted and the
    /// previous snapshot is kept.
    pub fn poll<B: RegisterBus + ?Sized>(
        &mut self,
        bus: &mut B,
        emitter: &mut Emitter<'_>,
    ) -> Result<usize, BusError> {
        let snapshot = self.scan(bus)?;
        Ok(self.process(snapshot, emitter))
    }

    /// The last successfully processed snapshot.
    pub fn snapshot(&self) -> &MatrixSnapshot {
        &self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryBus, Width};
    use crate::event::{InputEvent, RecordingSink};
    use crate::Device;
    use amiga_keymap::{KeyCode, AMIGA_KEYMAP};

    fn matrix_bus(map: &RegisterMap, snapshot: &MatrixSnapshot) -> MemoryBus {
        let bus = MemoryBus::new();
        bus.multiplex(map.row_sense, map.column_select, 0xFF);
        for col in 0..COLS {
            bus.set_multiplexed(
                map.row_sense,
                column_select_word(col),
                u16::from(snapshot.column(col)),
            );
        }
        bus
    }

    fn scanner(map: &RegisterMap) -> KeyboardScanner {
        KeyboardScanner::new(map, &AMIGA_KEYMAP, Duration::ZERO)
    }

    #[test]
    fn snapshot_helpers() {
        let snap = MatrixSnapshot::released().with_pressed(3, 0).with_pressed(5, 8);
        assert!(snap.is_pressed(3, 0));
        assert!(!snap.is_pressed(0, 3));
        assert_eq!(snap.column(0), 0xF7);
        assert_eq!(snap.row_bits(3), 0x1FE);
        assert_eq!(snap.pressed_keys().collect::<Vec<_>>(), vec![(3, 0), (5, 8)]);
    }

    #[test]
    fn init_sets_port_directions() {
        let map = RegisterMap::default();
        let mut bus = MemoryBus::new();
        scanner(&map).init(&mut bus).unwrap();
        assert_eq!(
            bus.writes(),
            vec![
                (map.ciaa_ddra, Width::Byte, 0xFF),
                (map.ciaa_ddrb, Width::Byte, 0x00),
            ]
        );
    }

    #[test]
    fn scan_strobes_each_column() {
        let map = RegisterMap::default();
        let pressed = MatrixSnapshot::released().with_pressed(2, 4);
        let mut bus = matrix_bus(&map, &pressed);

        let snapshot = scanner(&map).scan(&mut bus).unwrap();
        assert_eq!(snapshot, pressed);

        let selects: Vec<u16> = bus
            .writes()
            .into_iter()
            .filter(|&(addr, _, _)| addr == map.column_select)
            .map(|(_, _, value)| value)
            .collect();
        assert_eq!(selects.len(), COLS + 1);
        assert_eq!(selects[0], 0xFFFE);
        assert_eq!(selects[8], 0xFEFF);
        assert_eq!(selects[COLS], 0xFFFF);
    }

    #[test]
    fn first_scan_reports_only_held_keys() {
        let map = RegisterMap::default();
        let mut bus = matrix_bus(&map, &MatrixSnapshot::released().with_pressed(3, 0));
        let mut sink = RecordingSink::new();
        let mut kb = scanner(&map);

        let mut emitter = Emitter::new(&mut sink, Device::Keyboard);
        assert_eq!(kb.poll(&mut bus, &mut emitter).unwrap(), 1);
        emitter.finish();

        assert_eq!(
            sink.events(),
            vec![
                InputEvent::KeyEdge { key: KeyCode::A, pressed: true },
                InputEvent::Sync,
            ]
        );
    }

    #[test]
    fn release_produces_one_edge() {
        let map = RegisterMap::default();
        let mut sink = RecordingSink::new();
        let mut kb = scanner(&map);

        let held = MatrixSnapshot::released().with_pressed(0, 0);
        let mut emitter = Emitter::new(&mut sink, Device::Keyboard);
        kb.process(held, &mut emitter);
        kb.process(held, &mut emitter);
        kb.process(MatrixSnapshot::released(), &mut emitter);
        emitter.finish();

        assert_eq!(
            sink.events(),
            vec![
                InputEvent::KeyEdge { key: KeyCode::F1, pressed: true },
                InputEvent::KeyEdge { key: KeyCode::F1, pressed: false },
                InputEvent::Sync,
            ]
        );
    }

    #[test]
    fn edges_come_in_row_major_order() {
        let map = RegisterMap::default();
        let mut sink = RecordingSink::new();
        let mut kb = scanner(&map);

        let snap = MatrixSnapshot::released()
            .with_pressed(4, 8)
            .with_pressed(1, 2)
            .with_pressed(1, 0);
        let mut emitter = Emitter::new(&mut sink, Device::Keyboard);
        kb.process(snap, &mut emitter);
        emitter.finish();

        let keys: Vec<KeyCode> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::KeyEdge { key, .. } => Some(key),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec![KeyCode::N1, KeyCode::N3, KeyCode::Enter]);
    }

    #[test]
    fn failed_scan_keeps_previous_state() {
        let map = RegisterMap::default();
        let mut bus = matrix_bus(&map, &MatrixSnapshot::released().with_pressed(2, 0));
        let mut sink = RecordingSink::new();
        let mut kb = scanner(&map);

        bus.fail_reads(map.row_sense, 1);
        let mut emitter = Emitter::new(&mut sink, Device::Keyboard);
        assert!(kb.poll(&mut bus, &mut emitter).is_err());
        assert_eq!(emitter.finish().delivered, 0);
        assert_eq!(kb.snapshot(), &MatrixSnapshot::released());

        let mut emitter = Emitter::new(&mut sink, Device::Keyboard);
        assert_eq!(kb.poll(&mut bus, &mut emitter).unwrap(), 1);
        emitter.finish();
        assert_eq!(
            sink.events()[0],
            InputEvent::KeyEdge { key: KeyCode::Q, pressed: true }
        );
    }
}
