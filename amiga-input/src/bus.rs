//! Register access over the companion board's remote channel.
//!
//! The channel itself lives outside this crate; decoders only see the
//! [`RegisterBus`] trait. [`MemoryBus`] is an in-memory register file used
//! for tests and for running against a simulated machine.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::BusError;

/// Access width of a register operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Width {
    Bit,
    Byte,
    Word,
}

impl Width {
    pub const fn bits(self) -> u32 {
        match self {
            Width::Bit => 1,
            Width::Byte => 8,
            Width::Word => 16,
        }
    }

    /// Mask selecting the bits a value of this width may carry.
    pub const fn mask(self) -> u16 {
        match self {
            Width::Bit => 0x0001,
            Width::Byte => 0x00FF,
            Width::Word => 0xFFFF,
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Primitive, synchronous and fallible access to the legacy machine's
/// registers.
pub trait RegisterBus {
    /// Bring the channel up. Called once before any device is initialized.
    fn connect(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    fn read(&mut self, address: u32, width: Width) -> Result<u16, BusError>;

    fn write(&mut self, address: u32, width: Width, value: u16) -> Result<(), BusError>;

    fn read_u8(&mut self, address: u32) -> Result<u8, BusError> {
        // Masked to the width, so the truncation is exact.
        self.read(address, Width::Byte).map(|v| (v & 0xFF) as u8)
    }

    fn read_u16(&mut self, address: u32) -> Result<u16, BusError> {
        self.read(address, Width::Word)
    }

    fn write_u8(&mut self, address: u32, value: u8) -> Result<(), BusError> {
        self.write(address, Width::Byte, u16::from(value))
    }

    fn write_u16(&mut self, address: u32, value: u16) -> Result<(), BusError> {
        self.write(address, Width::Word, value)
    }
}

impl<B: RegisterBus + ?Sized> RegisterBus for Box<B> {
    fn connect(&mut self) -> Result<(), BusError> {
        (**self).connect()
    }

    fn read(&mut self, address: u32, width: Width) -> Result<u16, BusError> {
        (**self).read(address, width)
    }

    fn write(&mut self, address: u32, width: Width, value: u16) -> Result<(), BusError> {
        (**self).write(address, width, value)
    }
}

/// A register whose read value depends on what was last written to a
/// select register (a column-strobed matrix, for instance).
struct Multiplexed {
    select: u32,
    values: HashMap<u16, u16>,
    default: u16,
}

#[derive(Default)]
struct Inner {
    registers: HashMap<u32, u16>,
    /// Bits driven from outside the machine; writes leave them alone.
    input_pins: HashMap<u32, u16>,
    /// Value last written per address, before input pins are applied.
    latched: HashMap<u32, u16>,
    scripted: HashMap<u32, VecDeque<u16>>,
    multiplexed: HashMap<u32, Multiplexed>,
    read_faults: HashMap<u32, usize>,
    write_faults: HashMap<u32, usize>,
    connect_fault: Option<String>,
    writes: Vec<(u32, Width, u16)>,
    reads: usize,
}

/// Takes one pending fault for `address`, if any.
fn take_fault(faults: &mut HashMap<u32, usize>, address: u32) -> bool {
    match faults.get_mut(&address) {
        Some(remaining) if *remaining > 0 => {
            if *remaining != usize::MAX {
                *remaining -= 1;
            }
            true
        }
        _ => false,
    }
}

/// In-memory register file implementing [`RegisterBus`].
///
/// Clones share the same registers, so a test can keep a handle while the
/// poller thread owns another.
///
/// Reads resolve in this order: injected fault, scripted value queue,
/// multiplexed table, plain register value (0 when never set).
///
/// Bits marked with [`MemoryBus::input_pins`] model port lines that are
/// inputs, like the fire buttons on CIA-A port A: a write stores the other
/// bits and the pinned ones keep the level last given to [`MemoryBus::set`].
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the steady value of a register.
    pub fn set(&self, address: u32, value: u16) {
        self.lock().registers.insert(address, value);
    }

    /// Current value of a register as last set or written.
    pub fn get(&self, address: u32) -> u16 {
        self.lock().registers.get(&address).copied().unwrap_or(0)
    }

    /// Mark the bits of `mask` at `address` as input pins.
    pub fn input_pins(&self, address: u32, mask: u16) {
        self.lock().input_pins.insert(address, mask);
    }

    /// Queue values returned by successive reads before falling back to the
    /// steady value.
    pub fn script(&self, address: u32, values: impl IntoIterator<Item = u16>) {
        self.lock()
            .scripted
            .entry(address)
            .or_default()
            .extend(values);
    }

    /// Make `address` return `values[selector]`, where the selector is the
    /// value last written to `select` (its set value if never written), or
    /// `default` for unknown selectors.
    pub fn multiplex(&self, address: u32, select: u32, default: u16) {
        self.lock().multiplexed.insert(
            address,
            Multiplexed {
                select,
                values: HashMap::new(),
                default,
            },
        );
    }

    /// Set the value a multiplexed register reads for one selector.
    pub fn set_multiplexed(&self, address: u32, selector: u16, value: u16) {
        if let Some(mux) = self.lock().multiplexed.get_mut(&address) {
            mux.values.insert(selector, value);
        }
    }

    /// Fail the next `count` reads of `address` (`usize::MAX` fails forever).
    pub fn fail_reads(&self, address: u32, count: usize) {
        self.lock().read_faults.insert(address, count);
    }

    /// Fail the next `count` writes to `address` (`usize::MAX` fails forever).
    pub fn fail_writes(&self, address: u32, count: usize) {
        self.lock().write_faults.insert(address, count);
    }

    /// Make `connect` fail with the given reason.
    pub fn fail_connect(&self, reason: impl Into<String>) {
        self.lock().connect_fault = Some(reason.into());
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        let mut inner = self.lock();
        inner.read_faults.clear();
        inner.write_faults.clear();
        inner.connect_fault = None;
    }

    /// All successful writes so far, oldest first.
    pub fn writes(&self) -> Vec<(u32, Width, u16)> {
        self.lock().writes.clone()
    }

    /// Number of successful reads so far.
    pub fn read_count(&self) -> usize {
        self.lock().reads
    }
}

impl RegisterBus for MemoryBus {
    fn connect(&mut self) -> Result<(), BusError> {
        match self.lock().connect_fault.clone() {
            Some(reason) => Err(BusError::Connect(reason)),
            None => Ok(()),
        }
    }

    fn read(&mut self, address: u32, width: Width) -> Result<u16, BusError> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if take_fault(&mut inner.read_faults, address) {
            return Err(BusError::Read {
                address,
                width,
                reason: "injected fault".to_string(),
            });
        }

        let scripted = inner
            .scripted
            .get_mut(&address)
            .and_then(VecDeque::pop_front);
        let value = match (scripted, inner.multiplexed.get(&address)) {
            (Some(v), _) => v,
            (None, Some(mux)) => {
                let selector = inner
                    .latched
                    .get(&mux.select)
                    .or_else(|| inner.registers.get(&mux.select))
                    .copied()
                    .unwrap_or(0);
                mux.values.get(&selector).copied().unwrap_or(mux.default)
            }
            (None, None) => inner.registers.get(&address).copied().unwrap_or(0),
        };

        inner.reads += 1;
        Ok(value & width.mask())
    }

    fn write(&mut self, address: u32, width: Width, value: u16) -> Result<(), BusError> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if take_fault(&mut inner.write_faults, address) {
            return Err(BusError::Write {
                address,
                width,
                value,
                reason: "injected fault".to_string(),
            });
        }

        let value = value & width.mask();
        let pins = inner.input_pins.get(&address).copied().unwrap_or(0);
        let level = inner.registers.get(&address).copied().unwrap_or(0);
        inner.registers.insert(address, (level & pins) | (value & !pins));
        inner.latched.insert(address, value);
        inner.writes.push((address, width, value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_masked_to_width() {
        let mut bus = MemoryBus::new();
        bus.set(0x100, 0xABCD);
        assert_eq!(bus.read(0x100, Width::Word).unwrap(), 0xABCD);
        assert_eq!(bus.read(0x100, Width::Byte).unwrap(), 0xCD);
        assert_eq!(bus.read(0x100, Width::Bit).unwrap(), 0x1);
        assert_eq!(bus.read_u8(0x100).unwrap(), 0xCD);
    }

    #[test]
    fn scripted_values_come_before_steady_value() {
        let mut bus = MemoryBus::new();
        bus.set(0x10, 7);
        bus.script(0x10, [1, 2]);
        assert_eq!(bus.read_u16(0x10).unwrap(), 1);
        assert_eq!(bus.read_u16(0x10).unwrap(), 2);
        assert_eq!(bus.read_u16(0x10).unwrap(), 7);
    }

    #[test]
    fn multiplexed_register_follows_select() {
        let mut bus = MemoryBus::new();
        bus.multiplex(0x20, 0x30, 0xFF);
        bus.set_multiplexed(0x20, 0xFFFE, 0xF7);

        bus.write_u16(0x30, 0xFFFE).unwrap();
        assert_eq!(bus.read_u8(0x20).unwrap(), 0xF7);

        bus.write_u16(0x30, 0xFFFD).unwrap();
        assert_eq!(bus.read_u8(0x20).unwrap(), 0xFF);
    }

    #[test]
    fn writes_leave_input_pins_alone() {
        let mut bus = MemoryBus::new();
        bus.multiplex(0x20, 0x30, 0xFF);
        bus.set_multiplexed(0x20, 0xFFFE, 0xF7);
        bus.input_pins(0x30, 0x00C0);
        bus.set(0x30, 0x00BF);

        bus.write_u16(0x30, 0xFFFE).unwrap();
        assert_eq!(bus.read_u8(0x30).unwrap(), 0xBE);
        // The strobe still selects by what was written.
        assert_eq!(bus.read_u8(0x20).unwrap(), 0xF7);

        bus.write_u16(0x30, 0x0000).unwrap();
        assert_eq!(bus.get(0x30), 0x0080);
        assert_eq!(bus.writes().last(), Some(&(0x30, Width::Word, 0x0000)));

        bus.set(0x30, 0x00FF);
        assert_eq!(bus.read_u8(0x30).unwrap(), 0xFF);
    }

    #[test]
    fn injected_faults_are_consumed() {
        let mut bus = MemoryBus::new();
        bus.fail_reads(0x40, 1);
        assert!(matches!(
            bus.read_u8(0x40),
            Err(BusError::Read { address: 0x40, .. })
        ));
        assert_eq!(bus.read_u8(0x40).unwrap(), 0);

        bus.fail_writes(0x40, usize::MAX);
        assert!(bus.write_u8(0x40, 1).is_err());
        assert!(bus.write_u8(0x40, 1).is_err());
        bus.clear_faults();
        assert!(bus.write_u8(0x40, 1).is_ok());
    }

    #[test]
    fn clones_share_registers() {
        let bus = MemoryBus::new();
        let mut handle = bus.clone();
        handle.write_u8(0x50, 0x12).unwrap();
        assert_eq!(bus.get(0x50), 0x12);
        assert_eq!(bus.writes(), vec![(0x50, Width::Byte, 0x12)]);
    }

    #[test]
    fn connect_fault_is_reported() {
        let mut bus = MemoryBus::new();
        bus.fail_connect("no channel");
        assert_eq!(
            bus.connect(),
            Err(BusError::Connect("no channel".to_string()))
        );
    }
}
