//! # I/O Bus
//!
//! Hardware access used by interrupt programs.
//!
//! Two address spaces exist: the port space (x86 `in`/`out`) and the
//! memory-mapped space. Both are accessed at 8, 16 or 32 bits and carry
//! the value in the low bits of a `u32`.
//!
//! ## Implementation Notes
//!
//! Implementations must guarantee:
//! - Reads return only the low `width` bits (upper bits zero)
//! - Writes use only the low `width` bits of `value`
//! - Operations complete synchronously and never block

use std::collections::{HashMap, VecDeque};

/// Address space of an I/O access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoSpace {
    /// Port I/O space
    Port,
    /// Memory-mapped I/O space
    Memory,
}

/// Width of an I/O access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoWidth {
    Bits8,
    Bits16,
    Bits32,
}

impl IoWidth {
    /// Returns the access width in bits
    pub const fn bits(self) -> u32 {
        match self {
            IoWidth::Bits8 => 8,
            IoWidth::Bits16 => 16,
            IoWidth::Bits32 => 32,
        }
    }

    /// Returns a mask covering the low `bits()` bits
    pub const fn mask(self) -> u32 {
        match self {
            IoWidth::Bits8 => 0xff,
            IoWidth::Bits16 => 0xffff,
            IoWidth::Bits32 => 0xffff_ffff,
        }
    }

    /// Returns true if `value` fits in this width
    pub const fn fits(self, value: u32) -> bool {
        value & !self.mask() == 0
    }
}

/// Hardware I/O bus
///
/// Shared between processors; implementations synchronise internally
/// where they need to.
pub trait IoBus: Send + Sync {
    /// Reads `width` bits from `addr` in `space`
    fn read(&self, space: IoSpace, width: IoWidth, addr: usize) -> u32;

    /// Writes the low `width` bits of `value` to `addr` in `space`
    fn write(&self, space: IoSpace, width: IoWidth, addr: usize, value: u32);
}

/// A single recorded access on a [`FakeIoBus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoAccess {
    pub space: IoSpace,
    pub width: IoWidth,
    pub addr: usize,
    pub value: u32,
}

impl IoAccess {
    /// Creates a port-space access record
    pub fn port(width: IoWidth, addr: usize, value: u32) -> Self {
        Self {
            space: IoSpace::Port,
            width,
            addr,
            value,
        }
    }

    /// Creates a memory-space access record
    pub fn memory(width: IoWidth, addr: usize, value: u32) -> Self {
        Self {
            space: IoSpace::Memory,
            width,
            addr,
            value,
        }
    }
}

#[derive(Debug, Default)]
struct FakeIoState {
    registers: HashMap<(IoSpace, usize), u32>,
    scripted: HashMap<(IoSpace, usize), VecDeque<u32>>,
    reads: Vec<IoAccess>,
    writes: Vec<IoAccess>,
}

/// Fake I/O bus for testing
///
/// Every address behaves like a plain register: a read returns the last
/// value written (or set), zero if never touched. Scripted reads take
/// precedence and are consumed in order, which models status registers
/// that change under the device's control.
///
/// ## Example
///
/// ```rust
/// use hal::{FakeIoBus, IoBus, IoSpace, IoWidth};
///
/// let bus = FakeIoBus::new();
/// bus.script_reads(IoSpace::Port, 0x300, &[0x01, 0x00]);
///
/// assert_eq!(bus.read(IoSpace::Port, IoWidth::Bits8, 0x300), 0x01);
/// assert_eq!(bus.read(IoSpace::Port, IoWidth::Bits8, 0x300), 0x00);
/// ```
#[derive(Debug, Default)]
pub struct FakeIoBus {
    state: spin::Mutex<FakeIoState>,
}

impl FakeIoBus {
    /// Creates a fake bus where every register reads as zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current value of a register
    pub fn set_register(&self, space: IoSpace, addr: usize, value: u32) {
        self.state.lock().registers.insert((space, addr), value);
    }

    /// Returns the current value of a register
    pub fn register(&self, space: IoSpace, addr: usize) -> u32 {
        self.state
            .lock()
            .registers
            .get(&(space, addr))
            .copied()
            .unwrap_or(0)
    }

    /// Queues values returned by the next reads of one register
    pub fn script_reads(&self, space: IoSpace, addr: usize, values: &[u32]) {
        self.state
            .lock()
            .scripted
            .entry((space, addr))
            .or_default()
            .extend(values.iter().copied());
    }

    /// Returns the number of scripted reads not yet consumed
    pub fn remaining_reads(&self) -> usize {
        self.state.lock().scripted.values().map(VecDeque::len).sum()
    }

    /// Returns all reads performed so far
    pub fn reads(&self) -> Vec<IoAccess> {
        self.state.lock().reads.clone()
    }

    /// Returns all writes performed so far
    pub fn writes(&self) -> Vec<IoAccess> {
        self.state.lock().writes.clone()
    }

    /// Clears the recorded reads and writes
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.reads.clear();
        state.writes.clear();
    }
}

impl IoBus for FakeIoBus {
    fn read(&self, space: IoSpace, width: IoWidth, addr: usize) -> u32 {
        let mut state = self.state.lock();
        let scripted = state
            .scripted
            .get_mut(&(space, addr))
            .and_then(VecDeque::pop_front);
        let raw = match scripted {
            Some(value) => value,
            None => state.registers.get(&(space, addr)).copied().unwrap_or(0),
        };
        let value = raw & width.mask();
        state.reads.push(IoAccess {
            space,
            width,
            addr,
            value,
        });
        value
    }

    fn write(&self, space: IoSpace, width: IoWidth, addr: usize, value: u32) {
        let value = value & width.mask();
        let mut state = self.state.lock();
        state.registers.insert((space, addr), value);
        state.writes.push(IoAccess {
            space,
            width,
            addr,
            value,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_masks() {
        assert_eq!(IoWidth::Bits8.mask(), 0xff);
        assert_eq!(IoWidth::Bits16.bits(), 16);
        assert!(IoWidth::Bits8.fits(0xff));
        assert!(!IoWidth::Bits8.fits(0x100));
        assert!(IoWidth::Bits32.fits(u32::MAX));
    }

    #[test]
    fn test_unwritten_register_reads_zero() {
        let bus = FakeIoBus::new();
        assert_eq!(bus.read(IoSpace::Memory, IoWidth::Bits32, 0x1000), 0);
    }

    #[test]
    fn test_write_then_read_back() {
        let bus = FakeIoBus::new();
        bus.write(IoSpace::Port, IoWidth::Bits16, 0x60, 0xbeef);
        assert_eq!(bus.read(IoSpace::Port, IoWidth::Bits16, 0x60), 0xbeef);
        assert_eq!(bus.writes(), vec![IoAccess::port(IoWidth::Bits16, 0x60, 0xbeef)]);
    }

    #[test]
    fn test_read_is_truncated_to_width() {
        let bus = FakeIoBus::new();
        bus.set_register(IoSpace::Port, 0x20, 0x1234_5678);
        assert_eq!(bus.read(IoSpace::Port, IoWidth::Bits8, 0x20), 0x78);
        assert_eq!(bus.read(IoSpace::Port, IoWidth::Bits16, 0x20), 0x5678);
    }

    #[test]
    fn test_spaces_are_separate() {
        let bus = FakeIoBus::new();
        bus.set_register(IoSpace::Port, 0x40, 1);
        bus.set_register(IoSpace::Memory, 0x40, 2);
        assert_eq!(bus.read(IoSpace::Port, IoWidth::Bits8, 0x40), 1);
        assert_eq!(bus.read(IoSpace::Memory, IoWidth::Bits8, 0x40), 2);
    }

    #[test]
    fn test_scripted_reads_take_precedence_then_fall_back() {
        let bus = FakeIoBus::new();
        bus.set_register(IoSpace::Port, 0x300, 0x7);
        bus.script_reads(IoSpace::Port, 0x300, &[0x1, 0x2]);

        assert_eq!(bus.remaining_reads(), 2);
        assert_eq!(bus.read(IoSpace::Port, IoWidth::Bits8, 0x300), 0x1);
        assert_eq!(bus.read(IoSpace::Port, IoWidth::Bits8, 0x300), 0x2);
        assert_eq!(bus.read(IoSpace::Port, IoWidth::Bits8, 0x300), 0x7);
        assert_eq!(bus.remaining_reads(), 0);
        assert_eq!(bus.reads().len(), 3);
    }

    #[test]
    fn test_clear_log() {
        let bus = FakeIoBus::new();
        bus.write(IoSpace::Memory, IoWidth::Bits32, 0x10, 5);
        bus.read(IoSpace::Memory, IoWidth::Bits32, 0x10);
        bus.clear_log();
        assert!(bus.reads().is_empty());
        assert!(bus.writes().is_empty());
        assert_eq!(bus.register(IoSpace::Memory, 0x10), 5);
    }
}
