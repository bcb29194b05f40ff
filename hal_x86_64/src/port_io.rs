//! Port I/O abstraction for x86_64
//!
//! Trait-based port access at 8, 16 and 32 bits, with a real
//! implementation using `in`/`out` and a scripted fake for tests.
//!
//! ## Safety
//!
//! Port I/O directly interacts with hardware. Callers must only touch
//! ports that belong to a device they own. `RealPortIo` keeps all inline
//! assembly in small, auditable functions.

use hal::IoWidth;
use std::collections::VecDeque;

/// Port I/O trait
///
/// ## Implementation Notes
///
/// Implementations must guarantee:
/// - `read` returns only the low `width` bits
/// - `write` uses only the low `width` bits of `value`
/// - Operations complete synchronously before returning
pub trait PortIo: Send {
    /// Reads `width` bits from `port`
    fn read(&mut self, port: u16, width: IoWidth) -> u32;

    /// Writes the low `width` bits of `value` to `port`
    fn write(&mut self, port: u16, width: IoWidth, value: u32);
}

/// Real hardware port I/O implementation
///
/// Only meaningful at ring 0 on x86. On any other architecture reads
/// return all-ones (a floating bus) and writes are discarded.
#[derive(Debug, Default)]
pub struct RealPortIo;

impl RealPortIo {
    /// Creates a new real port I/O implementation
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_arch = "x86_64")]
impl PortIo for RealPortIo {
    #[inline]
    fn read(&mut self, port: u16, width: IoWidth) -> u32 {
        // SAFETY: The caller owns the device behind `port` and runs with
        // I/O privilege. The instructions touch only the named registers.
        unsafe {
            match width {
                IoWidth::Bits8 => {
                    let value: u8;
                    core::arch::asm!(
                        "in al, dx",
                        in("dx") port,
                        out("al") value,
                        options(nomem, nostack, preserves_flags)
                    );
                    u32::from(value)
                }
                IoWidth::Bits16 => {
                    let value: u16;
                    core::arch::asm!(
                        "in ax, dx",
                        in("dx") port,
                        out("ax") value,
                        options(nomem, nostack, preserves_flags)
                    );
                    u32::from(value)
                }
                IoWidth::Bits32 => {
                    let value: u32;
                    core::arch::asm!(
                        "in eax, dx",
                        in("dx") port,
                        out("eax") value,
                        options(nomem, nostack, preserves_flags)
                    );
                    value
                }
            }
        }
    }

    #[inline]
    fn write(&mut self, port: u16, width: IoWidth, value: u32) {
        // SAFETY: As for `read`; the value is truncated to the access width.
        unsafe {
            match width {
                IoWidth::Bits8 => core::arch::asm!(
                    "out dx, al",
                    in("dx") port,
                    in("al") value as u8,
                    options(nomem, nostack, preserves_flags)
                ),
                IoWidth::Bits16 => core::arch::asm!(
                    "out dx, ax",
                    in("dx") port,
                    in("ax") value as u16,
                    options(nomem, nostack, preserves_flags)
                ),
                IoWidth::Bits32 => core::arch::asm!(
                    "out dx, eax",
                    in("dx") port,
                    in("eax") value,
                    options(nomem, nostack, preserves_flags)
                ),
            }
        }
    }
}

#[cfg(not(target_arch = "x86_64"))]
impl PortIo for RealPortIo {
    fn read(&mut self, _port: u16, width: IoWidth) -> u32 {
        width.mask()
    }

    fn write(&mut self, _port: u16, _width: IoWidth, _value: u32) {}
}

/// Scripted port I/O for tests
///
/// Every read must have been scripted, for the right port and in the
/// order the code under test issues them; anything else panics, so a
/// program that touches an unexpected register fails loudly. Writes are
/// recorded, truncated to their width.
///
/// ## Example
///
/// ```rust
/// use hal::IoWidth;
/// use hal_x86_64::port_io::{FakePortIo, PortIo};
///
/// let mut io = FakePortIo::new();
/// io.script_read(0x307, 0x01); // ISR: packet received
///
/// assert_eq!(io.read(0x307, IoWidth::Bits8), 0x01);
/// assert_eq!(io.remaining_reads(), 0);
/// ```
#[derive(Debug, Default)]
pub struct FakePortIo {
    pending: VecDeque<(u16, u32)>,
    consumed: usize,
    writes: Vec<(u16, IoWidth, u32)>,
}

impl FakePortIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the value returned by the next read, which must target `port`
    pub fn script_read(&mut self, port: u16, value: u32) {
        self.pending.push_back((port, value));
    }

    /// Queues several `(port, value)` reads
    pub fn script_reads(&mut self, reads: &[(u16, u32)]) {
        self.pending.extend(reads.iter().copied());
    }

    pub fn remaining_reads(&self) -> usize {
        self.pending.len()
    }

    /// Writes seen so far as `(port, width, value)`
    pub fn writes(&self) -> &[(u16, IoWidth, u32)] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }
}

impl PortIo for FakePortIo {
    fn read(&mut self, port: u16, width: IoWidth) -> u32 {
        let Some((scripted_port, value)) = self.pending.pop_front() else {
            panic!(
                "unscripted read of port {:#06x} after {} reads",
                port, self.consumed
            );
        };
        assert_eq!(
            scripted_port, port,
            "read #{} went to the wrong port",
            self.consumed
        );
        self.consumed += 1;
        value & width.mask()
    }

    fn write(&mut self, port: u16, width: IoWidth, value: u32) {
        self.writes.push((port, width, value & width.mask()));
    }
}
