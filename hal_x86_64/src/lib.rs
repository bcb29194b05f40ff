//! # x86_64 Hardware Abstraction Layer
//!
//! Implements [`hal::IoBus`] for x86: the port space goes through a
//! [`PortIo`] implementation, the memory space through volatile accesses.

use hal::{IoBus, IoSpace, IoWidth};

pub mod port_io;

pub use port_io::{FakePortIo, PortIo, RealPortIo};

/// I/O bus backed by x86 port I/O and volatile MMIO
///
/// Port accesses from several processors are serialised on an internal
/// lock; the `PortIo` implementations take `&mut self`.
pub struct X86IoBus<P: PortIo> {
    ports: spin::Mutex<P>,
}

impl<P: PortIo> X86IoBus<P> {
    /// Creates a bus over `ports`
    ///
    /// # Safety
    ///
    /// Memory-space accesses dereference the address as given. The caller
    /// must guarantee that every memory address an interrupt program uses
    /// is mapped device memory, aligned for the access width.
    pub unsafe fn new(ports: P) -> Self {
        Self {
            ports: spin::Mutex::new(ports),
        }
    }

    /// Narrows `addr` to the 16-bit port space
    fn port(addr: usize) -> Option<u16> {
        let port = u16::try_from(addr).ok();
        if port.is_none() {
            log::error!("port address {:#x} outside the port space", addr);
        }
        port
    }

    /// Runs `f` with exclusive access to the port implementation
    pub fn with_ports<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut self.ports.lock())
    }
}

impl<P: PortIo> IoBus for X86IoBus<P> {
    fn read(&self, space: IoSpace, width: IoWidth, addr: usize) -> u32 {
        match space {
            // Nothing answers outside the port space: the bus floats high.
            IoSpace::Port => match Self::port(addr) {
                Some(port) => self.ports.lock().read(port, width),
                None => width.mask(),
            },
            // SAFETY: Guaranteed by the contract of `X86IoBus::new`.
            IoSpace::Memory => unsafe {
                match width {
                    IoWidth::Bits8 => u32::from(core::ptr::read_volatile(addr as *const u8)),
                    IoWidth::Bits16 => u32::from(core::ptr::read_volatile(addr as *const u16)),
                    IoWidth::Bits32 => core::ptr::read_volatile(addr as *const u32),
                }
            },
        }
    }

    fn write(&self, space: IoSpace, width: IoWidth, addr: usize, value: u32) {
        match space {
            IoSpace::Port => {
                if let Some(port) = Self::port(addr) {
                    self.ports.lock().write(port, width, value);
                }
            }
            // SAFETY: Guaranteed by the contract of `X86IoBus::new`.
            IoSpace::Memory => unsafe {
                match width {
                    IoWidth::Bits8 => core::ptr::write_volatile(addr as *mut u8, value as u8),
                    IoWidth::Bits16 => core::ptr::write_volatile(addr as *mut u16, value as u16),
                    IoWidth::Bits32 => core::ptr::write_volatile(addr as *mut u32, value),
                }
            },
        }
    }
}
