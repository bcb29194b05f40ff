//! # Hardware Abstraction Layer (HAL)
//!
//! Traits for the hardware the interrupt top half and the timer tick
//! touch, plus test doubles for them.
//!
//! ## Design Principles
//!
//! 1. **No x86-specific assumptions**: Port I/O is one address space among two
//! 2. **Trait-based**: Interrupt programs reach hardware only through [`IoBus`]
//! 3. **Shared access**: Buses are used from several processors at once, so
//!    every operation takes `&self`
//! 4. **Testable**: [`FakeIoBus`] scripts reads and records writes

pub mod interrupts;
pub mod io;
pub mod timer;

pub use interrupts::{FakeInterruptController, InterruptController};
pub use io::{FakeIoBus, IoAccess, IoBus, IoSpace, IoWidth};
pub use timer::TimerDevice;
