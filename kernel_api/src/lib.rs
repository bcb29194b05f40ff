//! # Kernel API
//!
//! The contract between device drivers and the interrupt/timing core.
//!
//! ## Scope
//!
//! - Delayed callbacks: register and cancel timeouts
//! - Interrupt registration: claim callbacks, handlers, clear-interrupt
//!   routines, and top-half programs with their notification target
//! - The interrupt program wire format, which lets drivers describe
//!   hardware acknowledgement sequences without kernel changes
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A process or thread model
//! - The format of ordinary IPC messages (only notifications)

pub mod error;
pub mod irq;
pub mod kernel;
pub mod time;

pub use error::{KernelError, ProgramError};
pub use irq::{
    ClaimFn, ClearInterruptFn, CmdRecord, IoOp, IrqContext, IrqHandlerFn, IrqId, IrqOwnership,
    IrqRequest, Opcode, TriggerMode, MAX_PROGRAM_LEN, SCRATCH_LEN,
};
pub use kernel::{DeviceApi, TimeoutHandler};
pub use time::{Duration, TickRate};
