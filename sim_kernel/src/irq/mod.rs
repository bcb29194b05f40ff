//! Interrupt top half
//!
//! - [`program`]: decoding and validation of driver-supplied programs
//! - [`interpreter`]: runs a validated program against an [`hal::IoBus`]
//! - [`notify`]: per-entry notification settings and delivery
//! - [`registry`]: registration, dispatch and servicing

pub mod interpreter;
pub mod notify;
pub mod program;
pub mod registry;

pub use notify::NotifyConfig;
pub use program::{Cmd, IrqProgram};
pub use registry::{IrqEntry, IrqRegistry, LockedIrq};
