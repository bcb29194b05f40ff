//! # Core Types
//!
//! Identifiers and handles shared by every layer of the interrupt and
//! timing core.
//!
//! ## Key Types
//!
//! - [`ProcessorId`]: Index of a processor in the processor set
//! - [`DeviceNumber`] / [`InterruptNumber`]: Together identify one interrupt source
//! - [`Handle`]: Opaque, generation-checked reference into a driver-owned arena
//! - [`HandleArena`]: The arena that hands out and resolves [`Handle`]s
//!
//! Driver state never crosses into the kernel as a raw pointer. The kernel
//! stores and passes back a [`Handle`]; only the driver resolves it.

pub mod arena;
pub mod ids;

pub use arena::{Handle, HandleArena};
pub use ids::{DeviceNumber, InterruptNumber, ProcessorId};
