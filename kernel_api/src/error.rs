//! Kernel error types

use core_types::{DeviceNumber, InterruptNumber};
use thiserror::Error;

/// Errors returned to drivers by the registration API
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KernelError {
    /// The interrupt program was rejected
    #[error("Invalid interrupt program: {0}")]
    InvalidProgram(#[from] ProgramError),

    /// No live entry has this identity
    #[error("No interrupt registered for {devno}, {inr}")]
    IrqNotFound {
        devno: DeviceNumber,
        inr: InterruptNumber,
    },

    /// Resource exhausted
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Configuration could not be loaded
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Reasons an interrupt program is rejected at registration
///
/// `index` is always the position of the offending instruction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("program is empty")]
    Empty,

    #[error("program has {len} instructions, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("instruction {index}: unknown opcode {opcode}")]
    UnknownOpcode { index: usize, opcode: u32 },

    #[error("instruction {index}: I/O command without an address")]
    MissingAddress { index: usize },

    #[error("instruction {index}: port address {addr:#x} out of range")]
    AddressOutOfRange { index: usize, addr: usize },

    #[error("instruction {index}: scratch slot {slot} out of range")]
    SlotOutOfRange { index: usize, slot: usize },

    #[error("instruction {index}: scratch slot required")]
    MissingSlot { index: usize },

    #[error("instruction {index}: immediate {value:#x} does not fit in {bits} bits")]
    ImmediateTooWide { index: usize, value: u32, bits: u32 },

    #[error("instruction {index}: predicate skips {skip} past the end of the program")]
    SkipOutOfBounds { index: usize, skip: usize },

    #[error("instruction {index}: execution can fall off the end without accept or decline")]
    MissingTerminal { index: usize },
}
