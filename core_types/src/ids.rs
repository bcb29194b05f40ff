//! Identifiers for processors and interrupt sources

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a processor
///
/// Processors are numbered densely from zero in the order they were
/// brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessorId(pub u32);

impl ProcessorId {
    /// Returns the processor index as a `usize`
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}

/// Unique device number
///
/// One device with several interrupt lines registers one entry per line,
/// all carrying the same device number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceNumber(pub u64);

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "devno {}", self.0)
    }
}

/// Interrupt number as seen by the interrupt controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterruptNumber(pub u32);

impl fmt::Display for InterruptNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inr {}", self.0)
    }
}
