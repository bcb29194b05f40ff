//! Asynchronous notification payload

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of argument words carried by a notification
///
/// Matches the size of an interrupt program's scratch register file; the
/// whole file is copied into the notification.
pub const NOTIFY_ARGS: usize = 6;

/// Interface and method identifier of a notification
///
/// Chosen by the receiver when it registers for notifications, so that
/// its dispatch loop can tell notification sources apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodId(pub u64);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method({:#x})", self.0)
    }
}

/// An asynchronous notification
///
/// This is all the receiver gets per accepted interrupt: the configured
/// method and a snapshot of the scratch registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Method the receiver registered
    pub method: MethodId,
    /// Argument words
    pub args: [u32; NOTIFY_ARGS],
    /// Per-source sequence number, starting at 1
    pub sequence: u64,
}

impl Notification {
    /// Creates a notification
    pub fn new(method: MethodId, args: [u32; NOTIFY_ARGS], sequence: u64) -> Self {
        Self {
            method,
            args,
            sequence,
        }
    }

    /// Returns argument word `index`, or zero past the end
    pub fn arg(&self, index: usize) -> u32 {
        self.args.get(index).copied().unwrap_or(0)
    }
}
