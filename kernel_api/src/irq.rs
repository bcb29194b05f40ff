//! Interrupt registration types and the top-half program wire format
//!
//! A driver describes how to acknowledge its device as a list of
//! [`CmdRecord`]s. Each record is one fixed-size instruction:
//!
//! | field   | meaning                                              |
//! |---------|------------------------------------------------------|
//! | opcode  | [`Opcode`] as a number, 1..=22                       |
//! | addr    | port or memory address, 0 when unused                |
//! | value   | 32-bit immediate (write value, mask, or skip count)  |
//! | srcarg  | source scratch slot, 0 when unused                   |
//! | dstarg  | destination scratch slot, 0 when unused              |
//!
//! Scratch slot 0 is reserved, so a slot index of 0 always means "none".
//! The kernel validates the whole program when it is registered.

use crate::error::ProgramError;
use core_types::{DeviceNumber, Handle, InterruptNumber};
use hal::{IoSpace, IoWidth};
use ipc::{MailboxRef, MethodId, NOTIFY_ARGS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of scratch registers available to a program
pub const SCRATCH_LEN: usize = NOTIFY_ARGS;

/// Maximum number of instructions in a program
pub const MAX_PROGRAM_LEN: usize = 32;

/// Instruction opcodes of the wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Opcode {
    PioRead8 = 1,
    PioRead16,
    PioRead32,
    PioWrite8,
    PioWrite16,
    PioWrite32,
    PioWriteA8,
    PioWriteA16,
    PioWriteA32,
    MemRead8,
    MemRead16,
    MemRead32,
    MemWrite8,
    MemWrite16,
    MemWrite32,
    MemWriteA8,
    MemWriteA16,
    MemWriteA32,
    BitTest,
    Predicate,
    Accept,
    Decline,
}

/// Shape of an I/O opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
    WriteFromScratch,
}

impl Opcode {
    const ALL: [Opcode; 22] = [
        Opcode::PioRead8,
        Opcode::PioRead16,
        Opcode::PioRead32,
        Opcode::PioWrite8,
        Opcode::PioWrite16,
        Opcode::PioWrite32,
        Opcode::PioWriteA8,
        Opcode::PioWriteA16,
        Opcode::PioWriteA32,
        Opcode::MemRead8,
        Opcode::MemRead16,
        Opcode::MemRead32,
        Opcode::MemWrite8,
        Opcode::MemWrite16,
        Opcode::MemWrite32,
        Opcode::MemWriteA8,
        Opcode::MemWriteA16,
        Opcode::MemWriteA32,
        Opcode::BitTest,
        Opcode::Predicate,
        Opcode::Accept,
        Opcode::Decline,
    ];

    /// Decodes a wire opcode
    pub fn from_raw(raw: u32) -> Option<Self> {
        let index = raw.checked_sub(1)? as usize;
        Self::ALL.get(index).copied()
    }

    /// Returns the wire value
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Returns the space, width and shape of an I/O opcode
    pub fn io(self) -> Option<(IoSpace, IoWidth, IoOp)> {
        use IoOp::{Read, Write, WriteFromScratch};
        use IoSpace::{Memory, Port};
        use IoWidth::{Bits16, Bits32, Bits8};

        let decoded = match self {
            Opcode::PioRead8 => (Port, Bits8, Read),
            Opcode::PioRead16 => (Port, Bits16, Read),
            Opcode::PioRead32 => (Port, Bits32, Read),
            Opcode::PioWrite8 => (Port, Bits8, Write),
            Opcode::PioWrite16 => (Port, Bits16, Write),
            Opcode::PioWrite32 => (Port, Bits32, Write),
            Opcode::PioWriteA8 => (Port, Bits8, WriteFromScratch),
            Opcode::PioWriteA16 => (Port, Bits16, WriteFromScratch),
            Opcode::PioWriteA32 => (Port, Bits32, WriteFromScratch),
            Opcode::MemRead8 => (Memory, Bits8, Read),
            Opcode::MemRead16 => (Memory, Bits16, Read),
            Opcode::MemRead32 => (Memory, Bits32, Read),
            Opcode::MemWrite8 => (Memory, Bits8, Write),
            Opcode::MemWrite16 => (Memory, Bits16, Write),
            Opcode::MemWrite32 => (Memory, Bits32, Write),
            Opcode::MemWriteA8 => (Memory, Bits8, WriteFromScratch),
            Opcode::MemWriteA16 => (Memory, Bits16, WriteFromScratch),
            Opcode::MemWriteA32 => (Memory, Bits32, WriteFromScratch),
            Opcode::BitTest | Opcode::Predicate | Opcode::Accept | Opcode::Decline => {
                return None
            }
        };
        Some(decoded)
    }
}

/// One instruction record of the wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CmdRecord {
    pub opcode: u32,
    pub addr: usize,
    pub value: u32,
    pub srcarg: usize,
    pub dstarg: usize,
}

impl CmdRecord {
    /// Creates a record with only the opcode set
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode: opcode.raw(),
            ..Self::default()
        }
    }

    /// Sets the target address
    pub fn addr(mut self, addr: usize) -> Self {
        self.addr = addr;
        self
    }

    /// Sets the immediate value
    pub fn value(mut self, value: u32) -> Self {
        self.value = value;
        self
    }

    /// Sets the source scratch slot
    pub fn src(mut self, slot: usize) -> Self {
        self.srcarg = slot;
        self
    }

    /// Sets the destination scratch slot
    pub fn dst(mut self, slot: usize) -> Self {
        self.dstarg = slot;
        self
    }

    /// Decodes the opcode, reporting it against instruction `index`
    pub fn decode_opcode(&self, index: usize) -> Result<Opcode, ProgramError> {
        Opcode::from_raw(self.opcode).ok_or(ProgramError::UnknownOpcode {
            index,
            opcode: self.opcode,
        })
    }
}

/// Result of asking whether an interrupt belongs to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrqOwnership {
    /// Not this device
    Decline,
    /// This device raised it
    Accept,
}

/// Interrupt signalling discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerMode {
    #[default]
    Level,
    Edge,
}

/// Handle to a registered interrupt entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IrqId(pub usize);

impl fmt::Display for IrqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Irq({})", self.0)
    }
}

/// What a kernel-level handler sees of the entry it runs for
///
/// The entry stays locked for as long as the context exists.
pub trait IrqContext {
    /// Returns the driver instance registered with the entry
    fn instance(&self) -> Handle;

    /// Returns the interrupt number being serviced
    fn inr(&self) -> InterruptNumber;

    /// Returns the device number of the entry
    fn devno(&self) -> DeviceNumber;

    /// Sends a notification with explicit argument words
    ///
    /// Returns false if notifications are disabled or the mailbox did not
    /// take it.
    fn notify(&mut self, args: [u32; SCRATCH_LEN]) -> bool;
}

/// Ownership-arbitration callback for kernel drivers
pub type ClaimFn = Box<dyn Fn(Handle) -> IrqOwnership + Send + Sync>;

/// Post-accept handler for kernel drivers
pub type IrqHandlerFn = Box<dyn Fn(&mut dyn IrqContext) + Send + Sync>;

/// Clear-interrupt (end-of-interrupt) routine and its argument
pub type ClearInterruptFn = Box<dyn Fn(Handle, InterruptNumber) + Send + Sync>;

/// Everything a driver supplies when it registers an interrupt
pub struct IrqRequest {
    pub devno: Option<DeviceNumber>,
    pub inr: InterruptNumber,
    pub trigger: TriggerMode,
    pub preack: bool,
    pub claim: Option<ClaimFn>,
    pub handler: Option<IrqHandlerFn>,
    pub instance: Handle,
    pub clear: Option<ClearInterruptFn>,
    pub clear_arg: Handle,
    pub program: Vec<CmdRecord>,
    pub notify: Option<(MethodId, MailboxRef)>,
}

impl IrqRequest {
    /// Starts a request for interrupt `inr`
    ///
    /// Without a claim callback or a program the entry declines every
    /// interrupt.
    pub fn new(inr: InterruptNumber) -> Self {
        Self {
            devno: None,
            inr,
            trigger: TriggerMode::default(),
            preack: false,
            claim: None,
            handler: None,
            instance: Handle::NULL,
            clear: None,
            clear_arg: Handle::NULL,
            program: Vec::new(),
            notify: None,
        }
    }

    /// Sets the device number; otherwise one is assigned
    pub fn device(mut self, devno: DeviceNumber) -> Self {
        self.devno = Some(devno);
        self
    }

    /// Sets the trigger mode
    pub fn trigger(mut self, trigger: TriggerMode) -> Self {
        self.trigger = trigger;
        self
    }

    /// Runs the clear-interrupt routine before claiming
    pub fn preack(mut self, preack: bool) -> Self {
        self.preack = preack;
        self
    }

    /// Sets the claim callback used when no notification is configured
    pub fn claim(mut self, claim: impl Fn(Handle) -> IrqOwnership + Send + Sync + 'static) -> Self {
        self.claim = Some(Box::new(claim));
        self
    }

    /// Sets the handler run after a claim callback accepts
    pub fn handler(mut self, handler: impl Fn(&mut dyn IrqContext) + Send + Sync + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Sets the driver instance passed to the claim callback and handler
    pub fn instance(mut self, instance: Handle) -> Self {
        self.instance = instance;
        self
    }

    /// Sets the clear-interrupt routine and its argument
    pub fn clear(
        mut self,
        routine: impl Fn(Handle, InterruptNumber) + Send + Sync + 'static,
        arg: Handle,
    ) -> Self {
        self.clear = Some(Box::new(routine));
        self.clear_arg = arg;
        self
    }

    /// Sets the top-half program
    pub fn program(mut self, program: Vec<CmdRecord>) -> Self {
        self.program = program;
        self
    }

    /// Enables notifications with `method` to `mailbox`
    pub fn notify(mut self, method: MethodId, mailbox: MailboxRef) -> Self {
        self.notify = Some((method, mailbox));
        self
    }
}

impl fmt::Debug for IrqRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqRequest")
            .field("devno", &self.devno)
            .field("inr", &self.inr)
            .field("trigger", &self.trigger)
            .field("preack", &self.preack)
            .field("has_claim", &self.claim.is_some())
            .field("has_handler", &self.handler.is_some())
            .field("instance", &self.instance)
            .field("has_clear", &self.clear.is_some())
            .field("program_len", &self.program.len())
            .field("notify", &self.notify.as_ref().map(|(m, mb)| (*m, mb.id())))
            .finish()
    }
}
