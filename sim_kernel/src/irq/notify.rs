//! Notification configuration of an interrupt entry

use super::interpreter;
use super::program::IrqProgram;
use core_types::ProcessorId;
use hal::IoBus;
use ipc::{MailboxId, MailboxRef, MethodId, Notification};
use kernel_api::{IrqOwnership, SCRATCH_LEN};

/// Where and how an entry reports accepted interrupts
///
/// Lives under the entry lock. The scratch registers persist from one
/// program run to the next.
#[derive(Debug)]
pub struct NotifyConfig {
    enabled: bool,
    mailbox: Option<MailboxRef>,
    method: MethodId,
    scratch: [u32; SCRATCH_LEN],
    program: Option<IrqProgram>,
    delivery_count: u64,
}

impl NotifyConfig {
    /// Configuration of an entry that never notifies
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            mailbox: None,
            method: MethodId(0),
            scratch: [0; SCRATCH_LEN],
            program: None,
            delivery_count: 0,
        }
    }

    /// Enabled configuration claiming through `program`
    pub fn new(method: MethodId, mailbox: MailboxRef, program: IrqProgram) -> Self {
        Self {
            enabled: true,
            mailbox: Some(mailbox),
            method,
            scratch: [0; SCRATCH_LEN],
            program: Some(program),
            delivery_count: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn method(&self) -> MethodId {
        self.method
    }

    /// Returns true if notifications go to `mailbox`
    pub fn targets(&self, mailbox: MailboxId) -> bool {
        self.mailbox.as_ref().is_some_and(|m| m.id() == mailbox)
    }

    /// Stops notifications and forgets the mailbox
    pub fn disable(&mut self) {
        self.enabled = false;
        self.mailbox = None;
    }

    pub fn scratch(&self) -> [u32; SCRATCH_LEN] {
        self.scratch
    }

    /// Number of notifications the mailbox accepted
    pub fn delivery_count(&self) -> u64 {
        self.delivery_count
    }

    /// Runs the program to decide ownership
    ///
    /// Declines when disabled or when no program is set.
    pub fn claim(&mut self, cpu: ProcessorId, bus: &dyn IoBus) -> IrqOwnership {
        match (&self.program, self.enabled) {
            (Some(program), true) => interpreter::run(cpu, program, &mut self.scratch, bus),
            _ => IrqOwnership::Decline,
        }
    }

    /// Sends `args` to the mailbox
    ///
    /// Best effort: a missing, closed or full mailbox drops the
    /// notification with a warning. Returns true if it was enqueued.
    pub fn deliver(&mut self, cpu: ProcessorId, args: [u32; SCRATCH_LEN]) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(mailbox) = &self.mailbox else {
            return false;
        };

        let notification = Notification::new(self.method, args, self.delivery_count + 1);
        match mailbox.send(notification) {
            Ok(()) => {
                self.delivery_count += 1;
                log::trace!(
                    "{}: {} #{} delivered to {}",
                    cpu,
                    self.method,
                    notification.sequence,
                    mailbox.id()
                );
                true
            }
            Err(err) => {
                log::warn!("{}: dropping {} for {}: {}", cpu, self.method, mailbox.id(), err);
                false
            }
        }
    }
}
