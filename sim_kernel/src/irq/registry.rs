//! Interrupt registry and dispatch
//!
//! Entries live in a slot array sized once at start-up and only ever
//! appended to. Readers never lock the array: they load the published
//! length and walk the slots below it, so an entry reference handed out
//! by dispatch borrows from the registry itself.
//!
//! ## Lock order
//!
//! The registration lock is taken before any entry lock. Dispatch holds
//! at most one entry lock at a time.

use super::notify::NotifyConfig;
use super::program::IrqProgram;
use crate::sync::{IrqSpinLock, IrqSpinLockGuard};
use core_types::{DeviceNumber, Handle, InterruptNumber, ProcessorId};
use hal::IoBus;
use ipc::MailboxId;
use kernel_api::{
    ClaimFn, ClearInterruptFn, IrqContext, IrqHandlerFn, IrqId, IrqOwnership, IrqRequest,
    KernelError, TriggerMode, SCRATCH_LEN,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// A registered interrupt source
pub struct IrqEntry {
    id: IrqId,
    devno: DeviceNumber,
    inr: InterruptNumber,
    trigger: TriggerMode,
    preack: bool,
    claim: Option<ClaimFn>,
    handler: Option<IrqHandlerFn>,
    instance: Handle,
    clear: Option<ClearInterruptFn>,
    clear_arg: Handle,
    retired: AtomicBool,
    notify: IrqSpinLock<NotifyConfig>,
}

impl IrqEntry {
    pub fn id(&self) -> IrqId {
        self.id
    }

    pub fn devno(&self) -> DeviceNumber {
        self.devno
    }

    pub fn inr(&self) -> InterruptNumber {
        self.inr
    }

    pub fn trigger(&self) -> TriggerMode {
        self.trigger
    }

    pub fn preack(&self) -> bool {
        self.preack
    }

    pub fn instance(&self) -> Handle {
        self.instance
    }

    /// Returns true once the entry has been unregistered
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Number of notifications delivered for this entry
    pub fn delivery_count(&self) -> u64 {
        self.notify.lock().delivery_count()
    }

    /// Current contents of the scratch registers
    pub fn scratch(&self) -> [u32; SCRATCH_LEN] {
        self.notify.lock().scratch()
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notify.lock().is_enabled()
    }

    fn is_live(&self, devno: DeviceNumber, inr: InterruptNumber) -> bool {
        !self.is_retired() && self.devno == devno && self.inr == inr
    }

    fn clear_interrupt(&self) {
        if let Some(clear) = &self.clear {
            clear(self.clear_arg, self.inr);
        }
    }

    fn claim(&self, cpu: ProcessorId, notify: &mut NotifyConfig, bus: &dyn IoBus) -> IrqOwnership {
        if notify.is_enabled() {
            notify.claim(cpu, bus)
        } else {
            self.claim
                .as_ref()
                .map_or(IrqOwnership::Decline, |claim| claim(self.instance))
        }
    }
}

impl fmt::Debug for IrqEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqEntry")
            .field("id", &self.id)
            .field("devno", &self.devno)
            .field("inr", &self.inr)
            .field("trigger", &self.trigger)
            .field("preack", &self.preack)
            .field("retired", &self.is_retired())
            .finish_non_exhaustive()
    }
}

/// An accepted entry, still locked
///
/// Holds the entry lock until dropped, so no other processor can run the
/// entry's program or change its notification settings meanwhile.
pub struct LockedIrq<'a> {
    cpu: ProcessorId,
    entry: &'a IrqEntry,
    notify: IrqSpinLockGuard<'a, NotifyConfig>,
    snapshot: [u32; SCRATCH_LEN],
}

impl<'a> LockedIrq<'a> {
    pub fn entry(&self) -> &'a IrqEntry {
        self.entry
    }

    pub fn id(&self) -> IrqId {
        self.entry.id
    }

    /// Scratch registers as they were when the program accepted
    pub fn snapshot(&self) -> [u32; SCRATCH_LEN] {
        self.snapshot
    }

    /// Top-half work after a successful claim
    ///
    /// Sends the notification if enabled, otherwise runs the handler.
    /// The clear-interrupt routine runs last unless it already ran
    /// before the claim.
    pub fn service(mut self) {
        let entry = self.entry;
        if self.notify.is_enabled() {
            let snapshot = self.snapshot;
            self.notify.deliver(self.cpu, snapshot);
        } else if let Some(handler) = &entry.handler {
            handler(&mut self);
        }
        if !entry.preack {
            entry.clear_interrupt();
        }
    }
}

impl IrqContext for LockedIrq<'_> {
    fn instance(&self) -> Handle {
        self.entry.instance
    }

    fn inr(&self) -> InterruptNumber {
        self.entry.inr
    }

    fn devno(&self) -> DeviceNumber {
        self.entry.devno
    }

    fn notify(&mut self, args: [u32; SCRATCH_LEN]) -> bool {
        self.notify.deliver(self.cpu, args)
    }
}

impl fmt::Debug for LockedIrq<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedIrq")
            .field("cpu", &self.cpu)
            .field("entry", self.entry)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

#[derive(Debug)]
struct RegistrationState {
    next_devno: u64,
}

/// Lookup from interrupt number to registered entries
pub struct IrqRegistry {
    slots: Box<[spin::Once<IrqEntry>]>,
    len: AtomicUsize,
    registration: spin::Mutex<RegistrationState>,
    spurious: AtomicU64,
}

impl IrqRegistry {
    /// Creates a registry with room for `expected + slack` entries
    pub fn new(expected: usize, slack: usize) -> Self {
        let capacity = expected.saturating_add(slack);
        Self {
            slots: (0..capacity).map(|_| spin::Once::new()).collect(),
            len: AtomicUsize::new(0),
            registration: spin::Mutex::new(RegistrationState { next_devno: 1 }),
            spurious: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of entries ever registered, retired ones included
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of interrupts no entry claimed
    pub fn spurious_count(&self) -> u64 {
        self.spurious.load(Ordering::Relaxed)
    }

    /// Every published entry, in registration order
    pub fn entries(&self) -> impl Iterator<Item = &IrqEntry> {
        self.slots[..self.len()].iter().filter_map(spin::Once::get)
    }

    pub fn get(&self, id: IrqId) -> Option<&IrqEntry> {
        self.slots.get(id.0).and_then(spin::Once::get)
    }

    /// Returns the live entry for `(devno, inr)`
    pub fn find(&self, devno: DeviceNumber, inr: InterruptNumber) -> Option<&IrqEntry> {
        self.entries().find(|entry| entry.is_live(devno, inr))
    }

    /// Registers an interrupt source on behalf of `cpu`
    ///
    /// # Errors
    ///
    /// - [`KernelError::InvalidProgram`] if a notification target comes
    ///   without a valid program
    /// - [`KernelError::InvalidConfig`] for a program without a
    ///   notification target
    /// - [`KernelError::ResourceExhausted`] when every slot is used
    ///
    /// # Panics
    ///
    /// Fatal if `(devno, inr)` is already registered and live.
    pub fn register(&self, cpu: ProcessorId, request: IrqRequest) -> Result<IrqId, KernelError> {
        let notify = match (request.notify, request.program.is_empty()) {
            (Some((method, mailbox)), _) => {
                let program = IrqProgram::from_records(&request.program)?;
                NotifyConfig::new(method, mailbox, program)
            }
            (None, true) => NotifyConfig::disabled(),
            (None, false) => {
                return Err(KernelError::InvalidConfig(
                    "interrupt program given without a notification target".to_string(),
                ))
            }
        };

        let mut registration = self.registration.lock();
        let devno = request
            .devno
            .unwrap_or(DeviceNumber(registration.next_devno));

        if self.find(devno, request.inr).is_some() {
            fatal!(cpu, "duplicate interrupt registration for {}, {}", devno, request.inr);
        }

        let index = self.len();
        let Some(slot) = self.slots.get(index) else {
            return Err(KernelError::ResourceExhausted(format!(
                "interrupt registry full ({} entries)",
                self.capacity()
            )));
        };

        let id = IrqId(index);
        slot.call_once(|| IrqEntry {
            id,
            devno,
            inr: request.inr,
            trigger: request.trigger,
            preack: request.preack,
            claim: request.claim,
            handler: request.handler,
            instance: request.instance,
            clear: request.clear,
            clear_arg: request.clear_arg,
            retired: AtomicBool::new(false),
            notify: IrqSpinLock::new(notify),
        });
        self.len.store(index + 1, Ordering::Release);
        registration.next_devno = registration.next_devno.max(devno.0.saturating_add(1));

        log::debug!("{}: registered {} for {}, {}", cpu, id, devno, request.inr);
        Ok(id)
    }

    /// Retires the live entry for `(devno, inr)`
    ///
    /// Dispatch skips retired entries and the identity may be registered
    /// again. The slot itself is not reused.
    pub fn unregister(&self, devno: DeviceNumber, inr: InterruptNumber) -> Result<(), KernelError> {
        let _registration = self.registration.lock();
        let entry = self
            .find(devno, inr)
            .ok_or(KernelError::IrqNotFound { devno, inr })?;

        let mut notify = entry.notify.lock();
        entry.retired.store(true, Ordering::Release);
        notify.disable();
        log::debug!("unregistered {} for {}, {}", entry.id, devno, inr);
        Ok(())
    }

    /// Disables notifications on every entry that targets `mailbox`
    ///
    /// Called when the mailbox is torn down. Returns the number of entries
    /// changed.
    pub fn disconnect_mailbox(&self, mailbox: MailboxId) -> usize {
        let mut disconnected = 0;
        for entry in self.entries() {
            let mut notify = entry.notify.lock();
            if notify.targets(mailbox) {
                notify.disable();
                disconnected += 1;
            }
        }
        if disconnected > 0 {
            log::debug!("disconnected {} entries from {}", disconnected, mailbox);
        }
        disconnected
    }

    /// Finds the entry that claims interrupt `inr` and returns it locked
    ///
    /// Candidates are tried in registration order; each one is locked,
    /// pre-acknowledged if configured, and asked to claim. The first to
    /// accept is returned without releasing its lock. Returns `None` if no
    /// live entry accepts; no entry is changed in that case except for
    /// what its own program does.
    pub fn dispatch_and_lock(
        &self,
        cpu: ProcessorId,
        inr: InterruptNumber,
        bus: &dyn IoBus,
    ) -> Option<LockedIrq<'_>> {
        for entry in self.entries().filter(|entry| entry.inr == inr) {
            let mut notify = entry.notify.lock();
            if entry.is_retired() {
                continue;
            }
            if entry.preack {
                entry.clear_interrupt();
            }
            if entry.claim(cpu, &mut notify, bus) == IrqOwnership::Accept {
                let snapshot = notify.scratch();
                log::trace!("{}: {} claimed by {}", cpu, inr, entry.id);
                return Some(LockedIrq {
                    cpu,
                    entry,
                    notify,
                    snapshot,
                });
            }
        }
        None
    }

    /// Interrupt entry point
    ///
    /// Dispatches `inr` and services the claiming entry. Unclaimed
    /// interrupts are counted as spurious. Returns the entry that claimed
    /// the interrupt.
    pub fn handle_interrupt(
        &self,
        cpu: ProcessorId,
        inr: InterruptNumber,
        bus: &dyn IoBus,
    ) -> Option<IrqId> {
        match self.dispatch_and_lock(cpu, inr, bus) {
            Some(locked) => {
                let id = locked.id();
                locked.service();
                Some(id)
            }
            None => {
                self.spurious.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}: spurious interrupt {}", cpu, inr);
                None
            }
        }
    }
}

impl fmt::Debug for IrqRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqRegistry")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("spurious", &self.spurious_count())
            .finish()
    }
}
