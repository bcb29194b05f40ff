//! # Simulated Kernel
//!
//! The interrupt top half and the per-processor deadline queues, running
//! on the host.
//!
//! ## Purpose
//!
//! Every host thread plays one processor. Locks mask that thread's
//! simulated interrupts, hardware is reached only through [`hal::IoBus`],
//! and time advances only when a test moves a timer. This keeps the
//! concurrency real and the rest deterministic:
//! - Runs under `cargo test`
//! - Real contention between processors, with no real hardware
//! - Inspectable (queues, counters and scratch registers are readable)
//!
//! ## Philosophy
//!
//! **Invariant violations halt.** A double-armed timeout or a duplicate
//! interrupt registration means kernel state can no longer be trusted, so
//! it is reported with the processor it happened on and the kernel stops.
//! Anything a driver can reasonably get wrong comes back as a
//! [`KernelError`].

/// Logs an invariant violation for `$cpu` and halts
macro_rules! fatal {
    ($cpu:expr, $($arg:tt)+) => {{
        let message = format!($($arg)+);
        log::error!("{}: {}", $cpu, message);
        panic!("{}: {}", $cpu, message)
    }};
}

pub mod config;
pub mod irq;
pub mod smp;
pub mod sync;
pub mod test_utils;
pub mod timeout;
pub mod timer;

use config::KernelConfig;
use core_types::{DeviceNumber, Handle, InterruptNumber, ProcessorId};
use hal::{IoBus, TimerDevice};
use ipc::Mailbox;
use irq::{IrqRegistry, LockedIrq};
use kernel_api::{DeviceApi, Duration, IrqId, IrqRequest, KernelError, TickRate, TimeoutHandler};
use smp::{Processor, ProcessorSet};
use std::sync::Arc;
use timeout::Timeout;

/// Simulated kernel state
///
/// Shared by all processor threads; every operation takes `&self`.
pub struct SimulatedKernel {
    config: KernelConfig,
    tick_rate: TickRate,
    processors: ProcessorSet,
    irqs: IrqRegistry,
    bus: Arc<dyn IoBus>,
}

impl SimulatedKernel {
    /// Boots a kernel with `config`, reaching hardware through `bus`
    pub fn new(config: KernelConfig, bus: Arc<dyn IoBus>) -> Result<Self, KernelError> {
        config.validate()?;
        let processors = ProcessorSet::new(config.processors, config.backoff);
        let irqs = IrqRegistry::new(config.irq.expected, config.irq.slack);
        log::debug!(
            "booted {} processors at {} Hz, {} interrupt slots",
            processors.len(),
            config.tick_hz,
            irqs.capacity()
        );
        Ok(Self {
            tick_rate: config.tick_rate(),
            config,
            processors,
            irqs,
            bus,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn tick_rate(&self) -> TickRate {
        self.tick_rate
    }

    pub fn processors(&self) -> &ProcessorSet {
        &self.processors
    }

    pub fn irqs(&self) -> &IrqRegistry {
        &self.irqs
    }

    pub fn bus(&self) -> &dyn IoBus {
        self.bus.as_ref()
    }

    /// Returns the context for running on processor `id`
    pub fn cpu(&self, id: ProcessorId) -> Option<Cpu<'_>> {
        let processor = self.processors.get(id)?;
        Some(Cpu {
            kernel: self,
            processor,
        })
    }

    /// Creates a mailbox of the configured capacity
    pub fn create_mailbox(&self) -> Arc<Mailbox> {
        Mailbox::new(self.config.mailbox_capacity)
    }

    /// Closes `mailbox` and stops every notification aimed at it
    pub fn destroy_mailbox(&self, mailbox: &Mailbox) -> usize {
        mailbox.close();
        self.irqs.disconnect_mailbox(mailbox.id())
    }
}

/// Execution context of one processor
///
/// The explicit stand-in for "the current processor": timer ticks,
/// interrupts and driver calls on a processor all go through its `Cpu`.
#[derive(Clone, Copy)]
pub struct Cpu<'k> {
    kernel: &'k SimulatedKernel,
    processor: &'k Processor,
}

impl<'k> Cpu<'k> {
    pub fn id(&self) -> ProcessorId {
        self.processor.id()
    }

    pub fn processor(&self) -> &'k Processor {
        self.processor
    }

    /// Clock interrupt: reads `timer` and fires due timeouts
    pub fn clock_tick(&self, timer: &mut dyn TimerDevice) -> usize {
        self.processor.clock_tick(timer)
    }

    /// Device interrupt: dispatches `inr` and services the claiming entry
    ///
    /// Must not be entered while this processor has interrupts masked.
    pub fn handle_interrupt(&self, inr: InterruptNumber) -> Option<IrqId> {
        self.assert_interrupts_enabled(inr);
        self.kernel
            .irqs
            .handle_interrupt(self.id(), inr, self.kernel.bus())
    }

    /// Finds the entry claiming `inr` and returns it locked
    pub fn dispatch_and_lock(&self, inr: InterruptNumber) -> Option<LockedIrq<'k>> {
        self.assert_interrupts_enabled(inr);
        self.kernel
            .irqs
            .dispatch_and_lock(self.id(), inr, self.kernel.bus.as_ref())
    }
}

impl Cpu<'_> {
    fn assert_interrupts_enabled(&self, inr: InterruptNumber) {
        debug_assert!(
            sync::interrupts::enabled(),
            "{}: interrupt {} delivered with interrupts masked",
            self.id(),
            inr
        );
    }
}

impl DeviceApi for Cpu<'_> {
    type Timeout = Arc<Timeout>;

    fn register_timeout(
        &self,
        timeout: &Self::Timeout,
        delay: Duration,
        handler: TimeoutHandler,
        arg: Handle,
    ) {
        let ticks = self.kernel.tick_rate.ticks_for(delay);
        self.processor.register_timeout(timeout, ticks, handler, arg);
    }

    fn cancel_timeout(&self, timeout: &Self::Timeout) -> bool {
        self.kernel.processors.cancel_timeout(timeout)
    }

    fn register_irq(&self, request: IrqRequest) -> Result<IrqId, KernelError> {
        self.kernel.irqs.register(self.id(), request)
    }

    fn unregister_irq(&self, devno: DeviceNumber, inr: InterruptNumber) -> Result<(), KernelError> {
        self.kernel.irqs.unregister(devno, inr)
    }
}
