//! Test utilities for processor-level tests
//!
//! Helpers shared by unit tests and the integration tests in
//! `tests_resilience`.

use crate::config::KernelConfig;
use crate::{Cpu, SimulatedKernel};
use core_types::ProcessorId;
use hal::{FakeIoBus, IoSpace};
use kernel_api::{CmdRecord, Opcode, TimeoutHandler};
use std::sync::{Arc, Mutex};

/// Boots a kernel over a fresh [`FakeIoBus`]
///
/// # Panics
///
/// Panics if `config` does not validate.
pub fn boot(config: KernelConfig) -> (SimulatedKernel, Arc<FakeIoBus>) {
    let bus = Arc::new(FakeIoBus::new());
    let kernel = match SimulatedKernel::new(config, bus.clone()) {
        Ok(kernel) => kernel,
        Err(err) => panic!("test kernel failed to boot: {}", err),
    };
    (kernel, bus)
}

/// Runs `f` once per processor, each on its own host thread
///
/// Returns the results in processor order. A panic on any processor is
/// propagated.
pub fn on_each_processor<T, F>(kernel: &SimulatedKernel, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(Cpu<'_>) -> T + Sync,
{
    std::thread::scope(|scope| {
        let handles: Vec<_> = kernel
            .processors()
            .iter()
            .filter_map(|processor| kernel.cpu(processor.id()))
            .map(|cpu| {
                let f = &f;
                scope.spawn(move || f(cpu))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(value) => value,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

/// Records the order in which timeout handlers run
#[derive(Debug, Clone, Default)]
pub struct FiringLog {
    fired: Arc<Mutex<Vec<(ProcessorId, u64)>>>,
}

impl FiringLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handler that records `tag` for `cpu` when it runs
    pub fn handler(&self, cpu: ProcessorId, tag: u64) -> TimeoutHandler {
        let fired = Arc::clone(&self.fired);
        Box::new(move |_| {
            if let Ok(mut fired) = fired.lock() {
                fired.push((cpu, tag));
            }
        })
    }

    /// Tags fired so far, in firing order
    pub fn tags(&self) -> Vec<u64> {
        self.fired
            .lock()
            .map(|fired| fired.iter().map(|&(_, tag)| tag).collect())
            .unwrap_or_default()
    }

    /// Tags fired on `cpu`, in firing order
    pub fn tags_on(&self, cpu: ProcessorId) -> Vec<u64> {
        self.fired
            .lock()
            .map(|fired| {
                fired
                    .iter()
                    .filter(|(c, _)| *c == cpu)
                    .map(|&(_, tag)| tag)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.fired.lock().map(|fired| fired.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Acknowledge-if-mine program for an 8-bit interrupt status register
///
/// Reads `status` into slot 3, keeps the bits in `mask` in slot 2 and, if
/// any is set, writes them back to `status` and accepts. Otherwise
/// declines without touching the device.
pub fn status_ack_program(space: IoSpace, status: usize, mask: u8) -> Vec<CmdRecord> {
    let (read, write_back) = match space {
        IoSpace::Port => (Opcode::PioRead8, Opcode::PioWriteA8),
        IoSpace::Memory => (Opcode::MemRead8, Opcode::MemWriteA8),
    };
    vec![
        CmdRecord::new(read).addr(status).dst(3),
        CmdRecord::new(Opcode::BitTest)
            .value(u32::from(mask))
            .src(3)
            .dst(2),
        CmdRecord::new(Opcode::Predicate).value(2).src(2),
        CmdRecord::new(write_back).addr(status).src(2),
        CmdRecord::new(Opcode::Accept),
        CmdRecord::new(Opcode::Decline),
    ]
}
