//! Processors and their per-processor state

use crate::sync::{BackoffPolicy, IrqSpinLock};
use crate::timeout::QueuedTimeout;
use core_types::ProcessorId;
use hal::TimerDevice;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// One processor of the simulated machine
///
/// Owns the clock it last observed and its deadline queue. Only this
/// processor expires its queue; any processor may cancel from it while
/// holding the queue lock.
#[derive(Debug)]
pub struct Processor {
    id: ProcessorId,
    clock: AtomicU64,
    pub(crate) timeouts: IrqSpinLock<VecDeque<QueuedTimeout>>,
}

impl Processor {
    pub fn new(id: ProcessorId) -> Self {
        Self {
            id,
            clock: AtomicU64::new(0),
            timeouts: IrqSpinLock::new(VecDeque::new()),
        }
    }

    pub fn id(&self) -> ProcessorId {
        self.id
    }

    /// Returns the current tick as last observed by this processor
    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Moves the clock forward to `tick`; never moves it backwards
    pub fn advance_clock(&self, tick: u64) -> u64 {
        let previous = self.clock.fetch_max(tick, Ordering::AcqRel);
        previous.max(tick)
    }

    /// Clock interrupt entry point
    ///
    /// Reads `timer`, advances the clock, and fires every timeout that is
    /// due. Returns the number of handlers that ran.
    pub fn clock_tick(&self, timer: &mut dyn TimerDevice) -> usize {
        let now = self.advance_clock(timer.poll_ticks());
        self.expire(now)
    }

    /// Returns the number of queued timeouts
    pub fn pending_timeouts(&self) -> usize {
        self.timeouts.lock().len()
    }

    /// Returns the deadlines of all queued timeouts, in queue order
    pub fn deadlines(&self) -> Vec<u64> {
        self.timeouts.lock().iter().map(|entry| entry.deadline).collect()
    }
}

/// All processors of the machine
#[derive(Debug)]
pub struct ProcessorSet {
    processors: Vec<Processor>,
    backoff: BackoffPolicy,
}

impl ProcessorSet {
    /// Brings up `count` processors, numbered from zero
    pub fn new(count: usize, backoff: BackoffPolicy) -> Self {
        let processors = (0..count)
            .map(|index| Processor::new(ProcessorId(index as u32)))
            .collect();
        Self {
            processors,
            backoff,
        }
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn get(&self, id: ProcessorId) -> Option<&Processor> {
        self.processors.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Processor> {
        self.processors.iter()
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::SimTimerDevice;

    #[test]
    fn test_processors_are_numbered_densely() {
        let set = ProcessorSet::new(3, BackoffPolicy::default());
        let ids: Vec<_> = set.iter().map(Processor::id).collect();
        assert_eq!(ids, vec![ProcessorId(0), ProcessorId(1), ProcessorId(2)]);
        assert!(set.get(ProcessorId(3)).is_none());
    }

    #[test]
    fn test_clock_is_monotonic() {
        let cpu = Processor::new(ProcessorId(0));
        assert_eq!(cpu.advance_clock(10), 10);
        assert_eq!(cpu.advance_clock(5), 10);
        assert_eq!(cpu.now(), 10);
    }

    #[test]
    fn test_clock_tick_reads_timer() {
        let cpu = Processor::new(ProcessorId(0));
        let timer = SimTimerDevice::new();
        timer.advance_ticks(42);
        assert_eq!(cpu.clock_tick(&mut timer.clone()), 0);
        assert_eq!(cpu.now(), 42);
    }
}
