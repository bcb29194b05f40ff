//! # Simulated Timer Device
//!
//! Deterministic tick source for processors under test.
//!
//! The timer only advances when told to. Clones share the same counter,
//! so a test can keep one handle and give another to the processor
//! thread that runs [`Processor::clock_tick`](crate::smp::Processor::clock_tick).

use hal::TimerDevice;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Simulated timer device with controllable time progression
///
/// # Examples
///
/// ```
/// use sim_kernel::timer::SimTimerDevice;
/// use hal::TimerDevice;
///
/// let timer = SimTimerDevice::new();
/// let mut seen_by_cpu = timer.clone();
///
/// timer.advance_ticks(100);
/// assert_eq!(seen_by_cpu.poll_ticks(), 100);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimTimerDevice {
    ticks: Arc<AtomicU64>,
}

impl SimTimerDevice {
    /// Creates a new simulated timer starting at tick 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new simulated timer starting at `ticks`
    pub fn with_initial_ticks(ticks: u64) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(ticks)),
        }
    }

    /// Advances the timer by `delta` ticks
    ///
    /// # Panics
    ///
    /// Panics if the counter would overflow.
    pub fn advance_ticks(&self, delta: u64) {
        let result = self
            .ticks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| t.checked_add(delta));
        if result.is_err() {
            panic!("tick counter overflow");
        }
    }

    /// Sets the timer to `new_ticks`
    ///
    /// # Panics
    ///
    /// Panics if `new_ticks` is behind the current count.
    pub fn set_ticks(&self, new_ticks: u64) {
        let previous = self.ticks.fetch_max(new_ticks, Ordering::AcqRel);
        assert!(
            new_ticks >= previous,
            "timer moved backwards: {} < {}",
            new_ticks,
            previous
        );
    }

    /// Returns the current tick count
    pub fn current_ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}

impl TimerDevice for SimTimerDevice {
    fn poll_ticks(&mut self) -> u64 {
        self.current_ticks()
    }
}
