//! Interrupt-masking spin locks and bounded retry with backoff
//!
//! Each host thread stands in for one processor, so the "interrupts
//! disabled" state is a per-thread nesting depth. Taking an [`IrqSpinLock`]
//! masks interrupts before spinning and restores them after release.
//! Interrupts are only ever delivered by calling the entry points on
//! [`crate::Cpu`]; debug builds check the depth there.

use serde::Deserialize;
use std::cell::Cell;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

thread_local! {
    static IRQ_DISABLE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Local interrupt state of the calling processor
pub mod interrupts {
    use super::IRQ_DISABLE_DEPTH;

    /// Returns true if the calling processor accepts interrupts
    pub fn enabled() -> bool {
        IRQ_DISABLE_DEPTH.with(|depth| depth.get() == 0)
    }

    /// Masks interrupts; nests
    pub fn disable() {
        IRQ_DISABLE_DEPTH.with(|depth| depth.set(depth.get() + 1));
    }

    /// Undoes one [`disable`]
    pub fn restore() {
        IRQ_DISABLE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Spin lock that masks local interrupts while held
///
/// Never sleeps. Interrupts are masked before the first spin so that an
/// interrupt on the same processor cannot try to take a lock its own
/// processor holds.
#[derive(Debug, Default)]
pub struct IrqSpinLock<T> {
    inner: spin::Mutex<T>,
}

impl<T> IrqSpinLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            inner: spin::Mutex::new(data),
        }
    }

    /// Disables interrupts, then spins until the lock is acquired
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T> {
        interrupts::disable();
        IrqSpinLockGuard {
            guard: ManuallyDrop::new(self.inner.lock()),
        }
    }

    /// Makes a single attempt; interrupts are left as they were on failure
    pub fn try_lock(&self) -> Option<IrqSpinLockGuard<'_, T>> {
        interrupts::disable();
        match self.inner.try_lock() {
            Some(guard) => Some(IrqSpinLockGuard {
                guard: ManuallyDrop::new(guard),
            }),
            None => {
                interrupts::restore();
                None
            }
        }
    }

    /// Returns true if some processor holds the lock
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

pub struct IrqSpinLockGuard<'a, T> {
    guard: ManuallyDrop<spin::MutexGuard<'a, T>>,
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for IrqSpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the guard is dropped exactly once, here, before
        // interrupts are restored.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        interrupts::restore();
    }
}

/// Tuning for [`retry_with_backoff`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Failed attempts after which the deadlock probe reports
    pub probe_threshold: u64,
    /// Upper bound on busy-wait iterations between two attempts
    pub max_spin: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            probe_threshold: 100_000,
            max_spin: 64,
        }
    }
}

/// Outcome of one attempt inside [`retry_with_backoff`]
#[derive(Debug, PartialEq, Eq)]
pub enum Attempt<T> {
    Done(T),
    /// Contended; every lock taken by the attempt has been released
    Retry,
}

/// Counts failed attempts and reports every time a threshold is crossed
///
/// Crossing the threshold is not an error. It marks a suspiciously long
/// run of contention worth a log line.
#[derive(Debug)]
pub struct DeadlockProbe {
    threshold: u64,
    failures: u64,
    trips: u64,
}

impl DeadlockProbe {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold: threshold.max(1),
            failures: 0,
            trips: 0,
        }
    }

    /// Records a failed attempt; returns true when the threshold is crossed
    pub fn record_failure(&mut self) -> bool {
        self.failures += 1;
        if self.failures % self.threshold == 0 {
            self.trips += 1;
            true
        } else {
            false
        }
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Number of times the threshold was crossed
    pub fn trips(&self) -> u64 {
        self.trips
    }
}

/// Runs `attempt` until it completes
///
/// Between failures the caller busy-waits for an exponentially growing
/// number of iterations. Once the spin reaches `max_spin` every further
/// failure yields the processor instead, so the loop never spins
/// unboundedly. `label` names the operation in probe reports.
pub fn retry_with_backoff<T>(
    policy: &BackoffPolicy,
    label: &str,
    mut attempt: impl FnMut() -> Attempt<T>,
) -> T {
    let mut probe = DeadlockProbe::new(policy.probe_threshold);
    let mut spin = 1u32;
    loop {
        if let Attempt::Done(value) = attempt() {
            if probe.trips() > 0 {
                log::debug!(
                    "{}: completed after {} failed attempts",
                    label,
                    probe.failures()
                );
            }
            return value;
        }

        if probe.record_failure() {
            log::debug!(
                "{}: deadlock probe tripped after {} failed attempts",
                label,
                probe.failures()
            );
        }

        if spin < policy.max_spin {
            for _ in 0..spin {
                core::hint::spin_loop();
            }
            spin = spin.saturating_mul(2);
        } else {
            std::thread::yield_now();
        }
    }
}
