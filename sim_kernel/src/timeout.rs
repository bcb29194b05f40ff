//! Per-processor deadline queues
//!
//! A [`Timeout`] is owned by the driver that arms it. While armed it is
//! linked into exactly one processor's queue, which keeps entries sorted
//! by absolute deadline with FIFO order among equal deadlines.
//!
//! ## Lock order
//!
//! Registration and expiry hold the queue lock and then take a timeout
//! lock. Cancellation cannot know the owning processor without first
//! locking the timeout, so it takes the timeout lock and only *tries* the
//! queue lock, releasing everything and backing off on failure.

use crate::smp::{Processor, ProcessorSet};
use crate::sync::{retry_with_backoff, Attempt, IrqSpinLock};
use core_types::{Handle, ProcessorId};
use kernel_api::TimeoutHandler;
use std::fmt;
use std::sync::Arc;

struct TimeoutState {
    /// Owning processor; `None` iff the timeout is not queued
    processor: Option<ProcessorId>,
    deadline: u64,
    handler: Option<TimeoutHandler>,
    arg: Handle,
}

impl TimeoutState {
    const fn empty() -> Self {
        Self {
            processor: None,
            deadline: 0,
            handler: None,
            arg: Handle::NULL,
        }
    }
}

/// Caller-owned timeout
pub struct Timeout {
    state: IrqSpinLock<TimeoutState>,
}

impl Timeout {
    /// Creates an unarmed timeout
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: IrqSpinLock::new(TimeoutState::empty()),
        })
    }

    /// Resets every field except the lock
    ///
    /// # Panics
    ///
    /// Reinitializing a queued timeout would corrupt its processor's
    /// queue and is fatal.
    pub fn reinitialize(&self) {
        let mut state = self.state.lock();
        if let Some(cpu) = state.processor {
            fatal!(cpu, "reinitializing a queued timeout");
        }
        *state = TimeoutState::empty();
    }

    /// Returns true while the timeout sits in a queue
    pub fn is_queued(&self) -> bool {
        self.state.lock().processor.is_some()
    }

    /// Returns the owning processor, if queued
    pub fn processor(&self) -> Option<ProcessorId> {
        self.state.lock().processor
    }

    /// Returns the absolute deadline, zero when not queued
    pub fn deadline(&self) -> u64 {
        self.state.lock().deadline
    }
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Timeout")
            .field("processor", &state.processor)
            .field("deadline", &state.deadline)
            .field("arg", &state.arg)
            .finish()
    }
}

/// Queue link to a timeout
///
/// Carries a copy of the deadline, which cannot change while queued, so
/// ordering never needs a second timeout lock.
#[derive(Debug)]
pub(crate) struct QueuedTimeout {
    pub(crate) deadline: u64,
    timeout: Arc<Timeout>,
}

impl Processor {
    /// Arms `timeout` on this processor to fire `delay_ticks` from now
    ///
    /// # Panics
    ///
    /// Fatal if `timeout` is already queued on any processor.
    pub fn register_timeout(
        &self,
        timeout: &Arc<Timeout>,
        delay_ticks: u64,
        handler: TimeoutHandler,
        arg: Handle,
    ) {
        let mut queue = self.timeouts.lock();
        let mut state = timeout.state.lock();

        if let Some(owner) = state.processor {
            fatal!(
                self.id(),
                "timeout already queued on {} (deadline {})",
                owner,
                state.deadline
            );
        }

        let deadline = self.now().saturating_add(delay_ticks);
        state.processor = Some(self.id());
        state.deadline = deadline;
        state.handler = Some(handler);
        state.arg = arg;

        let position = queue.partition_point(|entry| entry.deadline <= deadline);
        queue.insert(
            position,
            QueuedTimeout {
                deadline,
                timeout: Arc::clone(timeout),
            },
        );
        log::trace!("{}: timeout armed for tick {}", self.id(), deadline);
    }

    /// Fires every queued timeout whose deadline is at or before `now`
    ///
    /// Handlers run with no lock held and may arm timeouts again. Returns
    /// the number of handlers run.
    pub fn expire(&self, now: u64) -> usize {
        let mut fired = 0;
        loop {
            let mut queue = self.timeouts.lock();
            let due = queue.front().is_some_and(|head| head.deadline <= now);
            if !due {
                break;
            }
            let Some(head) = queue.pop_front() else {
                break;
            };

            let mut state = head.timeout.state.lock();
            let handler = state.handler.take();
            let arg = state.arg;
            *state = TimeoutState::empty();
            drop(state);
            drop(queue);

            log::trace!("{}: timeout for tick {} fired at {}", self.id(), head.deadline, now);
            if let Some(handler) = handler {
                handler(arg);
            }
            fired += 1;
        }
        fired
    }
}

impl ProcessorSet {
    /// Disarms `timeout`, wherever it is queued
    ///
    /// Returns false if it was not queued. May be called from any
    /// processor.
    pub fn cancel_timeout(&self, timeout: &Timeout) -> bool {
        let cancelled = retry_with_backoff(self.backoff(), "cancel_timeout", || {
            let mut state = timeout.state.lock();
            let Some(owner) = state.processor else {
                return Attempt::Done(None);
            };
            let Some(cpu) = self.get(owner) else {
                fatal!(owner, "timeout owned by a processor that does not exist");
            };
            let Some(mut queue) = cpu.timeouts.try_lock() else {
                return Attempt::Retry;
            };

            let target: *const Timeout = timeout;
            if let Some(position) = queue
                .iter()
                .position(|entry| std::ptr::eq(Arc::as_ptr(&entry.timeout), target))
            {
                queue.remove(position);
            } else {
                fatal!(owner, "queued timeout missing from its processor's queue");
            }
            let handler = state.handler.take();
            *state = TimeoutState::empty();
            Attempt::Done(Some((owner, handler)))
        });

        match cancelled {
            Some((owner, handler)) => {
                // Dropped outside the locks; closures may own arbitrary state.
                drop(handler);
                log::debug!("{}: timeout cancelled", owner);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::BackoffPolicy;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> TimeoutHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |tag: u32| -> TimeoutHandler {
                let log = Arc::clone(&log);
                Box::new(move |_| log.lock().unwrap().push(tag))
            }
        };
        (log, make)
    }

    #[test]
    fn test_equal_deadlines_fire_in_registration_order() {
        let cpu = Processor::new(ProcessorId(0));
        let (log, handler) = recorder();
        cpu.advance_clock(100);

        let a = Timeout::new();
        let b = Timeout::new();
        cpu.register_timeout(&a, 50, handler(1), Handle::NULL);
        cpu.register_timeout(&b, 50, handler(2), Handle::NULL);

        assert_eq!(cpu.expire(200), 2);
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_expire_only_fires_due_entries() {
        let cpu = Processor::new(ProcessorId(0));
        let (log, handler) = recorder();
        let early = Timeout::new();
        let late = Timeout::new();
        cpu.register_timeout(&late, 20, handler(2), Handle::NULL);
        cpu.register_timeout(&early, 10, handler(1), Handle::NULL);

        assert_eq!(cpu.deadlines(), vec![10, 20]);
        assert_eq!(cpu.expire(9), 0);
        assert_eq!(cpu.expire(10), 1);
        assert!(!early.is_queued());
        assert!(late.is_queued());
        assert_eq!(*log.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_handler_receives_its_argument() {
        let cpu = Processor::new(ProcessorId(0));
        let seen = Arc::new(Mutex::new(None));
        let timeout = Timeout::new();
        let arg = Handle::from_raw(7, 3);
        {
            let seen = Arc::clone(&seen);
            cpu.register_timeout(
                &timeout,
                1,
                Box::new(move |arg| *seen.lock().unwrap() = Some(arg)),
                arg,
            );
        }
        cpu.expire(1);
        assert_eq!(*seen.lock().unwrap(), Some(arg));
    }

    #[test]
    fn test_handler_may_rearm_its_own_timeout() {
        let cpu = Arc::new(Processor::new(ProcessorId(0)));
        let timeout = Timeout::new();
        let count = Arc::new(Mutex::new(0));
        {
            let cpu2 = Arc::clone(&cpu);
            let timeout2 = Arc::clone(&timeout);
            let count = Arc::clone(&count);
            cpu.register_timeout(
                &timeout,
                5,
                Box::new(move |_| {
                    *count.lock().unwrap() += 1;
                    cpu2.register_timeout(&timeout2, 5, Box::new(|_| {}), Handle::NULL);
                }),
                Handle::NULL,
            );
        }
        assert_eq!(cpu.expire(5), 1);
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(timeout.deadline(), 10);
        assert_eq!(timeout.processor(), Some(ProcessorId(0)));
    }

    #[test]
    fn test_cancel_returns_true_once() {
        let set = ProcessorSet::new(1, BackoffPolicy::default());
        let cpu = set.get(ProcessorId(0)).unwrap();
        let (log, handler) = recorder();
        let timeout = Timeout::new();
        cpu.register_timeout(&timeout, 10, handler(1), Handle::NULL);

        assert!(set.cancel_timeout(&timeout));
        assert!(!set.cancel_timeout(&timeout));
        assert_eq!(timeout.deadline(), 0);
        assert_eq!(cpu.pending_timeouts(), 0);
        assert_eq!(cpu.expire(100), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fired_timeout_cannot_be_cancelled() {
        let set = ProcessorSet::new(1, BackoffPolicy::default());
        let cpu = set.get(ProcessorId(0)).unwrap();
        let timeout = Timeout::new();
        cpu.register_timeout(&timeout, 1, Box::new(|_| {}), Handle::NULL);
        cpu.expire(1);
        assert!(!set.cancel_timeout(&timeout));
    }

    #[test]
    fn test_unarmed_timeout_cancel_is_false() {
        let set = ProcessorSet::new(1, BackoffPolicy::default());
        assert!(!set.cancel_timeout(&Timeout::new()));
    }

    #[test]
    fn test_cancel_from_another_processor() {
        let set = Arc::new(ProcessorSet::new(2, BackoffPolicy::default()));
        let timeout = Timeout::new();
        set.get(ProcessorId(0))
            .unwrap()
            .register_timeout(&timeout, 10, Box::new(|_| {}), Handle::NULL);

        let remote = {
            let set = Arc::clone(&set);
            let timeout = Arc::clone(&timeout);
            std::thread::spawn(move || set.cancel_timeout(&timeout))
        };
        assert!(remote.join().unwrap());
        assert_eq!(set.get(ProcessorId(0)).unwrap().pending_timeouts(), 0);
    }

    #[test]
    fn test_cancelled_timeout_can_be_rearmed() {
        let set = ProcessorSet::new(2, BackoffPolicy::default());
        let timeout = Timeout::new();
        set.get(ProcessorId(0))
            .unwrap()
            .register_timeout(&timeout, 10, Box::new(|_| {}), Handle::NULL);
        assert!(set.cancel_timeout(&timeout));

        set.get(ProcessorId(1))
            .unwrap()
            .register_timeout(&timeout, 10, Box::new(|_| {}), Handle::NULL);
        assert_eq!(timeout.processor(), Some(ProcessorId(1)));
    }

    #[test]
    #[should_panic(expected = "timeout already queued")]
    fn test_double_register_is_fatal() {
        let cpu = Processor::new(ProcessorId(0));
        let timeout = Timeout::new();
        cpu.register_timeout(&timeout, 10, Box::new(|_| {}), Handle::NULL);
        cpu.register_timeout(&timeout, 20, Box::new(|_| {}), Handle::NULL);
    }

    #[test]
    #[should_panic(expected = "reinitializing a queued timeout")]
    fn test_reinitialize_queued_is_fatal() {
        let cpu = Processor::new(ProcessorId(0));
        let timeout = Timeout::new();
        cpu.register_timeout(&timeout, 10, Box::new(|_| {}), Handle::NULL);
        timeout.reinitialize();
    }

    #[test]
    fn test_reinitialize_idle_timeout() {
        let timeout = Timeout::new();
        timeout.reinitialize();
        assert!(!timeout.is_queued());
        assert_eq!(timeout.deadline(), 0);
    }

    #[test]
    fn test_random_operations_keep_queue_sorted_and_stable() {
        let set = ProcessorSet::new(1, BackoffPolicy::default());
        let cpu = set.get(ProcessorId(0)).unwrap();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let (log, handler) = recorder();
        let mut armed: Vec<(u32, u64, Arc<Timeout>)> = Vec::new();
        let mut next_tag = 0u32;
        let mut now = 0u64;

        for _ in 0..500 {
            match rng.gen_range(0..10) {
                0..=5 => {
                    let timeout = Timeout::new();
                    let delay = rng.gen_range(0..8);
                    cpu.register_timeout(&timeout, delay, handler(next_tag), Handle::NULL);
                    armed.push((next_tag, now + delay, timeout));
                    next_tag += 1;
                }
                6 | 7 if !armed.is_empty() => {
                    let (_, _, timeout) = armed.swap_remove(rng.gen_range(0..armed.len()));
                    assert!(set.cancel_timeout(&timeout));
                }
                _ => {
                    now += rng.gen_range(0..4);
                    cpu.advance_clock(now);
                    log.lock().unwrap().clear();
                    cpu.expire(now);

                    let mut due: Vec<_> = armed.iter().filter(|(_, d, _)| *d <= now).collect();
                    due.sort_by_key(|(tag, deadline, _)| (*deadline, *tag));
                    let expected: Vec<u32> = due.iter().map(|(tag, _, _)| *tag).collect();
                    assert_eq!(*log.lock().unwrap(), expected);
                    armed.retain(|(_, d, _)| *d > now);
                }
            }

            let deadlines = cpu.deadlines();
            assert!(deadlines.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(deadlines.len(), armed.len());
        }
    }
}
