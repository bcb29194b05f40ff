//! Timeout Cancellation Liveness Tests
//!
//! Validates that cancellation from any processor makes progress while
//! the owning processor keeps expiring its queue, and that every armed
//! timeout is either fired or cancelled exactly once.

use core_types::{Handle, ProcessorId};
use kernel_api::DeviceApi;
use sim_kernel::test_utils::on_each_processor;
use sim_kernel::timeout::Timeout;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tests_resilience::{test_bootstrap, within_liveness_bound};

const PROCESSORS: usize = 4;
const TIMEOUTS: usize = 400;

fn counting_handler(counter: &Arc<AtomicUsize>) -> kernel_api::TimeoutHandler {
    let counter = Arc::clone(counter);
    Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

/// Test: Remote processors cancel timeouts owned by one busy processor
///
/// Processor 0 owns every timeout and expires its queue in a loop while
/// the others cancel their share. Nothing may deadlock, and fired plus
/// cancelled must account for every timeout.
#[test]
fn test_concurrent_cancel_against_owner_expiry() {
    let (kernel, _) = test_bootstrap(PROCESSORS);
    let owner = kernel.processors().get(ProcessorId(0)).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));

    let timeouts: Vec<Arc<Timeout>> = (0..TIMEOUTS).map(|_| Timeout::new()).collect();
    for (i, timeout) in timeouts.iter().enumerate() {
        owner.register_timeout(timeout, (i % 50) as u64 + 1, counting_handler(&fired), Handle::NULL);
    }

    let cancelled = within_liveness_bound("concurrent cancel", || {
        on_each_processor(&kernel, |cpu| {
            if cpu.id() == ProcessorId(0) {
                for now in 1..=60 {
                    cpu.processor().expire(now);
                    std::thread::yield_now();
                }
                0
            } else {
                timeouts
                    .iter()
                    .skip(cpu.id().index())
                    .step_by(PROCESSORS)
                    .filter(|timeout| cpu.cancel_timeout(timeout))
                    .count()
            }
        })
    });

    let cancelled: usize = cancelled.iter().sum();
    let owner_share = timeouts.iter().step_by(PROCESSORS).count();
    assert_eq!(fired.load(Ordering::SeqCst) + cancelled, TIMEOUTS);
    assert!(fired.load(Ordering::SeqCst) >= owner_share);
    assert_eq!(owner.pending_timeouts(), 0);
    assert!(timeouts.iter().all(|timeout| !timeout.is_queued()));
}

/// Test: Two processors cancel each other's timeouts from their handlers
///
/// This is the opposite-order pattern: each processor holds its own queue
/// lock while expiring and the other one needs it to cancel.
#[test]
fn test_cross_processor_cancellation_from_handlers() {
    let (kernel, _) = test_bootstrap(2);
    let kernel = Arc::new(kernel);
    let fired = Arc::new(AtomicUsize::new(0));
    let cancelled = Arc::new(AtomicUsize::new(0));

    let per_cpu = 200;
    let mine: Vec<Vec<Arc<Timeout>>> = (0..2)
        .map(|_| (0..per_cpu).map(|_| Timeout::new()).collect())
        .collect();

    for (cpu_index, timeouts) in mine.iter().enumerate() {
        let cpu = kernel.cpu(ProcessorId(cpu_index as u32)).unwrap();
        let victims = Arc::new(mine[1 - cpu_index].clone());
        for (i, timeout) in timeouts.iter().enumerate() {
            let victims = Arc::clone(&victims);
            let fired = Arc::clone(&fired);
            let cancelled = Arc::clone(&cancelled);
            let kernel = Arc::clone(&kernel);
            cpu.processor().register_timeout(
                timeout,
                (i % 20) as u64 + 1,
                Box::new(move |_| {
                    fired.fetch_add(1, Ordering::SeqCst);
                    let victim = &victims[(i * 7) % victims.len()];
                    if kernel.processors().cancel_timeout(victim) {
                        cancelled.fetch_add(1, Ordering::SeqCst);
                    }
                }),
                Handle::NULL,
            );
        }
    }

    within_liveness_bound("cross cancellation", || {
        on_each_processor(&kernel, |cpu| {
            for now in 1..=25 {
                cpu.processor().expire(now);
            }
        })
    });

    assert_eq!(
        fired.load(Ordering::SeqCst) + cancelled.load(Ordering::SeqCst),
        2 * per_cpu
    );
    assert!(kernel.processors().iter().all(|cpu| cpu.pending_timeouts() == 0));
}

/// Test: Cancelling the same timeout from every processor succeeds once
#[test]
fn test_racing_cancels_of_one_timeout() {
    let (kernel, _) = test_bootstrap(PROCESSORS);

    for round in 0..50 {
        let timeout = Timeout::new();
        kernel
            .cpu(ProcessorId(round % PROCESSORS as u32))
            .unwrap()
            .register_timeout(
                &timeout,
                kernel_api::Duration::from_secs(1),
                Box::new(|_| {}),
                Handle::NULL,
            );

        let wins = on_each_processor(&kernel, |cpu| cpu.cancel_timeout(&timeout));
        assert_eq!(wins.iter().filter(|&&won| won).count(), 1);
        assert!(!timeout.is_queued());
    }
}
