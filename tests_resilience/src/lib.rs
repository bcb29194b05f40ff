//! Resilience Test Utilities
//!
//! Shared setup for the cross-crate integration tests.
//!
//! ## Test Philosophy
//!
//! - **Liveness under contention**: Opposite-order locking between
//!   processors must always make progress
//! - **Deterministic randomness**: Random operation sequences use fixed
//!   seeds so failures reproduce
//! - **Isolation**: A notification carries exactly what its own program run
//!   produced, whatever other processors do meanwhile
//! - **Best-effort delivery**: Losing a mailbox never disturbs interrupt
//!   handling

use hal::FakeIoBus;
use sim_kernel::config::KernelConfig;
use sim_kernel::SimulatedKernel;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound for tests that must finish rather than hang
pub const LIVENESS_BOUND: Duration = Duration::from_secs(20);

/// Boots a kernel with `processors` processors and test-friendly backoff
///
/// The configuration goes through the JSON loader so the tests also cover
/// the shape of the configuration file.
pub fn test_bootstrap(processors: usize) -> (SimulatedKernel, Arc<FakeIoBus>) {
    let json = serde_json::json!({
        "processors": processors,
        "tick_hz": 1000,
        "irq": { "expected": 16, "slack": 8 },
        "backoff": { "probe_threshold": 1000, "max_spin": 32 },
        "mailbox_capacity": 256,
    })
    .to_string();
    let config = match KernelConfig::from_json(&json) {
        Ok(config) => config,
        Err(err) => panic!("test configuration rejected: {}", err),
    };
    sim_kernel::test_utils::boot(config)
}

/// Runs `f` and asserts it finished within [`LIVENESS_BOUND`]
pub fn within_liveness_bound<T>(what: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let value = f();
    let elapsed = start.elapsed();
    assert!(
        elapsed < LIVENESS_BOUND,
        "{} took {:?}, bound is {:?}",
        what,
        elapsed,
        LIVENESS_BOUND
    );
    value
}
