//! # Timer Device
//!
//! Source of the monotonic tick count that drives the deadline queues.
//!
//! Each processor reads its timer on every clock tick and expires the
//! timeouts whose deadline has passed. The timer itself neither sleeps
//! nor schedules anything.

/// Hardware timer device trait
///
/// # Implementation Notes
///
/// - Must be monotonic (never return a smaller value)
/// - Must not block
/// - Tick frequency is implementation-defined; callers convert durations
///   with the configured tick rate
pub trait TimerDevice {
    /// Returns the cumulative tick count
    fn poll_ticks(&mut self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StepTimer {
        ticks: u64,
        step: u64,
    }

    impl TimerDevice for StepTimer {
        fn poll_ticks(&mut self) -> u64 {
            self.ticks += self.step;
            self.ticks
        }
    }

    #[test]
    fn test_timer_is_monotonic() {
        let mut timer = StepTimer { ticks: 0, step: 3 };
        let t1 = timer.poll_ticks();
        let t2 = timer.poll_ticks();
        let t3 = timer.poll_ticks();

        assert!(t1 <= t2 && t2 <= t3);
        assert_eq!(t3 - t1, 6);
    }

    #[test]
    fn test_timer_usable_as_trait_object() {
        let mut timer = StepTimer { ticks: 10, step: 1 };
        let device: &mut dyn TimerDevice = &mut timer;
        assert_eq!(device.poll_ticks(), 11);
    }
}
