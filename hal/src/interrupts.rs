//! Interrupt controller abstraction

use std::collections::HashMap;

/// Interrupt controller operations used by the top half
///
/// Drivers build their clear-interrupt routine on top of this trait. The
/// routine is what re-arms a line; for sources such as the system timer
/// it must run before anything else so that a following edge is not lost.
pub trait InterruptController: Send + Sync {
    /// Signals end of interrupt for `inr`
    fn end_of_interrupt(&self, inr: u32);

    /// Masks the line
    fn mask(&self, inr: u32);

    /// Unmasks the line
    fn unmask(&self, inr: u32);
}

#[derive(Debug, Default)]
struct ControllerState {
    eoi: Vec<u32>,
    masked: HashMap<u32, bool>,
}

/// Fake interrupt controller that records what it was told
#[derive(Debug, Default)]
pub struct FakeInterruptController {
    state: spin::Mutex<ControllerState>,
}

impl FakeInterruptController {
    /// Creates a controller with every line unmasked
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the end-of-interrupt signals in the order they arrived
    pub fn eoi_log(&self) -> Vec<u32> {
        self.state.lock().eoi.clone()
    }

    /// Returns how many end-of-interrupt signals `inr` received
    pub fn eoi_count(&self, inr: u32) -> usize {
        self.state.lock().eoi.iter().filter(|&&i| i == inr).count()
    }

    /// Returns whether `inr` is currently masked
    pub fn is_masked(&self, inr: u32) -> bool {
        self.state
            .lock()
            .masked
            .get(&inr)
            .copied()
            .unwrap_or(false)
    }
}

impl InterruptController for FakeInterruptController {
    fn end_of_interrupt(&self, inr: u32) {
        self.state.lock().eoi.push(inr);
    }

    fn mask(&self, inr: u32) {
        self.state.lock().masked.insert(inr, true);
    }

    fn unmask(&self, inr: u32) {
        self.state.lock().masked.insert(inr, false);
    }
}
