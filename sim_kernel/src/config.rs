//! Kernel configuration

use crate::sync::BackoffPolicy;
use kernel_api::{KernelError, TickRate};
use serde::Deserialize;

/// Sizing of the interrupt registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IrqConfig {
    /// Entries expected at boot
    pub expected: usize,
    /// Extra room for late registrations
    pub slack: usize,
}

impl Default for IrqConfig {
    fn default() -> Self {
        Self {
            expected: 32,
            slack: 16,
        }
    }
}

/// Boot-time configuration
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Number of processors to bring up
    pub processors: usize,
    /// Clock interrupt frequency
    pub tick_hz: u64,
    pub irq: IrqConfig,
    pub backoff: BackoffPolicy,
    /// Capacity of mailboxes created by the kernel
    pub mailbox_capacity: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            processors: 2,
            tick_hz: 1000,
            irq: IrqConfig::default(),
            backoff: BackoffPolicy::default(),
            mailbox_capacity: 64,
        }
    }
}

impl KernelConfig {
    /// Parses and validates a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, KernelError> {
        let config: KernelConfig =
            serde_json::from_str(json).map_err(|err| KernelError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the kernel cannot run with
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.processors == 0 {
            return Err(KernelError::InvalidConfig(
                "at least one processor is required".to_string(),
            ));
        }
        if self.tick_hz == 0 {
            return Err(KernelError::InvalidConfig("tick_hz must be non-zero".to_string()));
        }
        if self.irq.expected.saturating_add(self.irq.slack) == 0 {
            return Err(KernelError::InvalidConfig(
                "interrupt registry has no capacity".to_string(),
            ));
        }
        if self.backoff.probe_threshold == 0 {
            return Err(KernelError::InvalidConfig(
                "backoff.probe_threshold must be non-zero".to_string(),
            ));
        }
        if self.mailbox_capacity == 0 {
            return Err(KernelError::InvalidConfig(
                "mailbox_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_rate(&self) -> TickRate {
        TickRate::from_hz(self.tick_hz)
    }
}
