//! The driver-facing kernel API trait

use crate::{Duration, IrqId, IrqRequest, KernelError};
use core_types::{DeviceNumber, Handle, InterruptNumber};

/// Callback run when a timeout expires
///
/// Receives the argument handle given at registration. Runs on the
/// processor that owns the timeout, with no queue lock held, so it may
/// register further timeouts.
pub type TimeoutHandler = Box<dyn FnOnce(Handle) + Send>;

/// The device API trait
///
/// This is the interface between device drivers and the interrupt and
/// timing core. A call is always made on behalf of one processor; the
/// implementor decides how that processor is identified.
///
/// # Design Principles
///
/// **Caller-owned timeouts**: The driver owns the timeout object and can
/// reuse it after it fired or was cancelled.
///
/// **Validated programs**: A top-half program is checked completely when
/// it is registered. Nothing is trusted at interrupt time.
///
/// **Typed driver context**: Arguments and instances are [`Handle`]s into
/// driver-owned storage, never raw addresses.
///
/// # Example
///
/// ```
/// use core_types::{Handle, InterruptNumber};
/// use kernel_api::{DeviceApi, Duration, IrqOwnership, IrqRequest, KernelError};
///
/// fn attach<K: DeviceApi>(kernel: &K, watchdog: &K::Timeout) -> Result<(), KernelError> {
///     kernel.register_irq(
///         IrqRequest::new(InterruptNumber(5)).claim(|_| IrqOwnership::Accept),
///     )?;
///     kernel.register_timeout(watchdog, Duration::from_millis(10), Box::new(|_| {}), Handle::NULL);
///     Ok(())
/// }
/// ```
pub trait DeviceApi {
    /// Caller-owned timeout object
    type Timeout;

    /// Arms `timeout` to run `handler(arg)` after `delay`
    ///
    /// # Panics
    ///
    /// Arming a timeout that is still queued is a programming error and
    /// halts the system.
    fn register_timeout(
        &self,
        timeout: &Self::Timeout,
        delay: Duration,
        handler: TimeoutHandler,
        arg: Handle,
    );

    /// Disarms `timeout`
    ///
    /// Returns false if it was not queued: never armed, already fired, or
    /// already cancelled.
    fn cancel_timeout(&self, timeout: &Self::Timeout) -> bool;

    /// Registers an interrupt source
    ///
    /// # Errors
    ///
    /// - [`KernelError::InvalidProgram`] if the top-half program is malformed
    /// - [`KernelError::ResourceExhausted`] if the registry is full
    ///
    /// # Panics
    ///
    /// Registering a `(devno, inr)` pair that is already live halts the
    /// system.
    fn register_irq(&self, request: IrqRequest) -> Result<IrqId, KernelError>;

    /// Retires the entry registered for `(devno, inr)`
    fn unregister_irq(&self, devno: DeviceNumber, inr: InterruptNumber)
        -> Result<(), KernelError>;
}
