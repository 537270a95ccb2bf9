//! Driver lifecycle management trait.
//!
//! [`ManagedDriver`] provides the power-management hooks the platform calls
//! during system state transitions.

use crate::error::DriverError;
use crate::pci::PmEvent;

/// Lifecycle trait for managed drivers.
///
/// State machine: `Active → Suspended ↔ Active → Shutdown`.
///
/// `suspend` and `resume` default to `Unsupported`, so drivers need only
/// override what they support.
pub trait ManagedDriver {
    /// Error type reported by the hooks.
    type Error: From<DriverError>;

    /// Suspends the driver for the system transition `event`, releasing
    /// hardware resources that can be re-acquired on resume.
    ///
    /// Returns `Unsupported` by default.
    fn suspend(&mut self, event: PmEvent) -> Result<(), Self::Error> {
        let _ = event;
        Err(DriverError::Unsupported.into())
    }

    /// Resumes the driver from a suspended state.
    ///
    /// Returns `Unsupported` by default.
    fn resume(&mut self) -> Result<(), Self::Error> {
        Err(DriverError::Unsupported.into())
    }

    /// Performs an orderly shutdown, releasing every resource.
    fn shutdown(self)
    where
        Self: Sized,
    {
    }
}
