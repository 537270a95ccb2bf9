//! Interrupt callback contracts.

use bitflags::bitflags;
use sashba_core::id::IrqVector;

/// Result of an interrupt handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was not raised by this device.
    None,
    /// The interrupt was recognised and handled (or its handling deferred).
    Handled,
}

bitflags! {
    /// Options passed along with an interrupt request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqFlags: u32 {
        /// The line may be shared with other devices.
        const SHARED = 1 << 0;
    }
}

/// A hard-interrupt handler registered with the platform.
///
/// Runs in interrupt context: must not block or allocate.
pub trait InterruptHandler: Send + Sync {
    /// Handles one interrupt on `vector`.
    fn handle(&self, vector: IrqVector) -> IrqReturn;
}

/// Work the platform runs later, outside hard-interrupt context, on a
/// single CPU at a time.
pub trait BottomHalf: Send + Sync {
    /// Runs the deferred work.
    fn run(&self);
}
