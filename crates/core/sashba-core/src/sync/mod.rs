//! Synchronization primitives.
//!
//! - [`SpinLock`]: test-and-test-and-set mutual exclusion, for data never
//!   touched from interrupt context.
//! - [`IrqSpinLock`]: the same lock with local interrupts masked while held,
//!   for data shared with interrupt handlers (command slot pools, completion
//!   queues).

mod irq_spinlock;
mod loom_compat;
mod spinlock;

pub use irq_spinlock::{IrqSpinLock, IrqSpinLockGuard};
pub use spinlock::{SpinLock, SpinLockGuard};
