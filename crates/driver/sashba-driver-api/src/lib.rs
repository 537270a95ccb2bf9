//! Platform contracts for SAS/SATA host-bus-adapter drivers.
//!
//! This crate defines what an adapter driver may ask of the kernel that
//! hosts it, without depending on that kernel:
//!
//! - **Resources** -- [`MmioRegion`] and [`DmaBuffer`] describing exclusive
//!   claims on device windows and coherent DMA memory.
//! - **PCI** -- addresses, decoded BARs, ID matching, command register bits
//!   and power states.
//! - **Interrupts** -- [`InterruptHandler`] and [`BottomHalf`], the two kinds
//!   of callbacks a driver hands to the platform.
//! - **Services** -- [`HbaServices`] (PCI, DMA, MMIO, IRQ and deferred work)
//!   and [`SasTransport`] (the SCSI/SAS midlayer the adapter registers with).
//! - **Lifecycle** -- [`ManagedDriver`], the power-management hooks.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod error;
pub mod irq;
pub mod lifecycle;
pub mod pci;
pub mod resource;
pub mod services;
pub mod transport;

// Re-export all public types at the crate root for ergonomic imports.
pub use error::DriverError;
pub use irq::{BottomHalf, InterruptHandler, IrqFlags, IrqReturn};
pub use lifecycle::ManagedDriver;
pub use pci::{
    DmaMask, PCI_ANY_ID, PCI_BASE_ADDRESS_MEM_MASK, PciAddress, PciBar, PciCommand, PciDeviceId,
    PciDeviceInfo, PmEvent, PowerState,
};
pub use resource::{DmaBuffer, MmioRegion};
pub use services::HbaServices;
pub use transport::{HaInfo, HostConfig, HostHandle, SasTransport};
