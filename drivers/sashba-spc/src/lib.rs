//! Bring-up, resource management and teardown core for PMC-Sierra SPC 8001
//! SAS/SATA host-bus adapters.
//!
//! The crate is organised leaf-first:
//!
//! - [`region`] -- the DMA-coherent memory region table shared with firmware.
//! - [`ccb`] -- the fixed pool of command slots and their tags.
//! - [`phy`], [`device`] -- per-link and per-device state seeded at bring-up.
//! - [`chip`] -- the chip capability interface and its registry.
//! - [`iomap`] -- BAR to logical I/O window translation.
//! - [`irq`] -- MSI-X/legacy interrupt binding and delivery policies.
//! - [`hba`] -- the lifecycle controller tying it all together.
//!
//! Process-wide state (instance counter, chip registry, parameters, the list
//! of live adapters) lives in a [`DriverContext`] handed to
//! [`Hba::probe`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
mod macros;

pub mod ccb;
pub mod chip;
pub mod context;
pub mod device;
pub mod error;
pub mod hba;
pub mod ids;
pub mod iomap;
pub mod irq;
pub mod params;
pub mod phy;
pub mod region;
pub mod sas_addr;

#[cfg(test)]
mod mock;

pub use ccb::{CcbPool, CommandSlot, SlotHandle};
pub use chip::{ChipHw, ChipId, ChipOps, ChipRegistry, NvramRequest, ResetSignature};
pub use context::{AdapterRecord, DriverContext};
pub use device::{DeviceEntry, DeviceKind, DeviceTable};
pub use error::HbaError;
pub use hba::{Hba, HbaShared, HbaState};
pub use iomap::{IoWindow, IoWindows, WindowLayout};
pub use irq::{DeferredDelivery, DeliveryPolicy, InlineDelivery, InterruptManager, IrqBinding};
pub use params::{HbaLimits, HbaParams, InterruptDelivery, LogMask};
pub use phy::{LinkRate, PhyEntry, PhyTable, PortEntry};
pub use region::{MemoryMap, MemoryRegion, RegionKind, RegionLayout, RegionSpec};
