//! Chip capability interface.
//!
//! Everything that touches chip registers or MPI message formats sits behind
//! [`ChipOps`]. The lifecycle controller picks one implementation per
//! adapter from the [`ChipRegistry`] and never branches on the chip type.

use alloc::sync::Arc;
use alloc::vec::Vec;

use sashba_driver_api::{DriverError, HbaServices, IrqReturn, PciAddress, PciBar};

use crate::iomap::{IoWindows, WindowLayout};
use crate::params::LogMask;
use crate::region::MemoryMap;

/// Chip families the driver knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipId {
    /// PMC-Sierra SPC 8001.
    Spc8001,
}

/// Value written to the reset scratchpad to select the reset flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResetSignature {
    /// Ordinary soft reset.
    Soft = 0x252A_CBCD,
    /// Soft reset out of host diagnostic (HDA) mode.
    HdaSoft = 0xA5AA_27D7,
}

impl ResetSignature {
    /// Raw register value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self as u32
    }
}

/// An NVRAM (two-wire serial EEPROM) access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NvramRequest {
    /// Firmware minor function selecting the NVRAM device.
    pub minor_function: u8,
    /// Bytes to transfer.
    pub length: usize,
}

impl NvramRequest {
    /// The 128-byte block holding per-phy SAS addresses.
    pub const TWI_SAS_ADDRESSES: Self = Self {
        minor_function: 0,
        length: 128,
    };
}

/// Everything a chip operation may touch on one adapter.
#[derive(Clone, Copy)]
pub struct ChipHw<'a> {
    /// Adapter name.
    pub name: &'a str,
    /// PCI function.
    pub pci: PciAddress,
    /// Mapped register windows.
    pub windows: &'a IoWindows,
    /// Shared DMA regions.
    pub memory: &'a MemoryMap,
    /// Platform services.
    pub services: &'a dyn HbaServices,
    /// Firmware event log option.
    pub log_option: u32,
}

/// Per-chip operations.
pub trait ChipOps: Send + Sync {
    /// Human-readable chip name.
    fn name(&self) -> &'static str;

    /// Number of phys the chip has.
    fn phy_count(&self) -> u8;

    /// How the chip's BARs compose logical windows.
    fn window_layout(&self) -> WindowLayout {
        WindowLayout::SPC
    }

    /// Maps the chip's logical windows.
    fn map_io_windows(
        &self,
        bars: &[PciBar; 6],
        services: &dyn HbaServices,
        log_mask: LogMask,
    ) -> IoWindows {
        IoWindows::map(&self.window_layout(), bars, services, log_mask)
    }

    /// Unmaps windows created by [`map_io_windows`](Self::map_io_windows).
    fn unmap_io_windows(&self, windows: &mut IoWindows, services: &dyn HbaServices) {
        windows.unmap(services);
    }

    /// Returns `true` if the chip is in host diagnostic (HDA) mode.
    fn query_power_mode(&self, hw: &ChipHw<'_>) -> bool;

    /// Forces the chip out of HDA mode.
    fn force_power_mode(&self, hw: &ChipHw<'_>) -> Result<(), DriverError>;

    /// Resets the chip with `signature`.
    fn reset(&self, hw: &ChipHw<'_>, signature: ResetSignature) -> Result<(), DriverError>;

    /// Hands the region table to the firmware and waits for it to come up.
    fn initialize(&self, hw: &ChipHw<'_>) -> Result<(), DriverError>;

    /// Unmasks chip interrupts.
    fn enable_interrupts(&self, hw: &ChipHw<'_>);

    /// Masks chip interrupts.
    fn disable_interrupts(&self, hw: &ChipHw<'_>);

    /// Returns `true` if the chip is asserting an interrupt.
    fn owns_pending_interrupt(&self, hw: &ChipHw<'_>) -> bool;

    /// Drains the outbound queue.
    fn service_interrupt(&self, hw: &ChipHw<'_>) -> IrqReturn;

    /// Reads `req.length` bytes of NVRAM into `buf`.
    fn read_nvram(
        &self,
        hw: &ChipHw<'_>,
        req: &NvramRequest,
        buf: &mut [u8],
    ) -> Result<(), DriverError> {
        let _ = (hw, req, buf);
        Err(DriverError::Unsupported)
    }

    /// Writes `data` to NVRAM.
    fn write_nvram(
        &self,
        hw: &ChipHw<'_>,
        req: &NvramRequest,
        data: &[u8],
    ) -> Result<(), DriverError> {
        let _ = (hw, req, data);
        Err(DriverError::Unsupported)
    }
}

/// Chip implementations available to a driver context.
#[derive(Default, Clone)]
pub struct ChipRegistry {
    entries: Vec<(ChipId, Arc<dyn ChipOps>)>,
}

impl ChipRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers `ops` for `id`, replacing any earlier entry.
    pub fn register(&mut self, id: ChipId, ops: Arc<dyn ChipOps>) {
        match self.entries.iter_mut().find(|(chip, _)| *chip == id) {
            Some(entry) => entry.1 = ops,
            None => self.entries.push((id, ops)),
        }
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, id: ChipId, ops: Arc<dyn ChipOps>) -> Self {
        self.register(id, ops);
        self
    }

    /// Returns the implementation for `id`.
    #[must_use]
    pub fn get(&self, id: ChipId) -> Option<Arc<dyn ChipOps>> {
        self.entries
            .iter()
            .find(|(chip, _)| *chip == id)
            .map(|(_, ops)| Arc::clone(ops))
    }
}

impl core::fmt::Debug for ChipRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(id, ops)| (id, ops.name())))
            .finish()
    }
}
