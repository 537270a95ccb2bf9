//! Platform service contract for adapter drivers.
//!
//! Drivers use [`HbaServices`] for everything that touches the host bus or
//! kernel infrastructure (PCI configuration, coherent DMA, MMIO mappings,
//! interrupt vectors and deferred work) without depending on the kernel
//! crate directly.

use alloc::sync::Arc;
use alloc::vec::Vec;

use sashba_core::addr::PhysAddr;
use sashba_core::id::IrqVector;

use crate::error::DriverError;
use crate::irq::{BottomHalf, InterruptHandler, IrqFlags};
use crate::pci::{DmaMask, PciAddress, PciCommand, PmEvent, PowerState};
use crate::resource::{DmaBuffer, MmioRegion};

/// Trait providing platform services to adapter drivers.
///
/// Implemented by the kernel and passed to the driver at probe time.
pub trait HbaServices: Send + Sync {
    // -----------------------------------------------------------------------
    // PCI function control
    // -----------------------------------------------------------------------

    /// Enables the PCI function (memory/I/O decoding, power).
    fn enable_device(&self, pci: PciAddress) -> Result<(), DriverError>;

    /// Disables the PCI function.
    fn disable_device(&self, pci: PciAddress);

    /// Enables bus mastering for the function.
    fn set_bus_master(&self, pci: PciAddress);

    /// Reads the PCI command register.
    fn read_command(&self, pci: PciAddress) -> PciCommand;

    /// Writes the PCI command register.
    fn write_command(&self, pci: PciAddress, command: PciCommand);

    /// Claims every BAR of the function for `owner`.
    fn request_regions(&self, pci: PciAddress, owner: &str) -> Result<(), DriverError>;

    /// Releases the BARs claimed by [`request_regions`](Self::request_regions).
    fn release_regions(&self, pci: PciAddress);

    /// Sets both the streaming and the coherent DMA mask.
    fn set_dma_mask(&self, pci: PciAddress, mask: DmaMask) -> Result<(), DriverError>;

    // -----------------------------------------------------------------------
    // Power management
    // -----------------------------------------------------------------------

    /// Returns `true` if the function exposes the PCI power-management
    /// capability.
    fn has_pm_capability(&self, pci: PciAddress) -> bool;

    /// Picks the device power state appropriate for a system transition.
    fn choose_power_state(&self, pci: PciAddress, event: PmEvent) -> PowerState;

    /// Moves the function into `state`.
    fn set_power_state(&self, pci: PciAddress, state: PowerState) -> Result<(), DriverError>;

    /// Arms or disarms wake-up signalling from `state`.
    fn enable_wake(&self, pci: PciAddress, state: PowerState, enable: bool);

    /// Saves the configuration space for a later restore.
    fn save_state(&self, pci: PciAddress);

    /// Restores the configuration space saved by [`save_state`](Self::save_state).
    fn restore_state(&self, pci: PciAddress);

    // -----------------------------------------------------------------------
    // Memory
    // -----------------------------------------------------------------------

    /// Maps a physical MMIO region into kernel virtual address space.
    fn map_mmio(&self, phys_base: PhysAddr, size: u64) -> Result<MmioRegion, DriverError>;

    /// Unmaps a region returned by [`map_mmio`](Self::map_mmio).
    ///
    /// # Safety
    ///
    /// No pointer derived from `region` may be used afterwards.
    unsafe fn unmap_mmio(&self, region: MmioRegion);

    /// Allocates `len` bytes of coherent DMA memory whose bus address is a
    /// multiple of `align`.
    ///
    /// The contents are unspecified; callers zero what they need.
    fn alloc_coherent(&self, len: usize, align: usize) -> Result<DmaBuffer, DriverError>;

    /// Frees memory returned by [`alloc_coherent`](Self::alloc_coherent).
    ///
    /// # Safety
    ///
    /// The device must no longer reference the buffer.
    unsafe fn free_coherent(&self, buffer: DmaBuffer);

    // -----------------------------------------------------------------------
    // Interrupts
    // -----------------------------------------------------------------------

    /// Returns `true` if the function has an MSI-X capability.
    fn msix_capable(&self, pci: PciAddress) -> bool;

    /// Enables MSI-X with up to `max_vectors` table entries and returns the
    /// vectors granted, in table order.
    fn enable_msix(&self, pci: PciAddress, max_vectors: usize)
    -> Result<Vec<IrqVector>, DriverError>;

    /// Disables MSI-X and returns the function to legacy INTx delivery.
    fn disable_msix(&self, pci: PciAddress);

    /// Returns the legacy (INTx) interrupt vector of the function.
    fn legacy_vector(&self, pci: PciAddress) -> IrqVector;

    /// Installs `handler` on `vector`.
    fn request_irq(
        &self,
        vector: IrqVector,
        flags: IrqFlags,
        name: &str,
        handler: Arc<dyn InterruptHandler>,
    ) -> Result<(), DriverError>;

    /// Removes the handler installed on `vector`, dropping the platform's
    /// reference to it.
    fn free_irq(&self, vector: IrqVector);

    /// Waits until no handler for `vector` is running on any CPU.
    fn synchronize_irq(&self, vector: IrqVector);

    // -----------------------------------------------------------------------
    // Deferred work
    // -----------------------------------------------------------------------

    /// Queues `work` to run outside hard-interrupt context.
    fn schedule_bottom_half(&self, work: Arc<dyn BottomHalf>);

    /// Runs or waits for all deferred work queued so far.
    fn flush_deferred_work(&self);
}
