//! DMA-coherent memory regions shared with the adapter firmware.
//!
//! The firmware expects a fixed table of regions (event logs, queue index
//! words, inbound/outbound MPI queues, an NVMD scratch page) plus the host's
//! own device and command-slot tables. [`RegionLayout`] describes the table,
//! [`MemoryMap`] owns the granted blocks.

use alloc::vec::Vec;

use sashba_core::addr::{PhysAddr, VirtAddr};
use sashba_driver_api::{DmaBuffer, HbaServices};

use crate::error::HbaError;
use crate::params::{HbaLimits, HbaParams, LogMask};

/// Bytes reserved per device table entry.
pub const DEVICE_ENTRY_SIZE: usize = 64;

/// Bytes reserved per command slot.
pub const CCB_ENTRY_SIZE: usize = 64;

/// Size of one MPI queue element.
const MPI_ELEMENT_SIZE: usize = 64;

/// Size of the NVMD scratch page.
const NVMD_SIZE: usize = 4096;

/// What a region is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// AAP1 firmware event log.
    AapEventLog,
    /// IOP firmware event log.
    IopEventLog,
    /// Inbound queue consumer index word.
    InboundConsumerIndex,
    /// Outbound queue producer index word.
    OutboundProducerIndex,
    /// Inbound (host to chip) MPI queue.
    InboundQueue,
    /// Outbound (chip to host) MPI queue.
    OutboundQueue,
    /// NVMD request scratch page.
    Nvmd,
    /// Host device table.
    DeviceTable,
    /// Host command slot table.
    CcbTable,
}

/// Shape of one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSpec {
    /// What the region holds.
    pub kind: RegionKind,
    /// Number of elements.
    pub element_count: usize,
    /// Bytes per element.
    pub element_size: usize,
    /// Required alignment of the bus address (power of two).
    pub alignment: usize,
}

impl RegionSpec {
    /// Creates a region of `count` elements of `size` bytes.
    #[must_use]
    pub const fn new(kind: RegionKind, count: usize, size: usize, alignment: usize) -> Self {
        Self {
            kind,
            element_count: count,
            element_size: size,
            alignment,
        }
    }

    /// Creates a single-element region.
    #[must_use]
    pub const fn singleton(kind: RegionKind, size: usize, alignment: usize) -> Self {
        Self::new(kind, 1, size, alignment)
    }

    /// Bytes requested for the region, or `None` if the product overflows.
    #[must_use]
    pub const fn total_len(&self) -> Option<usize> {
        self.element_count.checked_mul(self.element_size)
    }
}

/// Ordered table of regions to allocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionLayout {
    specs: Vec<RegionSpec>,
}

impl RegionLayout {
    /// Creates a layout from an arbitrary table.
    #[must_use]
    pub fn new(specs: Vec<RegionSpec>) -> Self {
        Self { specs }
    }

    /// The SPC table: both event logs, the two index words, both MPI
    /// queues, the NVMD page, then the device and command-slot tables.
    #[must_use]
    pub fn spc(params: &HbaParams, limits: &HbaLimits) -> Self {
        let log_size = params.event_log_size();
        Self::new(alloc::vec![
            RegionSpec::singleton(RegionKind::AapEventLog, log_size, 32),
            RegionSpec::singleton(RegionKind::IopEventLog, log_size, 32),
            RegionSpec::singleton(RegionKind::InboundConsumerIndex, 4, 4),
            RegionSpec::singleton(RegionKind::OutboundProducerIndex, 4, 4),
            RegionSpec::new(
                RegionKind::InboundQueue,
                limits.mpi_queue,
                MPI_ELEMENT_SIZE,
                64
            ),
            RegionSpec::new(
                RegionKind::OutboundQueue,
                limits.mpi_queue,
                MPI_ELEMENT_SIZE,
                64
            ),
            RegionSpec::singleton(RegionKind::Nvmd, NVMD_SIZE, 1),
            RegionSpec::new(
                RegionKind::DeviceTable,
                limits.max_devices,
                DEVICE_ENTRY_SIZE,
                1
            ),
            RegionSpec::new(RegionKind::CcbTable, limits.max_ccb, CCB_ENTRY_SIZE, 1),
        ])
    }

    /// Returns the region specs in allocation order.
    #[must_use]
    pub fn specs(&self) -> &[RegionSpec] {
        &self.specs
    }

    /// Returns the number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns `true` for an empty table.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Sum of `total_len` over every region.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.specs
            .iter()
            .filter_map(RegionSpec::total_len)
            .fold(0, usize::saturating_add)
    }
}

// ---------------------------------------------------------------------------
// Granted regions
// ---------------------------------------------------------------------------

/// One granted, zero-initialised region.
#[derive(Debug)]
pub struct MemoryRegion {
    spec: RegionSpec,
    buffer: DmaBuffer,
}

impl MemoryRegion {
    /// What the region holds.
    #[must_use]
    pub fn kind(&self) -> RegionKind {
        self.spec.kind
    }

    /// The layout entry the region was allocated from.
    #[must_use]
    pub fn spec(&self) -> &RegionSpec {
        &self.spec
    }

    /// Number of elements.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.spec.element_count
    }

    /// Bytes per element.
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.spec.element_size
    }

    /// Bytes granted.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.buffer.len()
    }

    /// Bus address of the first byte.
    #[must_use]
    pub fn phys(&self) -> PhysAddr {
        self.buffer.phys()
    }

    /// Upper half of the bus address.
    #[must_use]
    pub fn phys_hi(&self) -> u32 {
        self.buffer.phys().upper_32()
    }

    /// Lower half of the bus address.
    #[must_use]
    pub fn phys_lo(&self) -> u32 {
        self.buffer.phys().lower_32()
    }

    /// CPU address of the first byte.
    #[must_use]
    pub fn virt(&self) -> VirtAddr {
        self.buffer.virt()
    }

    /// Bus address of element `index`, or `None` past the end.
    #[must_use]
    pub fn element_phys(&self, index: usize) -> Option<PhysAddr> {
        if index < self.spec.element_count {
            Some(self.phys() + (index * self.spec.element_size) as u64)
        } else {
            None
        }
    }
}

/// Every region granted for one adapter.
#[derive(Debug, Default)]
pub struct MemoryMap {
    regions: Vec<MemoryRegion>,
}

impl MemoryMap {
    /// Allocates one zeroed, aligned block per region of `layout`, in order.
    ///
    /// If region `k` cannot be granted, regions `0..k` are released before
    /// returning [`HbaError::AllocationFailure`] for `k`. A block whose bus
    /// address violates the region's alignment is handed back and counts as
    /// a failed grant.
    pub fn allocate(
        layout: &RegionLayout,
        dma: &dyn HbaServices,
        log_mask: LogMask,
    ) -> Result<Self, HbaError> {
        let mut map = Self {
            regions: Vec::with_capacity(layout.len()),
        };

        for (index, spec) in layout.specs().iter().enumerate() {
            let align = spec.alignment.max(1);
            let Some(len) = spec.total_len() else {
                fail_dbg!(
                    log_mask,
                    "Mem{index}: {} x {} bytes overflows",
                    spec.element_count,
                    spec.element_size
                );
                map.release(dma);
                return Err(HbaError::AllocationFailure { region: index });
            };
            let granted = match dma.alloc_coherent(len, align) {
                Ok(buffer) if buffer.phys().is_aligned(align as u64) => Some(buffer),
                Ok(buffer) => {
                    fail_dbg!(
                        log_mask,
                        "Mem{index} granted at {} violates {align}-byte alignment",
                        buffer.phys()
                    );
                    // SAFETY: The buffer was never handed to the device.
                    unsafe { dma.free_coherent(buffer) };
                    None
                }
                Err(err) => {
                    fail_dbg!(log_mask, "Mem{index} alloc failed: {err}");
                    None
                }
            };

            let Some(mut buffer) = granted else {
                map.release(dma);
                return Err(HbaError::AllocationFailure { region: index });
            };
            buffer.zero();
            map.regions.push(MemoryRegion {
                spec: *spec,
                buffer,
            });
        }

        Ok(map)
    }

    /// Hands every granted region back to the allocator. Calling it again is
    /// a no-op.
    pub fn release(&mut self, dma: &dyn HbaServices) {
        for region in self.regions.drain(..) {
            // SAFETY: Regions are only released once the chip has been reset
            // (or never started), so no DMA targets them any more.
            unsafe { dma.free_coherent(region.buffer) };
        }
    }

    /// Returns region `index`.
    #[must_use]
    pub fn region(&self, index: usize) -> Option<&MemoryRegion> {
        self.regions.get(index)
    }

    /// Returns the first region of `kind`.
    #[must_use]
    pub fn by_kind(&self, kind: RegionKind) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.kind() == kind)
    }

    /// Iterates over the granted regions in table order.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter()
    }

    /// Returns the number of granted regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` once released (or if nothing was granted).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
